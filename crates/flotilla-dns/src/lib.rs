//! flotilla-dns: the weighted record set that spreads traffic over the
//! fleet.
//!
//! The weight rule is deliberately binary. A sole member takes weight
//! 255 and with it all traffic; as soon as a second member exists every
//! record must sit at weight 0, which the provider treats as "distribute
//! evenly". Workflow stages insert and delete records; `rebalance`
//! drives whatever it finds back to that shape.

pub mod error;
pub mod manager;

pub use error::{DnsError, DnsResult};
pub use manager::{DnsSettings, WeightedDnsManager};
