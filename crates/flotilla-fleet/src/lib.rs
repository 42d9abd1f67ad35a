//! flotilla-fleet: who is in the fleet, and how members are born and die.
//!
//! [`FleetInventory`] answers membership questions from provider tags.
//! [`LoadBalancerLifecycle`] provisions a complete member (balancer,
//! target groups, weighted listener) and tears one down, waiting out the
//! provider's slow transitions with bounded budgets.

pub mod error;
pub mod inventory;
pub mod lifecycle;

pub use error::{FleetError, FleetResult};
pub use inventory::FleetInventory;
pub use lifecycle::{LifecycleSettings, LoadBalancerLifecycle, ProvisionedMember, TeardownReport};
