//! flotilla-edge: keeping fleet members behind edge protection.
//!
//! Association is a single provider call. Disassociation is the touchy
//! direction: the provider acknowledges the call while the association
//! can linger, so the associator waits out a grace period and then
//! verifies the member is really gone from the association list before
//! declaring success.

pub mod associator;
pub mod error;

pub use associator::{EdgeProtectionAssociator, EdgeSettings};
pub use error::{EdgeError, EdgeResult};
