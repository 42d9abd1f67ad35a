//! flotilla-sentinel: the two scheduled passes that keep the fleet honest.
//!
//! [`IntegrityEnforcer`] re-derives what the fleet should look like and
//! corrects drift: unprotected members get associated, active members
//! missing from the record set get inserted, weights get rebalanced.
//! [`FleetMonitor`] checks the same invariants but never mutates; it
//! raises typed violations for notification instead. The monitor stands
//! down while a scale operation runs; the enforcer does not, because its
//! corrections converge toward the same state a workflow establishes.

pub mod enforcer;
pub mod error;
pub mod monitor;

pub use enforcer::{EnforcementReport, IntegrityEnforcer};
pub use error::{SentinelError, SentinelResult};
pub use monitor::{FleetMonitor, MonitorOutcome, Violation, WeightViolation};
