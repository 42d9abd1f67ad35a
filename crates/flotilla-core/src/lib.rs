//! flotilla-core: shared vocabulary for the fleet control plane.
//!
//! Everything the other crates agree on lives here: load balancer and
//! target group descriptors, the weighted DNS record shape, the typed
//! operation envelope that scale workflows thread through their stages,
//! and the bounded waiter used wherever a remote change has to settle
//! before the caller may proceed.

pub mod envelope;
pub mod names;
pub mod types;
pub mod waiter;

pub use envelope::{
    epoch_secs, MemberIdentity, OperationEnvelope, StageDetail, StageInput, StageName,
    StageOutput, StageRecord, StageStatus, WorkflowKind,
};
pub use names::random_suffix;
pub use types::*;
pub use waiter::{wait_until, WaitBudget, WaitError};
