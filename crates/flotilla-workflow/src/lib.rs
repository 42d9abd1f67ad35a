//! flotilla-workflow: the scale-out and scale-in pipelines.
//!
//! A workflow is a fixed sequence of stages. Each stage appends a typed
//! record to the operation envelope and the driver branches on it:
//!
//! ```text
//!   add:    create balancer -> associate edge -> register dns
//!   remove: delete balancer -> disassociate edge -> deregister dns
//! ```
//!
//! An ERROR record stops the pipeline where it stands. There is no
//! rollback; the integrity enforcer converges whatever partial state a
//! failed run leaves behind. The executor wraps a pipeline run with the
//! suspend gate, the advisory operation guard, and notifications.

pub mod executor;
pub mod guard;
pub mod notify;
pub mod pipeline;
pub mod registry;

pub use executor::{ScaleDisposition, ScaleOutcome, WorkflowExecutor};
pub use guard::OperationGuard;
pub use pipeline::{ScaleWorkflow, WorkflowTerminal};
pub use registry::{ExecutionRecord, ExecutionRegistry};
