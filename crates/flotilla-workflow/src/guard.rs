//! Advisory mutual exclusion for fleet-mutating work.
//!
//! The guard answers one question: is any scale execution running right
//! now? Triggers and monitor passes check it before acting and walk away
//! when it says yes. It is check-then-act by design; with a single
//! control plane instance the window between check and registration is
//! harmless, and a blocked caller simply tries again on its next tick.

use tracing::info;

use flotilla_core::WorkflowKind;

use crate::registry::ExecutionRegistry;

#[derive(Clone)]
pub struct OperationGuard {
    registry: ExecutionRegistry,
}

impl OperationGuard {
    pub fn new(registry: ExecutionRegistry) -> Self {
        Self { registry }
    }

    /// Whether a scale execution of either kind is in flight.
    pub async fn operation_in_progress(&self) -> bool {
        for kind in [WorkflowKind::Add, WorkflowKind::Remove] {
            let running = self.registry.running(kind).await;
            if !running.is_empty() {
                info!(workflow = %kind, executions = running.len(), "scale operation in progress");
                return true;
            }
        }
        false
    }
}
