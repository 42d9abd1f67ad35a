//! Workflow executor: the gates in front of a pipeline run.
//!
//! Order matters and mirrors how operators reason about it: the suspend
//! flag is a deliberate human decision, so it is checked first; the
//! operation guard protects against overlap and is checked second; only
//! then is the execution registered and the pipeline run. The registry
//! entry is removed on every path out.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use flotilla_core::{OperationEnvelope, StageName, WorkflowKind};
use flotilla_provider::{Notice, Notifier, SuspendSwitch};

use crate::guard::OperationGuard;
use crate::notify;
use crate::pipeline::{ScaleWorkflow, WorkflowTerminal};
use crate::registry::ExecutionRegistry;

/// How a trigger attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDisposition {
    Succeeded,
    Failed,
    /// The suspend flag was set; nothing ran.
    Suspended,
    /// Another execution holds the fleet; nothing ran.
    AlreadyRunning,
}

impl ScaleDisposition {
    pub fn is_failure(&self) -> bool {
        matches!(self, ScaleDisposition::Failed)
    }
}

/// Result of one trigger attempt. The envelope is present only when a
/// pipeline actually ran.
#[derive(Debug, Clone, Serialize)]
pub struct ScaleOutcome {
    pub disposition: ScaleDisposition,
    pub envelope: Option<OperationEnvelope>,
}

pub struct WorkflowExecutor {
    workflow: ScaleWorkflow,
    registry: ExecutionRegistry,
    guard: OperationGuard,
    suspend: Arc<dyn SuspendSwitch>,
    notifier: Arc<dyn Notifier>,
}

impl WorkflowExecutor {
    pub fn new(
        workflow: ScaleWorkflow,
        registry: ExecutionRegistry,
        suspend: Arc<dyn SuspendSwitch>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let guard = OperationGuard::new(registry.clone());
        Self { workflow, registry, guard, suspend, notifier }
    }

    /// Attempt to run one workflow execution end to end.
    pub async fn trigger(&self, kind: WorkflowKind, triggered_by: &str) -> ScaleOutcome {
        match self.suspend.is_suspended(kind).await {
            Ok(false) => {}
            Ok(true) => {
                info!(workflow = %kind, triggered_by, "workflow is suspended, not starting");
                return ScaleOutcome { disposition: ScaleDisposition::Suspended, envelope: None };
            }
            Err(e) => {
                error!(workflow = %kind, error = %e, "could not read suspend flag");
                self.notify(notify::executor_failure_notice(kind, triggered_by, &e.to_string()))
                    .await;
                return ScaleOutcome { disposition: ScaleDisposition::Failed, envelope: None };
            }
        }

        if self.guard.operation_in_progress().await {
            info!(workflow = %kind, triggered_by, "another scale operation is in progress, aborting this attempt");
            return ScaleOutcome { disposition: ScaleDisposition::AlreadyRunning, envelope: None };
        }

        let record = self.registry.begin(kind, triggered_by).await;
        let mut envelope =
            OperationEnvelope::new(kind, record.execution_id.clone(), triggered_by);
        self.notify(notify::execution_started_notice(&envelope)).await;

        let terminal = self.workflow.run(&mut envelope).await;
        self.registry.finish(&record.execution_id).await;

        let disposition = match terminal {
            WorkflowTerminal::Succeeded => ScaleDisposition::Succeeded,
            WorkflowTerminal::Failed => ScaleDisposition::Failed,
        };
        ScaleOutcome { disposition, envelope: Some(envelope) }
    }

    /// Remove dynamic members one at a time until none are left or a
    /// run stops early. Used to empty the fleet before decommissioning.
    pub async fn drain(&self, triggered_by: &str) -> Vec<ScaleOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.trigger(WorkflowKind::Remove, triggered_by).await;
            let nothing_left = outcome
                .envelope
                .as_ref()
                .and_then(|env| env.output(StageName::DeleteLoadBalancer))
                .map(|output| !output.operation_required)
                .unwrap_or(true);
            let stop = nothing_left || outcome.disposition != ScaleDisposition::Succeeded;
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        info!(triggered_by, runs = outcomes.len(), "fleet drain finished");
        outcomes
    }

    async fn notify(&self, notice: Notice) {
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(error = %e, subject = %notice.subject, "notification delivery failed");
        }
    }
}
