//! Notification rendering for workflow events.
//!
//! Subjects follow the `<OPERATOR> operation <STATUS>.` convention so
//! subscribers can filter without parsing bodies. Bodies carry the
//! execution context and the full envelope as it stood when the notice
//! was sent.

use flotilla_core::{OperationEnvelope, StageRecord, StageStatus, WorkflowKind};
use flotilla_provider::Notice;

pub fn stage_notice(envelope: &OperationEnvelope, record: &StageRecord) -> Notice {
    let operator = record.input.operator.as_str();
    let subject = match record.output.status {
        StageStatus::Error => format!("{operator} operation FAILED."),
        _ => format!("{operator} operation COMPLETED."),
    };
    let mut message = format!(
        "Operator: {operator}\nWorkflow: {}\nExecution: {}\nTriggered by: {}\n",
        envelope.workflow, envelope.execution_id, envelope.triggered_by,
    );
    if let Some(error) = &record.output.error_message {
        message.push_str(&format!("Error: {error}\n"));
    }
    message.push('\n');
    message.push_str(&envelope.pretty());
    Notice::new(subject, message)
}

pub fn execution_started_notice(envelope: &OperationEnvelope) -> Notice {
    Notice::new(
        format!("{} operation executed.", envelope.workflow.operator()),
        format!(
            "Execution {} of the {} workflow was started by {}.",
            envelope.execution_id, envelope.workflow, envelope.triggered_by,
        ),
    )
}

pub fn executor_failure_notice(kind: WorkflowKind, triggered_by: &str, error: &str) -> Notice {
    Notice::new(
        format!("{} operation FAILED.", kind.operator()),
        format!("The {kind} workflow could not be started by {triggered_by}: {error}"),
    )
}
