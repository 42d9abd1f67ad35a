//! In-process registry of running scale executions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use flotilla_core::{WorkflowKind, epoch_secs, random_suffix};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub workflow: WorkflowKind,
    pub triggered_by: String,
    pub started_at: u64,
}

/// Tracks which executions are currently running. Shared by handle;
/// clones see the same registry.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    running: Arc<RwLock<HashMap<String, ExecutionRecord>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new execution and hand back its record. The caller is
    /// responsible for calling [`finish`](Self::finish) on every path.
    pub async fn begin(&self, workflow: WorkflowKind, triggered_by: &str) -> ExecutionRecord {
        let record = ExecutionRecord {
            execution_id: format!("{workflow}-{}-{}", epoch_secs(), random_suffix(5)),
            workflow,
            triggered_by: triggered_by.to_string(),
            started_at: epoch_secs(),
        };
        debug!(execution_id = %record.execution_id, workflow = %workflow, "execution started");
        self.running.write().await.insert(record.execution_id.clone(), record.clone());
        record
    }

    pub async fn finish(&self, execution_id: &str) {
        if self.running.write().await.remove(execution_id).is_some() {
            debug!(execution_id, "execution finished");
        }
    }

    /// Running executions of one workflow, oldest first.
    pub async fn running(&self, workflow: WorkflowKind) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .running
            .read()
            .await
            .values()
            .filter(|r| r.workflow == workflow)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.started_at, &a.execution_id).cmp(&(b.started_at, &b.execution_id))
        });
        records
    }

    /// All running executions, oldest first.
    pub async fn all(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> =
            self.running.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.started_at, &a.execution_id).cmp(&(b.started_at, &b.execution_id))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_and_finish_track_running_executions() {
        let registry = ExecutionRegistry::new();
        let add = registry.begin(WorkflowKind::Add, "test").await;
        let remove = registry.begin(WorkflowKind::Remove, "test").await;

        assert_eq!(registry.running(WorkflowKind::Add).await.len(), 1);
        assert_eq!(registry.running(WorkflowKind::Remove).await.len(), 1);
        assert_eq!(registry.all().await.len(), 2);

        registry.finish(&add.execution_id).await;
        assert!(registry.running(WorkflowKind::Add).await.is_empty());
        assert_eq!(registry.all().await, vec![remove]);
    }

    #[tokio::test]
    async fn execution_ids_carry_the_workflow_and_differ() {
        let registry = ExecutionRegistry::new();
        let a = registry.begin(WorkflowKind::Add, "test").await;
        let b = registry.begin(WorkflowKind::Add, "test").await;
        assert!(a.execution_id.starts_with("add-"));
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[tokio::test]
    async fn clones_share_the_same_registry() {
        let registry = ExecutionRegistry::new();
        let handle = registry.clone();
        registry.begin(WorkflowKind::Add, "test").await;
        assert_eq!(handle.running(WorkflowKind::Add).await.len(), 1);
    }
}
