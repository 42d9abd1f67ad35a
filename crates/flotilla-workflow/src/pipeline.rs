//! The scale-out and scale-in stage pipelines.
//!
//! Stages run strictly in order and never roll back. Component errors
//! are caught at the stage boundary and become ERROR records; the
//! driver stops there and the envelope shows exactly how far the run
//! got. The first stage of each pipeline re-reads the suspend flag so a
//! flag set between trigger and execution still stops the run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use flotilla_core::{
    FleetFilter, MemberIdentity, OperationEnvelope, StageDetail, StageInput, StageName,
    StageOutput, StageRecord, StageStatus, WorkflowKind,
};
use flotilla_dns::WeightedDnsManager;
use flotilla_edge::EdgeProtectionAssociator;
use flotilla_fleet::{FleetInventory, LoadBalancerLifecycle};
use flotilla_provider::{Notifier, SuspendSwitch};

use crate::notify;

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTerminal {
    Succeeded,
    Failed,
}

enum Flow {
    Continue,
    Succeed,
    Fail,
}

pub struct ScaleWorkflow {
    inventory: FleetInventory,
    lifecycle: LoadBalancerLifecycle,
    edge: EdgeProtectionAssociator,
    dns: WeightedDnsManager,
    suspend: Arc<dyn SuspendSwitch>,
    notifier: Arc<dyn Notifier>,
}

impl ScaleWorkflow {
    pub fn new(
        inventory: FleetInventory,
        lifecycle: LoadBalancerLifecycle,
        edge: EdgeProtectionAssociator,
        dns: WeightedDnsManager,
        suspend: Arc<dyn SuspendSwitch>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { inventory, lifecycle, edge, dns, suspend, notifier }
    }

    /// Run the envelope's workflow to a terminal state. Every stage that
    /// ran is recorded in the envelope, errors included.
    pub async fn run(&self, envelope: &mut OperationEnvelope) -> WorkflowTerminal {
        let stages: [StageName; 3] = match envelope.workflow {
            WorkflowKind::Add => [
                StageName::CreateLoadBalancer,
                StageName::AssociateEdgeProtection,
                StageName::RegisterDnsMember,
            ],
            WorkflowKind::Remove => [
                StageName::DeleteLoadBalancer,
                StageName::DisassociateEdgeProtection,
                StageName::DeregisterDnsMember,
            ],
        };
        for stage in stages {
            match self.step(envelope, stage).await {
                Flow::Continue => {}
                Flow::Succeed => break,
                Flow::Fail => {
                    info!(
                        workflow = %envelope.workflow,
                        execution_id = %envelope.execution_id,
                        %stage,
                        "scale workflow failed"
                    );
                    return WorkflowTerminal::Failed;
                }
            }
        }
        info!(
            workflow = %envelope.workflow,
            execution_id = %envelope.execution_id,
            "scale workflow succeeded"
        );
        WorkflowTerminal::Succeeded
    }

    async fn step(&self, envelope: &mut OperationEnvelope, stage: StageName) -> Flow {
        let record = self.run_stage(envelope, stage).await;
        envelope.record(record.clone());
        if record.output.status != StageStatus::Skipped {
            self.notify_stage(envelope, &record).await;
        }
        match record.output.status {
            StageStatus::Error => Flow::Fail,
            _ if !record.output.operation_required => Flow::Succeed,
            _ => Flow::Continue,
        }
    }

    async fn run_stage(&self, envelope: &OperationEnvelope, stage: StageName) -> StageRecord {
        match stage {
            StageName::CreateLoadBalancer => self.create_load_balancer(envelope).await,
            StageName::AssociateEdgeProtection => self.associate_edge(envelope).await,
            StageName::RegisterDnsMember => self.register_dns(envelope).await,
            StageName::DeleteLoadBalancer => self.delete_load_balancer(envelope).await,
            StageName::DisassociateEdgeProtection => self.disassociate_edge(envelope).await,
            StageName::DeregisterDnsMember => self.deregister_dns(envelope).await,
        }
    }

    // ── add pipeline ────────────────────────────────────────────────────

    async fn create_load_balancer(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::CreateLoadBalancer;
        if let Some(record) = self.suspended_stage(envelope, stage).await {
            return record;
        }
        let input = StageInput::now(stage, None);
        let output = match self.lifecycle.create().await {
            Ok(member) => StageOutput::completed(StageDetail::LoadBalancerCreated {
                member: member.identity(),
            }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "load balancer creation failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    async fn associate_edge(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::AssociateEdgeProtection;
        let member = match self.require_member(envelope, stage, StageName::CreateLoadBalancer) {
            Ok(member) => member,
            Err(record) => return record,
        };
        let input = StageInput::now(stage, Some(member.clone()));
        let output = match self.edge.associate(&member.arn).await {
            Ok(associated) => StageOutput::completed(StageDetail::EdgeAssociated { associated }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "edge association failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    async fn register_dns(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::RegisterDnsMember;
        let member = match self.require_member(envelope, stage, StageName::CreateLoadBalancer) {
            Ok(member) => member,
            Err(record) => return record,
        };
        let input = StageInput::now(stage, Some(member.clone()));
        let change = match self.dns.register_member(&member).await {
            Ok(change) => change,
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "dns registration failed");
                return StageRecord { stage, input, output: StageOutput::error(e.to_string()) };
            }
        };
        // joining a previously sole member drops everyone to weight 0
        let output = match self.dns.rebalance().await {
            Ok(_) => StageOutput::completed(StageDetail::DnsChanged { change }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "post-registration rebalance failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    // ── remove pipeline ─────────────────────────────────────────────────

    async fn delete_load_balancer(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::DeleteLoadBalancer;
        if let Some(record) = self.suspended_stage(envelope, stage).await {
            return record;
        }
        let members = match self.inventory.list(FleetFilter::ByDynamicOrigin).await {
            Ok(members) => members,
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "could not list dynamic members");
                return StageRecord {
                    stage,
                    input: StageInput::now(stage, None),
                    output: StageOutput::error(e.to_string()),
                };
            }
        };
        let Some(first) = members.first() else {
            info!(execution_id = %envelope.execution_id, "no dynamic members left to remove");
            return StageRecord {
                stage,
                input: StageInput::now(stage, None),
                output: StageOutput::nothing_to_do(),
            };
        };
        let member = MemberIdentity::from(first);
        let input = StageInput::now(stage, Some(member.clone()));
        let output = match self.lifecycle.delete(&member.arn).await {
            Ok(report) => StageOutput::completed(StageDetail::LoadBalancerDeleted {
                member,
                target_groups: report.target_groups,
            }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "load balancer teardown failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    async fn disassociate_edge(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::DisassociateEdgeProtection;
        let member = match self.require_member(envelope, stage, StageName::DeleteLoadBalancer) {
            Ok(member) => member,
            Err(record) => return record,
        };
        let input = StageInput::now(stage, Some(member.clone()));
        let output = match self.edge.disassociate(&member.arn).await {
            Ok(remaining) => StageOutput::completed(StageDetail::EdgeDisassociated { remaining }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "edge disassociation failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    async fn deregister_dns(&self, envelope: &OperationEnvelope) -> StageRecord {
        let stage = StageName::DeregisterDnsMember;
        let member = match self.require_member(envelope, stage, StageName::DeleteLoadBalancer) {
            Ok(member) => member,
            Err(record) => return record,
        };
        let input = StageInput::now(stage, Some(member.clone()));
        let change = match self.dns.deregister_member(&member.dns_name).await {
            Ok(change) => change,
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "dns deregistration failed");
                return StageRecord { stage, input, output: StageOutput::error(e.to_string()) };
            }
        };
        // the survivors inherit the traffic; a sole one goes back to 255
        let output = match self.dns.rebalance().await {
            Ok(_) => StageOutput::completed(StageDetail::DnsChanged { change }),
            Err(e) => {
                error!(execution_id = %envelope.execution_id, error = %e, "post-removal rebalance failed");
                StageOutput::error(e.to_string())
            }
        };
        StageRecord { stage, input, output }
    }

    // ── shared stage plumbing ───────────────────────────────────────────

    /// First-stage suspend re-check. A flag set after the trigger gate
    /// still stops the run here, as a skip rather than a failure.
    async fn suspended_stage(
        &self,
        envelope: &OperationEnvelope,
        stage: StageName,
    ) -> Option<StageRecord> {
        let input = StageInput::now(stage, None);
        match self.suspend.is_suspended(envelope.workflow).await {
            Ok(false) => None,
            Ok(true) => {
                info!(workflow = %envelope.workflow, "workflow is suspended, skipping");
                Some(StageRecord { stage, input, output: StageOutput::skipped() })
            }
            Err(e) => {
                error!(workflow = %envelope.workflow, error = %e, "could not read suspend flag");
                Some(StageRecord {
                    stage,
                    input,
                    output: StageOutput::error(format!("could not read suspend flag: {e}")),
                })
            }
        }
    }

    fn require_member(
        &self,
        envelope: &OperationEnvelope,
        stage: StageName,
        source: StageName,
    ) -> Result<MemberIdentity, StageRecord> {
        match envelope.member_identity(source) {
            Some(member) => Ok(member.clone()),
            None => {
                error!(
                    execution_id = %envelope.execution_id,
                    %stage,
                    source = %source,
                    "stage is missing its member identity"
                );
                Err(StageRecord {
                    stage,
                    input: StageInput::now(stage, None),
                    output: StageOutput::error(format!("no member identity recorded by {source}")),
                })
            }
        }
    }

    async fn notify_stage(&self, envelope: &OperationEnvelope, record: &StageRecord) {
        let notice = notify::stage_notice(envelope, record);
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(error = %e, subject = %notice.subject, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use flotilla_core::{LoadBalancerState, ORIGIN_TAG_KEY, TagMatch, WaitBudget, WeightedRecord};
    use flotilla_core::{AliasTarget, MAX_MEMBER_WEIGHT};
    use flotilla_dns::DnsSettings;
    use flotilla_edge::EdgeSettings;
    use flotilla_fleet::LifecycleSettings;
    use flotilla_provider::{
        EdgeProtectionProvider, InMemoryCloud, InMemorySuspendSwitch, RecordingNotifier,
        TargetAddress,
    };

    const RECORD_NAME: &str = "app.fleet.example.com";

    struct Rig {
        cloud: Arc<InMemoryCloud>,
        suspend: Arc<InMemorySuspendSwitch>,
        notifier: Arc<RecordingNotifier>,
        workflow: ScaleWorkflow,
    }

    fn fast_budget() -> WaitBudget {
        WaitBudget::new(10, Duration::from_millis(1))
    }

    fn member_tags(origin: &str) -> HashMap<String, String> {
        HashMap::from([
            ("fleet:group".to_string(), "blue".to_string()),
            (ORIGIN_TAG_KEY.to_string(), origin.to_string()),
        ])
    }

    fn rig() -> Rig {
        let cloud = Arc::new(InMemoryCloud::new());
        let suspend = Arc::new(InMemorySuspendSwitch::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let group_tag = TagMatch::new("fleet:group", "blue");
        let lifecycle_settings = LifecycleSettings {
            provision_wait: fast_budget(),
            teardown_wait: fast_budget(),
            group_delete_retry: fast_budget(),
            member_tags: HashMap::from([("fleet:group".to_string(), "blue".to_string())]),
            ..LifecycleSettings::default()
        };
        let workflow = ScaleWorkflow::new(
            FleetInventory::new(cloud.clone(), group_tag),
            LoadBalancerLifecycle::new(cloud.clone(), cloud.clone(), lifecycle_settings),
            EdgeProtectionAssociator::new(
                cloud.clone(),
                EdgeSettings { disassociation_grace: Duration::from_millis(1) },
            ),
            WeightedDnsManager::new(
                cloud.clone(),
                DnsSettings::new(InMemoryCloud::DEFAULT_ZONE, RECORD_NAME)
                    .with_change_wait(fast_budget()),
            ),
            suspend.clone(),
            notifier.clone(),
        );
        Rig { cloud, suspend, notifier, workflow }
    }

    /// Static anchor member: balancer, full-weight record, association.
    async fn seed_static(cloud: &InMemoryCloud) -> flotilla_core::LoadBalancerDescriptor {
        let lb = cloud
            .seed_load_balancer("fleet-anchor", LoadBalancerState::Active, member_tags("static"))
            .await;
        cloud
            .seed_record(WeightedRecord::weighted_alias(
                RECORD_NAME,
                &lb.name,
                MAX_MEMBER_WEIGHT,
                AliasTarget::new(&lb.canonical_zone_id, &lb.dns_name),
            ))
            .await;
        cloud.seed_association(&lb.arn).await;
        lb
    }

    #[tokio::test]
    async fn add_runs_all_three_stages_and_registers_the_member() {
        let rig = rig();
        rig.cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".into(), port: 80 }).await;

        let mut envelope = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Succeeded);
        let stages: Vec<StageName> = envelope.stages.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                StageName::CreateLoadBalancer,
                StageName::AssociateEdgeProtection,
                StageName::RegisterDnsMember,
            ]
        );
        assert!(envelope.stages.iter().all(|r| r.output.status == StageStatus::Completed));

        let members = rig.cloud.load_balancers().await;
        assert_eq!(members.len(), 1);
        assert_eq!(rig.cloud.list_associated().await.unwrap(), vec![members[0].arn.clone()]);
        let records = rig.cloud.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].weight, MAX_MEMBER_WEIGHT);
        assert!(records[0].refers_to(&members[0].dns_name));

        let subjects = rig.notifier.subjects().await;
        assert_eq!(
            subjects,
            vec![
                "CREATE_LOAD_BALANCER operation COMPLETED.",
                "ASSOCIATE_EDGE_PROTECTION operation COMPLETED.",
                "REGISTER_DNS_MEMBER operation COMPLETED.",
            ]
        );
    }

    #[tokio::test]
    async fn add_onto_a_singleton_fleet_zeroes_every_weight() {
        let rig = rig();
        rig.cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".into(), port: 80 }).await;
        seed_static(&rig.cloud).await;

        let mut envelope = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Succeeded);
        let records = rig.cloud.records().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.weight == 0));
    }

    #[tokio::test]
    async fn add_stops_at_the_failing_stage_without_rollback() {
        let rig = rig();
        rig.cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".into(), port: 80 }).await;
        rig.cloud.script_edge_outage(true).await;

        let mut envelope = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Failed);
        assert_eq!(envelope.stages.len(), 2);
        let failed = envelope.failed_stage().unwrap();
        assert_eq!(failed.stage, StageName::AssociateEdgeProtection);
        // the balancer stays for the enforcer to adopt; dns was never reached
        assert_eq!(rig.cloud.load_balancers().await.len(), 1);
        assert!(rig.cloud.records().await.is_empty());

        let subjects = rig.notifier.subjects().await;
        assert_eq!(subjects[1], "ASSOCIATE_EDGE_PROTECTION operation FAILED.");
    }

    #[tokio::test]
    async fn suspended_add_skips_without_touching_the_provider() {
        let rig = rig();
        rig.suspend.set_suspended(WorkflowKind::Add, true).await.unwrap();

        let mut envelope = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Succeeded);
        assert_eq!(envelope.stages.len(), 1);
        assert_eq!(envelope.stages[0].output.status, StageStatus::Skipped);
        assert_eq!(rig.cloud.mutation_count(), 0);
        assert!(rig.notifier.notices().await.is_empty());
    }

    #[tokio::test]
    async fn remove_tears_down_the_first_dynamic_member_only() {
        let rig = rig();
        rig.cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".into(), port: 80 }).await;
        let anchor = seed_static(&rig.cloud).await;

        let mut add = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        assert_eq!(rig.workflow.run(&mut add).await, WorkflowTerminal::Succeeded);
        assert_eq!(rig.cloud.load_balancers().await.len(), 2);

        let mut envelope = OperationEnvelope::new(WorkflowKind::Remove, "remove-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Succeeded);
        let stages: Vec<StageName> = envelope.stages.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                StageName::DeleteLoadBalancer,
                StageName::DisassociateEdgeProtection,
                StageName::DeregisterDnsMember,
            ]
        );

        let members = rig.cloud.load_balancers().await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].arn, anchor.arn);
        assert!(rig.cloud.target_groups().await.is_empty());
        assert_eq!(rig.cloud.list_associated().await.unwrap(), vec![anchor.arn.clone()]);
        let records = rig.cloud.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].weight, MAX_MEMBER_WEIGHT);
        assert!(records[0].refers_to(&anchor.dns_name));
    }

    #[tokio::test]
    async fn remove_with_no_dynamic_members_ends_benignly() {
        let rig = rig();
        seed_static(&rig.cloud).await;
        let before = rig.cloud.mutation_count();

        let mut envelope = OperationEnvelope::new(WorkflowKind::Remove, "remove-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Succeeded);
        assert_eq!(envelope.stages.len(), 1);
        let output = &envelope.stages[0].output;
        assert_eq!(output.status, StageStatus::Completed);
        assert!(!output.operation_required);
        assert_eq!(rig.cloud.mutation_count(), before);
        assert_eq!(
            rig.notifier.subjects().await,
            vec!["DELETE_LOAD_BALANCER operation COMPLETED."]
        );
    }

    #[tokio::test]
    async fn lingering_edge_association_fails_the_remove_run() {
        let rig = rig();
        rig.cloud.seed_backend_target(TargetAddress { ip: "10.0.0.1".into(), port: 80 }).await;

        let mut add = OperationEnvelope::new(WorkflowKind::Add, "add-1", "unit-test");
        assert_eq!(rig.workflow.run(&mut add).await, WorkflowTerminal::Succeeded);
        let arn = rig.cloud.load_balancers().await[0].arn.clone();
        rig.cloud.script_sticky_association(&arn).await;

        let mut envelope = OperationEnvelope::new(WorkflowKind::Remove, "remove-1", "unit-test");
        let terminal = rig.workflow.run(&mut envelope).await;

        assert_eq!(terminal, WorkflowTerminal::Failed);
        let failed = envelope.failed_stage().unwrap();
        assert_eq!(failed.stage, StageName::DisassociateEdgeProtection);
        // the record outlives the member until the enforcer or an
        // operator reconciles it
        assert_eq!(rig.cloud.records().await.len(), 1);
    }
}
