//! Typed operation envelope threaded through scale workflows.
//!
//! Each workflow stage appends exactly one [`StageRecord`] carrying its
//! input context and a typed output. Stages never rewrite earlier
//! records, so the envelope doubles as an audit trail: whatever a
//! notification or API response shows is exactly what the pipeline saw.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::{Arn, ChangeInfo, LoadBalancerDescriptor, TargetGroupDescriptor};

/// Seconds since the Unix epoch, saturating to zero on clock skew.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Which scale workflow an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Add,
    Remove,
}

impl WorkflowKind {
    /// Operator label used in notification subjects.
    pub fn operator(&self) -> &'static str {
        match self {
            WorkflowKind::Add => "ADD_MEMBER",
            WorkflowKind::Remove => "REMOVE_MEMBER",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::Add => write!(f, "add"),
            WorkflowKind::Remove => write!(f, "remove"),
        }
    }
}

/// The fixed stages a workflow may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    CreateLoadBalancer,
    AssociateEdgeProtection,
    RegisterDnsMember,
    DeleteLoadBalancer,
    DisassociateEdgeProtection,
    DeregisterDnsMember,
}

impl StageName {
    /// Operator label used in notification subjects and logs.
    pub fn operator(&self) -> &'static str {
        match self {
            StageName::CreateLoadBalancer => "CREATE_LOAD_BALANCER",
            StageName::AssociateEdgeProtection => "ASSOCIATE_EDGE_PROTECTION",
            StageName::RegisterDnsMember => "REGISTER_DNS_MEMBER",
            StageName::DeleteLoadBalancer => "DELETE_LOAD_BALANCER",
            StageName::DisassociateEdgeProtection => "DISASSOCIATE_EDGE_PROTECTION",
            StageName::DeregisterDnsMember => "DEREGISTER_DNS_MEMBER",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// Terminal status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Completed,
    Error,
    /// The stage ran while the workflow was suspended and did nothing.
    Skipped,
}

/// The identity quadruple stages hand to their successors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub arn: Arn,
    pub name: String,
    pub dns_name: String,
    pub canonical_zone_id: String,
}

impl From<&LoadBalancerDescriptor> for MemberIdentity {
    fn from(lb: &LoadBalancerDescriptor) -> Self {
        Self {
            arn: lb.arn.clone(),
            name: lb.name.clone(),
            dns_name: lb.dns_name.clone(),
            canonical_zone_id: lb.canonical_zone_id.clone(),
        }
    }
}

/// Context a stage started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInput {
    pub operator: String,
    pub started_at: u64,
    /// Member the stage operates on, when a prior stage established one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberIdentity>,
}

impl StageInput {
    pub fn now(stage: StageName, member: Option<MemberIdentity>) -> Self {
        Self {
            operator: stage.operator().to_string(),
            started_at: epoch_secs(),
            member,
        }
    }
}

/// Stage-specific result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    LoadBalancerCreated {
        member: MemberIdentity,
    },
    LoadBalancerDeleted {
        member: MemberIdentity,
        target_groups: Vec<TargetGroupDescriptor>,
    },
    EdgeAssociated {
        associated: Vec<Arn>,
    },
    EdgeDisassociated {
        remaining: Vec<Arn>,
    },
    DnsChanged {
        change: ChangeInfo,
    },
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// Typed outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub status: StageStatus,
    /// False when the workflow found nothing to do, which ends the run
    /// as a benign success. Absent on the wire means true.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub operation_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<StageDetail>,
}

impl StageOutput {
    pub fn completed(detail: StageDetail) -> Self {
        Self {
            status: StageStatus::Completed,
            operation_required: true,
            error_message: None,
            detail: Some(detail),
        }
    }

    /// Benign completion with nothing left for later stages to do.
    pub fn nothing_to_do() -> Self {
        Self {
            status: StageStatus::Completed,
            operation_required: false,
            error_message: None,
            detail: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            operation_required: false,
            error_message: None,
            detail: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Error,
            operation_required: true,
            error_message: Some(message.into()),
            detail: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == StageStatus::Error
    }
}

/// One stage's input and output, appended to the envelope in run order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub input: StageInput,
    pub output: StageOutput,
}

/// The envelope a workflow execution accumulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    pub workflow: WorkflowKind,
    pub execution_id: String,
    pub triggered_by: String,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
}

impl OperationEnvelope {
    pub fn new(
        workflow: WorkflowKind,
        execution_id: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            workflow,
            execution_id: execution_id.into(),
            triggered_by: triggered_by.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage record. Earlier records are never rewritten.
    pub fn record(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    pub fn stage(&self, name: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == name)
    }

    pub fn output(&self, name: StageName) -> Option<&StageOutput> {
        self.stage(name).map(|r| &r.output)
    }

    /// Member identity established by an earlier stage, if any.
    pub fn member_identity(&self, name: StageName) -> Option<&MemberIdentity> {
        match self.output(name)?.detail.as_ref()? {
            StageDetail::LoadBalancerCreated { member } => Some(member),
            StageDetail::LoadBalancerDeleted { member, .. } => Some(member),
            _ => None,
        }
    }

    pub fn failed_stage(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.output.is_error())
    }

    /// Rendered for notifications and logs; never fails for our types.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{} execution {}", self.workflow, self.execution_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeStatus;

    fn member() -> MemberIdentity {
        MemberIdentity {
            arn: "arn:sim:lb/fleet-lb-A1B2C".into(),
            name: "fleet-lb-A1B2C".into(),
            dns_name: "fleet-lb-a1b2c.sim.example.com".into(),
            canonical_zone_id: "Z0SIM".into(),
        }
    }

    #[test]
    fn records_append_in_run_order_and_lookup_by_stage() {
        let mut env = OperationEnvelope::new(WorkflowKind::Add, "exec-1", "test");
        env.record(StageRecord {
            stage: StageName::CreateLoadBalancer,
            input: StageInput::now(StageName::CreateLoadBalancer, None),
            output: StageOutput::completed(StageDetail::LoadBalancerCreated { member: member() }),
        });
        env.record(StageRecord {
            stage: StageName::AssociateEdgeProtection,
            input: StageInput::now(StageName::AssociateEdgeProtection, Some(member())),
            output: StageOutput::error("association refused"),
        });

        assert_eq!(env.stages.len(), 2);
        assert_eq!(env.stages[0].stage, StageName::CreateLoadBalancer);
        let created = env.member_identity(StageName::CreateLoadBalancer).unwrap();
        assert_eq!(created.name, "fleet-lb-A1B2C");
        let failed = env.failed_stage().unwrap();
        assert_eq!(failed.stage, StageName::AssociateEdgeProtection);
        assert_eq!(failed.output.error_message.as_deref(), Some("association refused"));
    }

    #[test]
    fn stage_status_spelling_on_the_wire() {
        assert_eq!(serde_json::to_string(&StageStatus::Completed).unwrap(), "\"COMPLETED\"");
        assert_eq!(serde_json::to_string(&StageStatus::Error).unwrap(), "\"ERROR\"");
        assert_eq!(serde_json::to_string(&StageStatus::Skipped).unwrap(), "\"SKIPPED\"");
    }

    #[test]
    fn absent_operation_required_reads_as_true() {
        let output: StageOutput =
            serde_json::from_str(r#"{"status":"COMPLETED"}"#).unwrap();
        assert!(output.operation_required);
        assert!(output.error_message.is_none());
    }

    #[test]
    fn dns_detail_round_trips_with_change_receipt() {
        let detail = StageDetail::DnsChanged {
            change: ChangeInfo {
                id: "change-7".into(),
                status: ChangeStatus::InSync,
                submitted_at: 1_700_000_000,
            },
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "dns_changed");
        assert_eq!(json["change"]["status"], "INSYNC");
        let back: StageDetail = serde_json::from_value(json).unwrap();
        assert_eq!(back, detail);
    }
}
