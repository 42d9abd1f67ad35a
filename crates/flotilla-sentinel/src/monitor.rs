//! Fleet monitor — scheduled read-only invariant checking.
//!
//! The monitor looks at the same state the enforcer corrects but only
//! reports: each broken invariant becomes a typed [`Violation`] tagged
//! with whether the enforcer will fix it on its own. It stands down
//! while a scale operation runs, since a half-finished pipeline breaks
//! these invariants transiently by design.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use flotilla_core::{Arn, FleetFilter, LoadBalancerState, MAX_MEMBER_WEIGHT};
use flotilla_dns::WeightedDnsManager;
use flotilla_edge::EdgeProtectionAssociator;
use flotilla_fleet::FleetInventory;
use flotilla_provider::{Notice, Notifier};
use flotilla_workflow::OperationGuard;

use crate::error::SentinelResult;

/// How the weighted record set breaks the weight rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightViolation {
    /// More than one member, at least one carrying nonzero weight.
    MultipleWithNonzero { set_identifiers: Vec<String> },
    /// Exactly one member, sitting at weight 0 and taking no traffic.
    SoleMemberAtZero { set_identifier: String },
    /// No records at all while active members exist.
    EmptyRecordSet { expected: usize },
}

/// One broken fleet invariant, observed but not corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    ImpairedMembers { arns: Vec<Arn> },
    MissingEdgeAssociation { arns: Vec<Arn> },
    MissingDnsMembership { dns_names: Vec<String> },
    WeightInvariant { detail: WeightViolation },
}

impl Violation {
    /// Whether the integrity enforcer resolves this on its next pass.
    /// An impaired balancer is the provider's to heal, not ours.
    pub fn auto_remediable(&self) -> bool {
        !matches!(self, Violation::ImpairedMembers { .. })
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ImpairedMembers { arns } => write!(
                f,
                "members {} are in state 'active_impaired', expected 'active'",
                arns.join(",")
            ),
            Violation::MissingEdgeAssociation { arns } => write!(
                f,
                "members {} are not associated with the edge protection policy",
                arns.join(",")
            ),
            Violation::MissingDnsMembership { dns_names } => write!(
                f,
                "members {} are missing from the weighted record set",
                dns_names.join(",")
            ),
            Violation::WeightInvariant { detail } => match detail {
                WeightViolation::MultipleWithNonzero { set_identifiers } => write!(
                    f,
                    "multiple members share the record set but {} carry nonzero weight; all must be 0",
                    set_identifiers.join(",")
                ),
                WeightViolation::SoleMemberAtZero { set_identifier } => write!(
                    f,
                    "sole member {set_identifier} has weight 0 and receives no traffic; expected {MAX_MEMBER_WEIGHT}"
                ),
                WeightViolation::EmptyRecordSet { expected } => write!(
                    f,
                    "the weighted record set is empty; {expected} active members expected records"
                ),
            },
        }
    }
}

/// Result of one monitor pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MonitorOutcome {
    Ok,
    /// A scale operation was running; nothing was checked.
    SkippedOperationInProgress,
    Violations { violations: Vec<Violation> },
}

pub struct FleetMonitor {
    inventory: FleetInventory,
    edge: EdgeProtectionAssociator,
    dns: WeightedDnsManager,
    guard: OperationGuard,
    notifier: Arc<dyn Notifier>,
    /// Quoted in violation notices so operators know when the enforcer
    /// will next act.
    enforcer_rate: Duration,
}

impl FleetMonitor {
    pub fn new(
        inventory: FleetInventory,
        edge: EdgeProtectionAssociator,
        dns: WeightedDnsManager,
        guard: OperationGuard,
        notifier: Arc<dyn Notifier>,
        enforcer_rate: Duration,
    ) -> Self {
        Self { inventory, edge, dns, guard, notifier, enforcer_rate }
    }

    /// One read-only pass over every fleet invariant.
    pub async fn check(&self) -> SentinelResult<MonitorOutcome> {
        if self.guard.operation_in_progress().await {
            info!("scale operation in progress, skipping monitor pass");
            return Ok(MonitorOutcome::SkippedOperationInProgress);
        }

        let members = self.inventory.list(FleetFilter::ByGroupTag).await?;
        let associated = self.edge.list_associated().await?;
        let records = self.dns.records().await?;
        let active: Vec<_> = members.iter().filter(|m| m.state.is_active()).collect();

        let mut violations = Vec::new();

        let impaired: Vec<Arn> = members
            .iter()
            .filter(|m| m.state == LoadBalancerState::ActiveImpaired)
            .map(|m| m.arn.clone())
            .collect();
        if !impaired.is_empty() {
            violations.push(Violation::ImpairedMembers { arns: impaired });
        }

        let unprotected: Vec<Arn> = active
            .iter()
            .filter(|m| !associated.contains(&m.arn))
            .map(|m| m.arn.clone())
            .collect();
        if !unprotected.is_empty() {
            violations.push(Violation::MissingEdgeAssociation { arns: unprotected });
        }

        let unregistered: Vec<String> = active
            .iter()
            .filter(|m| !records.iter().any(|r| r.refers_to(&m.dns_name)))
            .map(|m| m.dns_name.clone())
            .collect();
        if !unregistered.is_empty() {
            violations.push(Violation::MissingDnsMembership { dns_names: unregistered });
        }

        match records.len() {
            0 => {
                violations.push(Violation::WeightInvariant {
                    detail: WeightViolation::EmptyRecordSet { expected: active.len() },
                });
            }
            1 => {
                if records[0].weight == 0 {
                    violations.push(Violation::WeightInvariant {
                        detail: WeightViolation::SoleMemberAtZero {
                            set_identifier: records[0].set_identifier.clone(),
                        },
                    });
                }
            }
            _ => {
                let offenders: Vec<String> = records
                    .iter()
                    .filter(|r| r.weight != 0)
                    .map(|r| r.set_identifier.clone())
                    .collect();
                if !offenders.is_empty() {
                    violations.push(Violation::WeightInvariant {
                        detail: WeightViolation::MultipleWithNonzero {
                            set_identifiers: offenders,
                        },
                    });
                }
            }
        }

        if violations.is_empty() {
            debug!(members = members.len(), records = records.len(), "all fleet invariants hold");
            Ok(MonitorOutcome::Ok)
        } else {
            for violation in &violations {
                error!(%violation, auto_remediable = violation.auto_remediable(), "fleet invariant violated");
            }
            Ok(MonitorOutcome::Violations { violations })
        }
    }

    /// Run monitor passes at a fixed rate until shutdown, reporting
    /// every violation through the notifier.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "fleet monitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.check().await {
                        Ok(MonitorOutcome::Violations { violations }) => {
                            for violation in &violations {
                                self.notify(self.violation_notice(violation)).await;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "monitor pass failed");
                            self.notify(Notice::new(
                                "Unexpected error in the fleet monitor process.",
                                format!("The monitor pass failed: {e}"),
                            ))
                            .await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("fleet monitor shutting down");
                    break;
                }
            }
        }
    }

    fn violation_notice(&self, violation: &Violation) -> Notice {
        let remediation = if violation.auto_remediable() {
            format!(
                "This issue can be AUTO_REMEDIATED and should resolve on the next \
                 integrity enforcer pass, which runs every {} seconds.",
                self.enforcer_rate.as_secs()
            )
        } else {
            "This type of issue can NOT be AUTO_REMEDIATED and requires manual action."
                .to_string()
        };
        Notice::new("Fleet invariant violation detected.", format!("{violation}. {remediation}"))
    }

    async fn notify(&self, notice: Notice) {
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(error = %e, subject = %notice.subject, "notification delivery failed");
        }
    }
}
