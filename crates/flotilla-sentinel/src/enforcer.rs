//! Integrity enforcer — scheduled drift correction.
//!
//! Each pass re-reads the fleet by group tag and pushes the edge
//! association list and the weighted record set back to what that
//! membership implies. Every correction is idempotent on its own, so a
//! pass over an already-consistent fleet issues zero mutating provider
//! calls. The enforcer deliberately does not consult the operation
//! guard: a correction that interleaves with a live scale workflow
//! converges on the same invariant the workflow is establishing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use flotilla_core::{Arn, FleetFilter, MemberIdentity};
use flotilla_dns::WeightedDnsManager;
use flotilla_edge::EdgeProtectionAssociator;
use flotilla_fleet::FleetInventory;
use flotilla_provider::{Notice, Notifier};

use crate::error::SentinelResult;

/// What one enforcement pass had to correct.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnforcementReport {
    /// Members that were missing their edge association.
    pub associated: Vec<Arn>,
    /// Members that were missing from the weighted record set.
    pub inserted: Vec<String>,
    /// Whether the weight rule had to be re-applied.
    pub rebalanced: bool,
}

impl EnforcementReport {
    pub fn drift_corrected(&self) -> bool {
        !self.associated.is_empty() || !self.inserted.is_empty() || self.rebalanced
    }
}

pub struct IntegrityEnforcer {
    inventory: FleetInventory,
    edge: EdgeProtectionAssociator,
    dns: WeightedDnsManager,
    notifier: Arc<dyn Notifier>,
}

impl IntegrityEnforcer {
    pub fn new(
        inventory: FleetInventory,
        edge: EdgeProtectionAssociator,
        dns: WeightedDnsManager,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { inventory, edge, dns, notifier }
    }

    /// One read-then-correct pass over the whole fleet.
    pub async fn pass(&self) -> SentinelResult<EnforcementReport> {
        let members = self.inventory.list(FleetFilter::ByGroupTag).await?;
        let mut report = EnforcementReport::default();

        // Only active members are expected to be protected and routable;
        // provisioning and failed ones are someone else's problem.
        let active: Vec<_> = members.iter().filter(|m| m.state.is_active()).collect();

        let associated = self.edge.list_associated().await?;
        for member in &active {
            if !associated.contains(&member.arn) {
                info!(arn = %member.arn, "enforcing missing edge association");
                self.edge.associate(&member.arn).await?;
                report.associated.push(member.arn.clone());
            }
        }

        let records = self.dns.records().await?;
        for member in &active {
            if !records.iter().any(|r| r.refers_to(&member.dns_name)) {
                info!(name = %member.name, dns_name = %member.dns_name, "enforcing missing dns membership");
                // register_member re-reads the record set, so each insert
                // picks its weight from the set as it stands then.
                self.dns.register_member(&MemberIdentity::from(*member)).await?;
                report.inserted.push(member.name.clone());
            }
        }

        report.rebalanced = self.dns.rebalance().await?;

        if report.drift_corrected() {
            info!(
                associated = report.associated.len(),
                inserted = report.inserted.len(),
                rebalanced = report.rebalanced,
                "integrity enforcement corrected drift"
            );
        } else {
            debug!(members = members.len(), "fleet is consistent, nothing to enforce");
        }
        Ok(report)
    }

    /// Run enforcement passes at a fixed rate until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "integrity enforcer started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.pass().await {
                        error!(error = %e, "integrity enforcement pass failed");
                        let notice = Notice::new(
                            "Unexpected error in the integrity enforcer process.",
                            format!("The integrity enforcement pass failed: {e}"),
                        );
                        if let Err(e) = self.notifier.notify(&notice).await {
                            error!(error = %e, "enforcer failure notification failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("integrity enforcer shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use flotilla_core::{
        AliasTarget, LoadBalancerState, MAX_MEMBER_WEIGHT, ORIGIN_TAG_KEY, TagMatch, WaitBudget,
        WeightedRecord,
    };
    use flotilla_dns::DnsSettings;
    use flotilla_edge::EdgeSettings;
    use flotilla_provider::{InMemoryCloud, RecordingNotifier};

    const RECORD_NAME: &str = "app.fleet.example.com";

    fn group_tags() -> HashMap<String, String> {
        HashMap::from([
            ("fleet:group".to_string(), "blue".to_string()),
            (ORIGIN_TAG_KEY.to_string(), "static".to_string()),
        ])
    }

    fn enforcer(cloud: &Arc<InMemoryCloud>) -> IntegrityEnforcer {
        let fast = WaitBudget::new(5, Duration::from_millis(1));
        IntegrityEnforcer::new(
            FleetInventory::new(cloud.clone(), TagMatch::new("fleet:group", "blue")),
            EdgeProtectionAssociator::new(
                cloud.clone(),
                EdgeSettings { disassociation_grace: Duration::from_millis(1) },
            ),
            WeightedDnsManager::new(
                cloud.clone(),
                DnsSettings::new(InMemoryCloud::DEFAULT_ZONE, RECORD_NAME).with_change_wait(fast),
            ),
            Arc::new(RecordingNotifier::new()),
        )
    }

    #[tokio::test]
    async fn corrects_a_fully_drifted_member() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb = cloud
            .seed_load_balancer("fleet-lb-drift", LoadBalancerState::Active, group_tags())
            .await;

        let report = enforcer(&cloud).pass().await.unwrap();

        assert_eq!(report.associated, vec![lb.arn.clone()]);
        assert_eq!(report.inserted, vec!["fleet-lb-drift".to_string()]);
        // sole member inserted into an empty set takes full weight
        let records = cloud.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].weight, MAX_MEMBER_WEIGHT);
        assert!(!report.rebalanced);
    }

    #[tokio::test]
    async fn second_pass_with_no_drift_issues_zero_mutations() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.seed_load_balancer("fleet-lb-a", LoadBalancerState::Active, group_tags()).await;
        let enforcer = enforcer(&cloud);

        let first = enforcer.pass().await.unwrap();
        assert!(first.drift_corrected());

        let mutations = cloud.mutation_count();
        let second = enforcer.pass().await.unwrap();
        assert!(!second.drift_corrected());
        assert_eq!(cloud.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn rebalances_a_two_member_set_carrying_weight() {
        let cloud = Arc::new(InMemoryCloud::new());
        for name in ["fleet-lb-a", "fleet-lb-b"] {
            let lb =
                cloud.seed_load_balancer(name, LoadBalancerState::Active, group_tags()).await;
            cloud.seed_association(&lb.arn).await;
            cloud
                .seed_record(WeightedRecord::weighted_alias(
                    RECORD_NAME,
                    name,
                    if name.ends_with('a') { MAX_MEMBER_WEIGHT } else { 0 },
                    AliasTarget::new(&lb.canonical_zone_id, &lb.dns_name),
                ))
                .await;
        }

        let report = enforcer(&cloud).pass().await.unwrap();

        assert!(report.associated.is_empty());
        assert!(report.inserted.is_empty());
        assert!(report.rebalanced);
        assert!(cloud.records().await.iter().all(|r| r.weight == 0));
    }

    #[tokio::test]
    async fn restores_a_sole_zero_weight_member() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb =
            cloud.seed_load_balancer("fleet-lb-a", LoadBalancerState::Active, group_tags()).await;
        cloud.seed_association(&lb.arn).await;
        cloud
            .seed_record(WeightedRecord::weighted_alias(
                RECORD_NAME,
                "fleet-lb-a",
                0,
                AliasTarget::new(&lb.canonical_zone_id, &lb.dns_name),
            ))
            .await;

        let report = enforcer(&cloud).pass().await.unwrap();

        assert!(report.rebalanced);
        assert_eq!(cloud.records().await[0].weight, MAX_MEMBER_WEIGHT);
    }

    #[tokio::test]
    async fn inactive_members_are_left_alone() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud
            .seed_load_balancer("fleet-lb-sick", LoadBalancerState::ActiveImpaired, group_tags())
            .await;
        cloud
            .seed_load_balancer("fleet-lb-new", LoadBalancerState::Provisioning, group_tags())
            .await;

        let report = enforcer(&cloud).pass().await.unwrap();

        assert!(!report.drift_corrected());
        assert!(cloud.records().await.is_empty());
    }
}
