//! Weighted record set operations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use flotilla_core::{
    AliasTarget, ChangeInfo, ChangeStatus, MAX_MEMBER_WEIGHT, MemberIdentity, RecordAction,
    RecordChange, WaitBudget, WeightedRecord, wait_until,
};
use flotilla_provider::DnsProvider;

use crate::error::{DnsError, DnsResult};

#[derive(Debug, Clone)]
pub struct DnsSettings {
    pub zone_id: String,
    /// The shared record name every member registers under.
    pub record_name: String,
    pub change_wait: WaitBudget,
}

impl DnsSettings {
    pub fn new(zone_id: impl Into<String>, record_name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            record_name: record_name.into(),
            change_wait: WaitBudget::new(30, Duration::from_secs(10)),
        }
    }

    pub fn with_change_wait(mut self, change_wait: WaitBudget) -> Self {
        self.change_wait = change_wait;
        self
    }
}

#[derive(Clone)]
pub struct WeightedDnsManager {
    provider: Arc<dyn DnsProvider>,
    settings: DnsSettings,
}

impl WeightedDnsManager {
    pub fn new(provider: Arc<dyn DnsProvider>, settings: DnsSettings) -> Self {
        Self { provider, settings }
    }

    /// Current weighted records for the fleet's shared name.
    pub async fn records(&self) -> DnsResult<Vec<WeightedRecord>> {
        Ok(self
            .provider
            .list_records(&self.settings.zone_id, &self.settings.record_name)
            .await?)
    }

    /// Weight a member inserted right now would receive: 255 into an
    /// empty set, 0 alongside anyone else.
    pub async fn weight_for_new_member(&self) -> DnsResult<u64> {
        Ok(Self::insertion_weight(&self.records().await?))
    }

    /// Insert or refresh the member's weighted alias record. The change
    /// is confirmed INSYNC before returning.
    pub async fn register_member(&self, member: &MemberIdentity) -> DnsResult<ChangeInfo> {
        let records = self.records().await?;
        let weight = Self::insertion_weight(&records);
        let exists = records.iter().any(|r| r.refers_to(&member.dns_name));
        let action = if exists { RecordAction::Upsert } else { RecordAction::Create };
        let record = WeightedRecord::weighted_alias(
            &self.settings.record_name,
            &member.name,
            weight,
            AliasTarget::new(&member.canonical_zone_id, &member.dns_name),
        );
        info!(member = %member.name, ?action, weight, "registering dns member");
        let change = self
            .provider
            .change_records(
                &self.settings.zone_id,
                &RecordChange { action, record },
                "fleet member registration",
            )
            .await?;
        self.wait_applied(&change, "dns member registration").await?;
        Ok(ChangeInfo { status: ChangeStatus::InSync, ..change })
    }

    /// Delete the record whose alias DNS name starts with the given
    /// member DNS name, comparing case-insensitively.
    pub async fn deregister_member(&self, dns_prefix: &str) -> DnsResult<ChangeInfo> {
        let records = self.records().await?;
        let wanted = dns_prefix.to_ascii_lowercase();
        let record = records
            .iter()
            .find(|r| r.alias_target.dns_name.to_ascii_lowercase().starts_with(&wanted))
            .cloned()
            .ok_or_else(|| DnsError::MemberNotRegistered { dns_prefix: dns_prefix.to_string() })?;
        info!(set_identifier = %record.set_identifier, weight = record.weight, "deregistering dns member");
        let change = self
            .provider
            .change_records(
                &self.settings.zone_id,
                &RecordChange { action: RecordAction::Delete, record },
                "fleet member deregistration",
            )
            .await?;
        self.wait_applied(&change, "dns member deregistration").await?;
        Ok(ChangeInfo { status: ChangeStatus::InSync, ..change })
    }

    /// Drive the record set back to the weight rule. Returns whether
    /// anything had to change; an already balanced set is left alone.
    pub async fn rebalance(&self) -> DnsResult<bool> {
        let records = self.records().await?;
        match records.len() {
            0 => Ok(false),
            1 => {
                if records[0].weight == MAX_MEMBER_WEIGHT {
                    return Ok(false);
                }
                info!(set_identifier = %records[0].set_identifier, "restoring sole member to full weight");
                let change = self.upsert(records[0].with_weight(MAX_MEMBER_WEIGHT)).await?;
                self.wait_applied(&change, "sole member weight restore").await?;
                Ok(true)
            }
            _ => {
                let offenders: Vec<&WeightedRecord> =
                    records.iter().filter(|r| r.weight != 0).collect();
                if offenders.is_empty() {
                    debug!(members = records.len(), "record set already balanced");
                    return Ok(false);
                }
                info!(offenders = offenders.len(), members = records.len(), "zeroing member weights");
                let mut last = None;
                for record in offenders {
                    last = Some(self.upsert(record.with_weight(0)).await?);
                }
                if let Some(change) = last {
                    self.wait_applied(&change, "weight rebalance").await?;
                }
                Ok(true)
            }
        }
    }

    fn insertion_weight(records: &[WeightedRecord]) -> u64 {
        if records.is_empty() { MAX_MEMBER_WEIGHT } else { 0 }
    }

    async fn upsert(&self, record: WeightedRecord) -> DnsResult<ChangeInfo> {
        Ok(self
            .provider
            .change_records(
                &self.settings.zone_id,
                &RecordChange { action: RecordAction::Upsert, record },
                "fleet weight rebalance",
            )
            .await?)
    }

    async fn wait_applied(&self, change: &ChangeInfo, condition: &str) -> DnsResult<()> {
        if change.status == ChangeStatus::InSync {
            return Ok(());
        }
        wait_until(condition, self.settings.change_wait, || async move {
            Ok(self.provider.change_status(&change.id).await? == ChangeStatus::InSync)
        })
        .await?;
        Ok(())
    }
}
