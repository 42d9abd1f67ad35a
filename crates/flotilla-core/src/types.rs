//! Fleet domain types shared across the control plane.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque provider-assigned resource identifier.
pub type Arn = String;

/// Weight assigned to the sole member of a record set: all traffic.
pub const MAX_MEMBER_WEIGHT: u64 = 255;

/// Weight each listener forward entry assigns to a target group.
pub const FORWARD_WEIGHT: u64 = 10;

/// Tag key recording how a fleet member came to exist.
pub const ORIGIN_TAG_KEY: &str = "fleet:origin";

/// Provisioning lifecycle of a load balancer, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerState {
    Provisioning,
    Active,
    ActiveImpaired,
    Failed,
}

impl LoadBalancerState {
    /// Only active members count toward edge and DNS expectations.
    pub fn is_active(&self) -> bool {
        matches!(self, LoadBalancerState::Active)
    }
}

/// How a member joined the fleet. Static members are provisioned out of
/// band and never torn down by scale-in; dynamic members are created and
/// destroyed by the scale workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningOrigin {
    Static,
    Dynamic,
}

impl ProvisioningOrigin {
    pub fn tag_value(&self) -> &'static str {
        match self {
            ProvisioningOrigin::Static => "static",
            ProvisioningOrigin::Dynamic => "dynamic",
        }
    }
}

/// A load balancer as seen by the inventory: identity plus the fields
/// the DNS and edge layers need to reason about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerDescriptor {
    pub arn: Arn,
    pub name: String,
    pub dns_name: String,
    /// Hosted zone the provider assigned to the balancer itself, used as
    /// the alias target zone when registering the member in DNS.
    pub canonical_zone_id: String,
    pub state: LoadBalancerState,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl LoadBalancerDescriptor {
    pub fn origin(&self) -> Option<ProvisioningOrigin> {
        match self.tags.get(ORIGIN_TAG_KEY).map(String::as_str) {
            Some("dynamic") => Some(ProvisioningOrigin::Dynamic),
            Some("static") => Some(ProvisioningOrigin::Static),
            _ => None,
        }
    }
}

/// A target group owned by a fleet member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupDescriptor {
    pub arn: Arn,
    pub name: String,
}

/// Backend address registered into a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAddress {
    pub ip: String,
    pub port: u16,
}

/// Parameters for provisioning a new load balancer.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateLoadBalancerSpec {
    pub name: String,
    pub tags: HashMap<String, String>,
}

/// Parameters for provisioning a new target group.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTargetGroupSpec {
    pub name: String,
    pub port: u16,
    pub tags: HashMap<String, String>,
}

/// One weighted entry in a listener's forward action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub target_group_arn: Arn,
    pub weight: u64,
}

/// A listener attached to a fleet member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerDescriptor {
    pub arn: Arn,
    pub port: u16,
    pub forward: Vec<ForwardTarget>,
}

/// Record type of the weighted alias entries the fleet manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
}

/// Alias target of a weighted record: where the record points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasTarget {
    #[serde(rename = "HostedZoneId")]
    pub hosted_zone_id: String,
    #[serde(rename = "DNSName")]
    pub dns_name: String,
    #[serde(rename = "EvaluateTargetHealth")]
    pub evaluate_target_health: bool,
}

impl AliasTarget {
    pub fn new(hosted_zone_id: impl Into<String>, dns_name: impl Into<String>) -> Self {
        Self {
            hosted_zone_id: hosted_zone_id.into(),
            dns_name: dns_name.into(),
            evaluate_target_health: true,
        }
    }
}

/// One weighted alias record in the fleet's record set. Field names on
/// the wire follow the provider's change-batch schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: RecordType,
    #[serde(rename = "SetIdentifier")]
    pub set_identifier: String,
    #[serde(rename = "Weight")]
    pub weight: u64,
    #[serde(rename = "AliasTarget")]
    pub alias_target: AliasTarget,
}

impl WeightedRecord {
    pub fn weighted_alias(
        name: impl Into<String>,
        set_identifier: impl Into<String>,
        weight: u64,
        alias_target: AliasTarget,
    ) -> Self {
        Self {
            name: name.into(),
            record_type: RecordType::A,
            set_identifier: set_identifier.into(),
            weight,
            alias_target,
        }
    }

    pub fn with_weight(&self, weight: u64) -> Self {
        Self { weight, ..self.clone() }
    }

    /// Whether this record's alias points at the given member DNS name.
    pub fn refers_to(&self, member_dns: &str) -> bool {
        alias_refers_to(&self.alias_target.dns_name, member_dns)
    }
}

/// Compare an alias DNS name against a member DNS name. Providers store
/// aliases fully qualified (trailing dot) and case folds freely, so the
/// comparison normalizes both sides.
pub fn alias_refers_to(alias_dns: &str, member_dns: &str) -> bool {
    let alias = alias_dns.trim_end_matches('.').to_ascii_lowercase();
    let member = member_dns.trim_end_matches('.').to_ascii_lowercase();
    alias == member
}

/// Action applied to a record in a change submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordAction {
    Create,
    Upsert,
    Delete,
}

/// One record change to submit to the DNS provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub action: RecordAction,
    pub record: WeightedRecord,
}

/// Propagation status of a submitted change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "INSYNC")]
    InSync,
}

/// Receipt for a submitted record change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub id: String,
    pub status: ChangeStatus,
    pub submitted_at: u64,
}

/// Tag predicate used to recognize fleet members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatch {
    pub key: String,
    pub value: String,
}

impl TagMatch {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        tags.get(&self.key).is_some_and(|v| v == &self.value)
    }
}

/// Inventory filter: the whole fleet, or only the members scale-in may
/// tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetFilter {
    /// Every balancer carrying the configured group tag.
    ByGroupTag,
    /// Only balancers tagged as dynamically provisioned.
    ByDynamicOrigin,
}

impl fmt::Display for FleetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetFilter::ByGroupTag => write!(f, "group"),
            FleetFilter::ByDynamicOrigin => write!(f, "dynamic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid fleet filter {value:?}, expected \"group\" or \"dynamic\"")]
pub struct InvalidFilter {
    pub value: String,
}

impl FromStr for FleetFilter {
    type Err = InvalidFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "group" => Ok(FleetFilter::ByGroupTag),
            "dynamic" => Ok(FleetFilter::ByDynamicOrigin),
            _ => Err(InvalidFilter { value: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_record_serde_uses_provider_field_names() {
        let record = WeightedRecord::weighted_alias(
            "app.fleet.example.com",
            "fleet-lb-A1B2C",
            MAX_MEMBER_WEIGHT,
            AliasTarget::new("Z0SIM", "fleet-lb-a1b2c.sim.example.com"),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Name"], "app.fleet.example.com");
        assert_eq!(json["Type"], "A");
        assert_eq!(json["SetIdentifier"], "fleet-lb-A1B2C");
        assert_eq!(json["Weight"], 255);
        assert_eq!(json["AliasTarget"]["DNSName"], "fleet-lb-a1b2c.sim.example.com");
        assert_eq!(json["AliasTarget"]["EvaluateTargetHealth"], true);
    }

    #[test]
    fn alias_comparison_ignores_case_and_trailing_dot() {
        assert!(alias_refers_to(
            "Fleet-LB-A1B2C.sim.example.com.",
            "fleet-lb-a1b2c.SIM.example.com"
        ));
        assert!(!alias_refers_to(
            "fleet-lb-a1b2c.sim.example.com.",
            "fleet-lb-zzzzz.sim.example.com"
        ));
    }

    #[test]
    fn filter_parses_known_names_case_insensitively() {
        assert_eq!("group".parse::<FleetFilter>().unwrap(), FleetFilter::ByGroupTag);
        assert_eq!("DYNAMIC".parse::<FleetFilter>().unwrap(), FleetFilter::ByDynamicOrigin);
        let err = "all".parse::<FleetFilter>().unwrap_err();
        assert_eq!(err.value, "all");
    }

    #[test]
    fn origin_read_from_tags() {
        let mut tags = HashMap::new();
        tags.insert(ORIGIN_TAG_KEY.to_string(), "dynamic".to_string());
        let lb = LoadBalancerDescriptor {
            arn: "arn:sim:lb/one".into(),
            name: "one".into(),
            dns_name: "one.sim.example.com".into(),
            canonical_zone_id: "Z0SIM".into(),
            state: LoadBalancerState::Active,
            tags,
        };
        assert_eq!(lb.origin(), Some(ProvisioningOrigin::Dynamic));
        assert!(lb.state.is_active());
    }

    #[test]
    fn change_status_serde_matches_provider_spelling() {
        assert_eq!(serde_json::to_string(&ChangeStatus::InSync).unwrap(), "\"INSYNC\"");
        assert_eq!(serde_json::to_string(&ChangeStatus::Pending).unwrap(), "\"PENDING\"");
    }
}
