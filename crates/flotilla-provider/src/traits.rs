//! Provider trait definitions.

use std::collections::HashMap;

use async_trait::async_trait;
use flotilla_core::{
    Arn, ChangeInfo, ChangeStatus, CreateLoadBalancerSpec, CreateTargetGroupSpec, ForwardTarget,
    ListenerDescriptor, LoadBalancerDescriptor, RecordChange, TargetAddress,
    TargetGroupDescriptor, WeightedRecord, WorkflowKind,
};

use crate::error::ProviderResult;

/// One page of load balancer descriptors.
#[derive(Debug, Clone)]
pub struct LoadBalancerPage {
    pub load_balancers: Vec<LoadBalancerDescriptor>,
    pub next_token: Option<String>,
}

/// Load balancer, target group, and listener operations.
#[async_trait]
pub trait LoadBalancerProvider: Send + Sync {
    /// One page of the account's balancers. Pass the previous page's
    /// token to continue; `None` starts from the beginning.
    async fn list_load_balancers(&self, page_token: Option<String>)
        -> ProviderResult<LoadBalancerPage>;

    async fn describe_tags(
        &self,
        arns: &[Arn],
    ) -> ProviderResult<HashMap<Arn, HashMap<String, String>>>;

    /// Descriptors for the requested balancers, in request order.
    /// Unknown identifiers are omitted rather than failing the call.
    async fn describe_load_balancers(
        &self,
        arns: &[Arn],
    ) -> ProviderResult<Vec<LoadBalancerDescriptor>>;

    async fn create_load_balancer(
        &self,
        spec: &CreateLoadBalancerSpec,
    ) -> ProviderResult<LoadBalancerDescriptor>;

    async fn delete_load_balancer(&self, arn: &Arn) -> ProviderResult<()>;

    /// Target groups reachable through the balancer's listeners.
    async fn describe_target_groups(
        &self,
        lb_arn: &Arn,
    ) -> ProviderResult<Vec<TargetGroupDescriptor>>;

    async fn create_target_group(
        &self,
        spec: &CreateTargetGroupSpec,
    ) -> ProviderResult<TargetGroupDescriptor>;

    async fn register_target(
        &self,
        group_arn: &Arn,
        address: &TargetAddress,
    ) -> ProviderResult<()>;

    async fn delete_target_group(&self, arn: &Arn) -> ProviderResult<()>;

    async fn create_listener(
        &self,
        lb_arn: &Arn,
        port: u16,
        forward: &[ForwardTarget],
    ) -> ProviderResult<ListenerDescriptor>;
}

/// Weighted record set operations on the fleet's hosted zone.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// All weighted records for the given name, however many members.
    async fn list_records(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> ProviderResult<Vec<WeightedRecord>>;

    async fn change_records(
        &self,
        zone_id: &str,
        change: &RecordChange,
        comment: &str,
    ) -> ProviderResult<ChangeInfo>;

    async fn change_status(&self, change_id: &str) -> ProviderResult<ChangeStatus>;
}

/// Edge protection association for fleet members.
#[async_trait]
pub trait EdgeProtectionProvider: Send + Sync {
    async fn associate(&self, resource_arn: &Arn) -> ProviderResult<()>;
    async fn disassociate(&self, resource_arn: &Arn) -> ProviderResult<()>;
    async fn list_associated(&self) -> ProviderResult<Vec<Arn>>;
}

/// Where new fleet members find their backend tasks.
#[async_trait]
pub trait TaskDiscovery: Send + Sync {
    async fn backend_targets(&self) -> ProviderResult<Vec<TargetAddress>>;
}

/// Per-workflow suspend flags, re-read at every gate.
#[async_trait]
pub trait SuspendSwitch: Send + Sync {
    async fn is_suspended(&self, workflow: WorkflowKind) -> ProviderResult<bool>;
    async fn set_suspended(&self, workflow: WorkflowKind, suspended: bool) -> ProviderResult<()>;
}

/// A human-readable notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub message: String,
}

impl Notice {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self { subject: subject.into(), message: message.into() }
    }
}

/// Outbound notification channel for operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> ProviderResult<()>;
}
