//! Provisioning and teardown of fleet members.
//!
//! A member is never half-born: `create` returns only once the balancer
//! is active, every discovered backend has its own target group, and the
//! listener forwards to all of them. Teardown deletes the balancer
//! first, then retries the target groups with a bounded budget while the
//! provider drains their connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use flotilla_core::{
    Arn, CreateLoadBalancerSpec, CreateTargetGroupSpec, ForwardTarget, FORWARD_WEIGHT,
    ListenerDescriptor, LoadBalancerDescriptor, MemberIdentity, ORIGIN_TAG_KEY,
    ProvisioningOrigin, TargetGroupDescriptor, WaitBudget, random_suffix, wait_until,
};
use flotilla_provider::{LoadBalancerProvider, ProviderError, TaskDiscovery};

use crate::error::{FleetError, FleetResult};

const NAME_SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub name_prefix: String,
    pub listener_port: u16,
    pub target_port: u16,
    pub forward_weight: u64,
    pub provision_wait: WaitBudget,
    pub teardown_wait: WaitBudget,
    /// Target group deletion retry: the provider holds groups in use
    /// while connections drain.
    pub group_delete_retry: WaitBudget,
    /// Applied to the balancer and its target groups; the origin tag is
    /// added on top.
    pub member_tags: HashMap<String, String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            name_prefix: "fleet-lb".to_string(),
            listener_port: 80,
            target_port: 80,
            forward_weight: FORWARD_WEIGHT,
            provision_wait: WaitBudget::new(40, Duration::from_secs(15)),
            teardown_wait: WaitBudget::new(40, Duration::from_secs(15)),
            group_delete_retry: WaitBudget::new(30, Duration::from_secs(10)),
            member_tags: HashMap::new(),
        }
    }
}

/// Everything `create` provisioned.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedMember {
    pub descriptor: LoadBalancerDescriptor,
    pub target_groups: Vec<TargetGroupDescriptor>,
    pub listener: ListenerDescriptor,
}

impl ProvisionedMember {
    pub fn identity(&self) -> MemberIdentity {
        (&self.descriptor).into()
    }
}

/// Everything `delete` tore down.
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownReport {
    pub member_arn: Arn,
    pub target_groups: Vec<TargetGroupDescriptor>,
    /// Passes over the group list it took before all deletions stuck.
    pub attempts: u32,
}

pub struct LoadBalancerLifecycle {
    provider: Arc<dyn LoadBalancerProvider>,
    discovery: Arc<dyn TaskDiscovery>,
    settings: LifecycleSettings,
}

impl LoadBalancerLifecycle {
    pub fn new(
        provider: Arc<dyn LoadBalancerProvider>,
        discovery: Arc<dyn TaskDiscovery>,
        settings: LifecycleSettings,
    ) -> Self {
        Self { provider, discovery, settings }
    }

    /// Provision a complete member: balancer, one target group per
    /// discovered backend, and the weighted listener tying them together.
    pub async fn create(&self) -> FleetResult<ProvisionedMember> {
        let suffix = random_suffix(NAME_SUFFIX_LEN);
        let name = format!("{}-{}", self.settings.name_prefix, suffix);
        let tags = self.member_tags();
        info!(%name, "provisioning fleet member");

        let mut descriptor = self
            .provider
            .create_load_balancer(&CreateLoadBalancerSpec { name, tags: tags.clone() })
            .await?;
        self.wait_active(&descriptor.arn).await?;
        if let Some(settled) = self
            .provider
            .describe_load_balancers(std::slice::from_ref(&descriptor.arn))
            .await?
            .into_iter()
            .next()
        {
            descriptor = settled;
        }

        let targets = self.discovery.backend_targets().await?;
        if targets.is_empty() {
            return Err(FleetError::NoBackendTargets);
        }

        let mut groups = Vec::with_capacity(targets.len());
        for (index, address) in targets.iter().enumerate() {
            let group = self
                .provider
                .create_target_group(&CreateTargetGroupSpec {
                    name: format!("{}-tg-{}-{:02}", self.settings.name_prefix, suffix, index + 1),
                    port: self.settings.target_port,
                    tags: tags.clone(),
                })
                .await?;
            self.provider.register_target(&group.arn, address).await?;
            groups.push(group);
        }

        let forward: Vec<ForwardTarget> = groups
            .iter()
            .map(|g| ForwardTarget {
                target_group_arn: g.arn.clone(),
                weight: self.settings.forward_weight,
            })
            .collect();
        let listener = self
            .provider
            .create_listener(&descriptor.arn, self.settings.listener_port, &forward)
            .await?;

        info!(
            arn = %descriptor.arn,
            dns_name = %descriptor.dns_name,
            target_groups = groups.len(),
            "fleet member provisioned"
        );
        Ok(ProvisionedMember { descriptor, target_groups: groups, listener })
    }

    /// Tear down a member. The balancer goes first; its target groups
    /// are retried until the provider releases them or the budget runs
    /// out, in which case the report of what did get deleted rides in
    /// the error.
    pub async fn delete(&self, arn: &Arn) -> FleetResult<TeardownReport> {
        let groups = self.provider.describe_target_groups(arn).await?;
        info!(%arn, target_groups = groups.len(), "tearing down fleet member");

        self.provider.delete_load_balancer(arn).await?;
        self.wait_deleted(arn).await?;

        let retry = self.settings.group_delete_retry;
        let mut deleted: Vec<Arn> = Vec::with_capacity(groups.len());
        let mut attempts = 0;
        for attempt in 1..=retry.attempts {
            attempts = attempt;
            match self.delete_remaining_groups(&groups, &mut deleted).await {
                Ok(()) => break,
                Err(e) if e.is_in_use() => {
                    if attempt == retry.attempts {
                        break;
                    }
                    warn!(attempt, error = %e, "target group still draining, retrying");
                    tokio::time::sleep(retry.delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if deleted.len() != groups.len() {
            return Err(FleetError::PartialTeardown {
                expected: groups.iter().map(|g| g.arn.clone()).collect(),
                deleted,
            });
        }
        info!(%arn, attempts, "fleet member torn down");
        Ok(TeardownReport { member_arn: arn.clone(), target_groups: groups, attempts })
    }

    fn member_tags(&self) -> HashMap<String, String> {
        let mut tags = self.settings.member_tags.clone();
        tags.insert(
            ORIGIN_TAG_KEY.to_string(),
            ProvisioningOrigin::Dynamic.tag_value().to_string(),
        );
        tags
    }

    async fn wait_active(&self, arn: &Arn) -> FleetResult<()> {
        wait_until("load balancer active", self.settings.provision_wait, || async move {
            let described =
                self.provider.describe_load_balancers(std::slice::from_ref(arn)).await?;
            Ok(described.first().is_some_and(|lb| lb.state.is_active()))
        })
        .await?;
        Ok(())
    }

    async fn wait_deleted(&self, arn: &Arn) -> FleetResult<()> {
        wait_until("load balancer deleted", self.settings.teardown_wait, || async move {
            let described =
                self.provider.describe_load_balancers(std::slice::from_ref(arn)).await?;
            Ok(described.is_empty())
        })
        .await?;
        Ok(())
    }

    async fn delete_remaining_groups(
        &self,
        groups: &[TargetGroupDescriptor],
        deleted: &mut Vec<Arn>,
    ) -> Result<(), ProviderError> {
        for group in groups {
            if deleted.contains(&group.arn) {
                continue;
            }
            self.provider.delete_target_group(&group.arn).await?;
            deleted.push(group.arn.clone());
        }
        Ok(())
    }
}
