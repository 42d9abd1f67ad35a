//! Tag-driven fleet membership.
//!
//! The provider account holds balancers that have nothing to do with the
//! fleet, so membership is decided purely by tags: the configured group
//! tag marks a member, the origin tag marks the ones scale-in is allowed
//! to tear down. Listing walks every page and keeps first-seen order so
//! "the first dynamic member" is a stable choice.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use flotilla_core::{Arn, FleetFilter, LoadBalancerDescriptor, ORIGIN_TAG_KEY, TagMatch};
use flotilla_provider::LoadBalancerProvider;

use crate::error::FleetResult;

#[derive(Clone)]
pub struct FleetInventory {
    provider: Arc<dyn LoadBalancerProvider>,
    group_tag: TagMatch,
}

impl FleetInventory {
    pub fn new(provider: Arc<dyn LoadBalancerProvider>, group_tag: TagMatch) -> Self {
        Self { provider, group_tag }
    }

    /// Fleet members matching the filter, in first-seen provider order.
    pub async fn list(&self, filter: FleetFilter) -> FleetResult<Vec<LoadBalancerDescriptor>> {
        let arns = self.all_balancer_arns().await?;
        if arns.is_empty() {
            debug!(%filter, "account holds no load balancers");
            return Ok(Vec::new());
        }

        let tags = self.provider.describe_tags(&arns).await?;
        let matched: Vec<Arn> = arns
            .into_iter()
            .filter(|arn| {
                let Some(tags) = tags.get(arn) else { return false };
                match filter {
                    FleetFilter::ByGroupTag => self.group_tag.matches(tags),
                    FleetFilter::ByDynamicOrigin => {
                        tags.get(ORIGIN_TAG_KEY).is_some_and(|v| v == "dynamic")
                    }
                }
            })
            .collect();
        if matched.is_empty() {
            debug!(%filter, "no balancers match the fleet filter");
            return Ok(Vec::new());
        }

        let members = self.provider.describe_load_balancers(&matched).await?;
        debug!(%filter, members = members.len(), "fleet inventory listed");
        Ok(members)
    }

    /// Same as [`list`](Self::list) with the filter still in string form,
    /// as it arrives from the API.
    pub async fn list_named(&self, filter: &str) -> FleetResult<Vec<LoadBalancerDescriptor>> {
        let filter: FleetFilter = filter.parse()?;
        self.list(filter).await
    }

    /// Every balancer identifier in the account, all pages, first-seen
    /// order, duplicates dropped.
    async fn all_balancer_arns(&self) -> FleetResult<Vec<Arn>> {
        let mut arns = Vec::new();
        let mut seen = HashSet::new();
        let mut token = None;
        loop {
            let page = self.provider.list_load_balancers(token).await?;
            for lb in page.load_balancers {
                if seen.insert(lb.arn.clone()) {
                    arns.push(lb.arn);
                }
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(arns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;
    use flotilla_provider::InMemoryCloud;
    use flotilla_core::LoadBalancerState;
    use std::collections::HashMap;

    fn group_tag() -> TagMatch {
        TagMatch::new("fleet:group", "blue")
    }

    fn member_tags(origin: &str) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        tags.insert("fleet:group".to_string(), "blue".to_string());
        tags.insert(ORIGIN_TAG_KEY.to_string(), origin.to_string());
        tags
    }

    #[tokio::test]
    async fn lists_group_members_in_first_seen_order_across_pages() {
        let cloud = Arc::new(InMemoryCloud::new().with_page_size(1));
        cloud
            .seed_load_balancer("member-a", LoadBalancerState::Active, member_tags("static"))
            .await;
        cloud
            .seed_load_balancer("stranger", LoadBalancerState::Active, HashMap::new())
            .await;
        cloud
            .seed_load_balancer("member-b", LoadBalancerState::Active, member_tags("dynamic"))
            .await;

        let inventory = FleetInventory::new(cloud, group_tag());
        let members = inventory.list(FleetFilter::ByGroupTag).await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["member-a", "member-b"]);
    }

    #[tokio::test]
    async fn dynamic_filter_excludes_static_members() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud
            .seed_load_balancer("anchor", LoadBalancerState::Active, member_tags("static"))
            .await;
        cloud
            .seed_load_balancer("spawned", LoadBalancerState::Active, member_tags("dynamic"))
            .await;

        let inventory = FleetInventory::new(cloud, group_tag());
        let members = inventory.list(FleetFilter::ByDynamicOrigin).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "spawned");
    }

    #[tokio::test]
    async fn empty_account_lists_empty_fleet() {
        let cloud = Arc::new(InMemoryCloud::new());
        let inventory = FleetInventory::new(cloud, group_tag());
        assert!(inventory.list(FleetFilter::ByGroupTag).await.unwrap().is_empty());
        assert!(inventory.list(FleetFilter::ByDynamicOrigin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_filter_name_is_rejected() {
        let cloud = Arc::new(InMemoryCloud::new());
        let inventory = FleetInventory::new(cloud, group_tag());
        let err = inventory.list_named("everything").await.unwrap_err();
        assert!(matches!(err, FleetError::InvalidFilter(_)));
    }
}
