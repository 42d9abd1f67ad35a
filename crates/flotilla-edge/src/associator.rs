//! Edge protection association operations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use flotilla_core::Arn;
use flotilla_provider::EdgeProtectionProvider;

use crate::error::{EdgeError, EdgeResult};

#[derive(Debug, Clone)]
pub struct EdgeSettings {
    /// How long a disassociation gets to propagate before verification.
    pub disassociation_grace: Duration,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self { disassociation_grace: Duration::from_secs(15) }
    }
}

#[derive(Clone)]
pub struct EdgeProtectionAssociator {
    provider: Arc<dyn EdgeProtectionProvider>,
    settings: EdgeSettings,
}

impl EdgeProtectionAssociator {
    pub fn new(provider: Arc<dyn EdgeProtectionProvider>, settings: EdgeSettings) -> Self {
        Self { provider, settings }
    }

    /// Put the member behind edge protection. Returns the association
    /// list as it stands afterwards.
    pub async fn associate(&self, arn: &Arn) -> EdgeResult<Vec<Arn>> {
        self.provider.associate(arn).await?;
        let associated = self.provider.list_associated().await?;
        info!(%arn, associated = associated.len(), "associated member with edge protection");
        Ok(associated)
    }

    /// Remove the member from edge protection and verify it actually
    /// left. A member that was never associated is a benign no-op.
    /// Waits out the grace interval first, then disassociates and
    /// re-lists immediately: anything still present at that point is
    /// an inconsistent downstream state, not propagation lag. The
    /// disassociate call itself is allowed to fail; verification is
    /// what decides the outcome.
    pub async fn disassociate(&self, arn: &Arn) -> EdgeResult<Vec<Arn>> {
        let associated = self.provider.list_associated().await?;
        if !associated.contains(arn) {
            info!(%arn, "member is not associated, nothing to disassociate");
            return Ok(associated);
        }

        tokio::time::sleep(self.settings.disassociation_grace).await;
        if let Err(e) = self.provider.disassociate(arn).await {
            warn!(%arn, error = %e, "disassociate call failed, verifying anyway");
        }

        let remaining = self.provider.list_associated().await?;
        if remaining.contains(arn) {
            return Err(EdgeError::StillAssociated { arn: arn.clone() });
        }
        info!(%arn, "member disassociated from edge protection");
        Ok(remaining)
    }

    pub async fn list_associated(&self) -> EdgeResult<Vec<Arn>> {
        Ok(self.provider.list_associated().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_provider::{InMemoryCloud, ProviderResult};

    fn fast_settings() -> EdgeSettings {
        EdgeSettings { disassociation_grace: Duration::from_millis(1) }
    }

    fn arn(n: u8) -> Arn {
        format!("arn:sim:loadbalancer/fleet-lb-{n}/000{n}")
    }

    #[tokio::test]
    async fn associate_reports_the_resulting_list() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.seed_association(&arn(1)).await;
        let edge = EdgeProtectionAssociator::new(cloud.clone(), fast_settings());

        let associated = edge.associate(&arn(2)).await.unwrap();
        assert_eq!(associated, vec![arn(1), arn(2)]);
    }

    #[tokio::test]
    async fn disassociating_an_unassociated_member_is_a_noop() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.seed_association(&arn(1)).await;
        let edge = EdgeProtectionAssociator::new(cloud.clone(), fast_settings());
        let before = cloud.mutation_count();

        let remaining = edge.disassociate(&arn(9)).await.unwrap();
        assert_eq!(remaining, vec![arn(1)]);
        // no disassociate call was issued
        assert_eq!(cloud.mutation_count(), before);
    }

    #[tokio::test]
    async fn disassociate_verifies_after_the_grace_period() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.seed_association(&arn(1)).await;
        cloud.seed_association(&arn(2)).await;
        let edge = EdgeProtectionAssociator::new(cloud.clone(), fast_settings());

        let remaining = edge.disassociate(&arn(1)).await.unwrap();
        assert_eq!(remaining, vec![arn(2)]);
    }

    /// Records when each provider call lands, against a paused clock.
    struct TimedEdge {
        associated: tokio::sync::Mutex<Vec<Arn>>,
        calls: tokio::sync::Mutex<Vec<(&'static str, tokio::time::Instant)>>,
    }

    impl TimedEdge {
        fn holding(arn: Arn) -> Self {
            Self {
                associated: tokio::sync::Mutex::new(vec![arn]),
                calls: tokio::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl EdgeProtectionProvider for TimedEdge {
        async fn associate(&self, resource_arn: &Arn) -> ProviderResult<()> {
            self.associated.lock().await.push(resource_arn.clone());
            self.calls.lock().await.push(("associate", tokio::time::Instant::now()));
            Ok(())
        }

        async fn disassociate(&self, resource_arn: &Arn) -> ProviderResult<()> {
            self.associated.lock().await.retain(|a| a != resource_arn);
            self.calls.lock().await.push(("disassociate", tokio::time::Instant::now()));
            Ok(())
        }

        async fn list_associated(&self) -> ProviderResult<Vec<Arn>> {
            self.calls.lock().await.push(("list", tokio::time::Instant::now()));
            Ok(self.associated.lock().await.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn grace_interval_elapses_before_the_disassociate_call() {
        let grace = Duration::from_secs(15);
        let provider = Arc::new(TimedEdge::holding(arn(1)));
        let edge = EdgeProtectionAssociator::new(
            provider.clone(),
            EdgeSettings { disassociation_grace: grace },
        );
        let started = tokio::time::Instant::now();

        edge.disassociate(&arn(1)).await.unwrap();

        let calls = provider.calls.lock().await;
        let names: Vec<&str> = calls.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["list", "disassociate", "list"]);
        // the wait happens up front, and verification follows at once
        assert_eq!(calls[1].1 - started, grace);
        assert_eq!(calls[2].1, calls[1].1);
    }

    #[tokio::test]
    async fn lingering_association_is_a_typed_error() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.seed_association(&arn(1)).await;
        cloud.script_sticky_association(&arn(1)).await;
        let edge = EdgeProtectionAssociator::new(cloud.clone(), fast_settings());

        let err = edge.disassociate(&arn(1)).await.unwrap_err();
        assert!(matches!(err, EdgeError::StillAssociated { .. }));
    }
}
