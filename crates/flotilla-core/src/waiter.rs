//! Bounded polling for slow provider transitions.
//!
//! Provisioning a balancer, propagating a record change, and draining a
//! target group all finish asynchronously on the provider side. Callers
//! wrap the readiness probe in [`wait_until`] with an explicit attempt
//! budget so a stuck transition surfaces as a typed timeout instead of
//! hanging a workflow stage forever.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Attempt budget for one wait: how many probes, how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    pub attempts: u32,
    pub delay: Duration,
}

impl WaitBudget {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The probe itself failed; the wait stops immediately.
    #[error(transparent)]
    Probe(E),
    #[error("timed out waiting for {condition} after {attempts} attempts")]
    TimedOut { condition: String, attempts: u32 },
}

/// Poll `probe` until it reports true or the budget runs out. The delay
/// is applied between attempts, not after the last one.
pub async fn wait_until<F, Fut, E>(
    condition: &str,
    budget: WaitBudget,
    mut probe: F,
) -> Result<(), WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + 'static,
{
    for attempt in 1..=budget.attempts {
        if probe().await.map_err(WaitError::Probe)? {
            debug!(condition, attempt, "condition satisfied");
            return Ok(());
        }
        if attempt < budget.attempts {
            tokio::time::sleep(budget.delay).await;
        }
    }
    Err(WaitError::TimedOut {
        condition: condition.to_string(),
        attempts: budget.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    #[error("probe broke")]
    struct ProbeBroke;

    #[tokio::test]
    async fn succeeds_once_condition_holds() {
        let polls = AtomicU32::new(0);
        let result = wait_until::<_, _, ProbeBroke>(
            "test condition",
            WaitBudget::new(5, Duration::from_millis(1)),
            || {
                let polls = &polls;
                async move { Ok(polls.fetch_add(1, Ordering::SeqCst) + 1 >= 3) }
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_the_budget_is_a_typed_timeout() {
        let result = wait_until::<_, _, ProbeBroke>(
            "never ready",
            WaitBudget::new(3, Duration::from_millis(1)),
            || async move { Ok(false) },
        )
        .await;
        match result {
            Err(WaitError::TimedOut { condition, attempts }) => {
                assert_eq!(condition, "never ready");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_failure_stops_the_wait() {
        let polls = AtomicU32::new(0);
        let result = wait_until(
            "broken probe",
            WaitBudget::new(10, Duration::from_millis(1)),
            || {
                let polls = &polls;
                async move {
                    polls.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>(ProbeBroke)
                }
            },
        )
        .await;
        assert!(matches!(result, Err(WaitError::Probe(_))));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}
