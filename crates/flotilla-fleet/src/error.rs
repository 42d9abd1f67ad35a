use flotilla_core::{Arn, InvalidFilter, WaitError};
use flotilla_provider::ProviderError;
use thiserror::Error;

pub type FleetResult<T> = Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilter),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("timed out waiting for {condition} after {attempts} attempts")]
    WaitTimedOut { condition: String, attempts: u32 },

    /// Discovery returned nothing to forward to, so a new member would
    /// accept traffic it cannot serve.
    #[error("no backend targets discovered")]
    NoBackendTargets,

    /// Teardown exhausted its retry budget with groups still in use.
    #[error("partial teardown: deleted {deleted:?} of {expected:?}")]
    PartialTeardown { expected: Vec<Arn>, deleted: Vec<Arn> },
}

impl From<WaitError<ProviderError>> for FleetError {
    fn from(err: WaitError<ProviderError>) -> Self {
        match err {
            WaitError::Probe(e) => FleetError::Provider(e),
            WaitError::TimedOut { condition, attempts } => {
                FleetError::WaitTimedOut { condition, attempts }
            }
        }
    }
}
