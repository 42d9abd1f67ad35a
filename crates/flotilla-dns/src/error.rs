use flotilla_core::WaitError;
use flotilla_provider::ProviderError;
use thiserror::Error;

pub type DnsResult<T> = Result<T, DnsError>;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A submitted change never reached INSYNC within the budget.
    #[error("timed out waiting for {condition} after {attempts} attempts")]
    ChangeTimedOut { condition: String, attempts: u32 },

    #[error("no record aliases a member matching {dns_prefix:?}")]
    MemberNotRegistered { dns_prefix: String },
}

impl From<WaitError<ProviderError>> for DnsError {
    fn from(err: WaitError<ProviderError>) -> Self {
        match err {
            WaitError::Probe(e) => DnsError::Provider(e),
            WaitError::TimedOut { condition, attempts } => {
                DnsError::ChangeTimedOut { condition, attempts }
            }
        }
    }
}
