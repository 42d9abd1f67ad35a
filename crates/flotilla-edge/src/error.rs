use flotilla_core::Arn;
use flotilla_provider::ProviderError;
use thiserror::Error;

pub type EdgeResult<T> = Result<T, EdgeError>;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Verification after the grace period still found the member in
    /// the association list.
    #[error("{arn} is still associated with edge protection")]
    StillAssociated { arn: Arn },
}
