//! Error taxonomy shared by all provider implementations.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Classified provider failures. Callers branch on the variant; the
/// payload is for humans reading logs and notifications.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),
    /// The resource is still referenced and cannot be deleted yet.
    /// Teardown retries this variant; everything else propagates.
    #[error("resource in use: {0}")]
    ResourceInUse(String),
    #[error("conflicting change: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_in_use(&self) -> bool {
        matches!(self, ProviderError::ResourceInUse(_))
    }
}
