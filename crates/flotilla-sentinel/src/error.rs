use flotilla_dns::DnsError;
use flotilla_edge::EdgeError;
use flotilla_fleet::FleetError;
use thiserror::Error;

pub type SentinelResult<T> = Result<T, SentinelError>;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("fleet inventory failed: {0}")]
    Fleet(#[from] FleetError),

    #[error("dns record correction failed: {0}")]
    Dns(#[from] DnsError),

    #[error("edge association correction failed: {0}")]
    Edge(#[from] EdgeError),
}
