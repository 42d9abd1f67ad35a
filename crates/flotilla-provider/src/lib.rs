//! flotilla-provider: the seams between the control plane and the cloud.
//!
//! Every component takes these traits by injection, so the whole plane
//! runs unchanged against the in-memory cloud in tests and in the
//! standalone simulator. A real provider integration implements the same
//! traits against its SDK.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use memory::{InMemoryCloud, InMemorySuspendSwitch, LogNotifier, RecordingNotifier};
pub use traits::{
    DnsProvider, EdgeProtectionProvider, LoadBalancerPage, LoadBalancerProvider, Notice,
    Notifier, SuspendSwitch, TaskDiscovery,
};

// Part of the trait surface: `TaskDiscovery` hands these out and
// `LoadBalancerProvider` registers them.
pub use flotilla_core::TargetAddress;
