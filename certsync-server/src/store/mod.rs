//! Local certificate store
//!
//! Turns secrets into certificate records, persists them and keeps the
//! in-memory cache the serving layer reads from.

mod cache;
mod secrets;
mod sync;

pub use cache::LocalCertificateCache;
pub use secrets::{InMemorySecretLister, SecretLister};
pub use sync::CertificateSynchronizer;

/// Signal sent downstream after the store changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ConfigurationChanged,
}

/// Result of a successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No record existed for the secret
    Added,
    /// The record differed from the cached one and was replaced
    Updated,
    /// The rebuilt record equals the cached one
    Unchanged,
}
