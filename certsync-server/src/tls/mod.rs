//! TLS/Certificate management
//!
//! Handles:
//! - Building validated certificate records from secret material
//! - Intermediate chain completion through AIA caIssuers
//! - Deterministic, checksum-tracked certificate files
//! - Client-auth trust bundles
//! - The self-signed default certificate
//! - The hot-reloadable listener certificate

mod builder;
mod certificate;
mod chain;
mod error;
mod listener;
mod persister;
mod san;
mod self_signed;
mod trust;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{CertificateBuilder, verify_key_matches};
pub use certificate::{CERTIFICATE_PEM_LABEL, CertificateRecord, ParsedCertificate};
pub use chain::{
    AiaChainResolver, ChainResolver, HttpIssuerFetcher, IssuerFetcher, MAX_CHAIN_DEPTH,
    install_crypto_provider,
};
pub use error::{CertError, ListenerError};
pub use listener::{ReloadableCertificateProvider, WatcherHandle};
pub use persister::{AUXILIARY_PARAMETER_PEM_LABEL, DiskPersister, checksum};
pub use san::{SubjectAltNames, parse_san_extension};
pub use self_signed::{
    DEFAULT_CERTIFICATE_HOST, DEFAULT_CERTIFICATE_NAME, SelfSignedCert, default_certificate,
    generate_self_signed,
};
pub use trust::{TrustBundleConfigurer, verify_against_root};
