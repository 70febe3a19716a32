use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, persisting or syncing certificates
#[derive(Debug, Error)]
pub enum CertError {
    #[error("malformed secret: {0}")]
    MalformedSecret(String),

    #[error("no valid PEM formatted block found")]
    InvalidPem,

    #[error("unexpected PEM block type {found:?}, expected {expected:?}")]
    WrongPemType {
        expected: &'static str,
        found: String,
    },

    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("certificate and private key do not have a matching public key: {0}")]
    CertKeyMismatch(String),

    #[error("malformed subject alternative name extension: {0}")]
    MalformedSan(String),

    #[error("failed to verify certificate chain: {0}")]
    ChainVerificationFailed(String),

    #[error("failed to fetch certificate chain: {0}")]
    ChainFetch(String),

    #[error("secret is used for authentication")]
    SecretIsAuthOnly,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("certificate has not been written to disk")]
    NotOnDisk,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CertError::Io {
            path: path.into(),
            source,
        }
    }

    /// Secrets used for basic auth are expected and must not be reported as
    /// failures.
    pub fn is_auth_only(&self) -> bool {
        matches!(self, CertError::SecretIsAuthOnly)
    }
}

impl From<openssl::error::ErrorStack> for CertError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        CertError::Parse(e.to_string())
    }
}

/// Errors raised by the hot-reloadable listener certificate
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The certificate could not be loaded at startup. Fatal.
    #[error("failed to load listener certificate: {0}")]
    InitialLoad(#[source] CertError),

    #[error("failed to watch listener certificate files: {0}")]
    Watch(#[from] notify::Error),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}
