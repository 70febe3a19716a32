//! Synchronizer configuration

use std::path::PathBuf;

/// Default directory certificate files are written to
pub const DEFAULT_CERT_DIR: &str = "/etc/ingress-controller/ssl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Directory to store certificates
    pub cert_dir: PathBuf,
    /// Keep keypair certificates in memory and deliver them to the serving
    /// layer instead of writing them to disk
    pub enable_dynamic_certificates: bool,
    /// Fetch missing intermediate certificates through AIA
    pub enable_chain_completion: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            enable_dynamic_certificates: true,
            enable_chain_completion: false,
        }
    }
}
