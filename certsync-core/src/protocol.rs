//! Dynamic certificate push protocol
//!
//! When dynamic certificate delivery is enabled, serving certificates are
//! not written to disk. Instead the proxy's configuration endpoint receives
//! `{hostname, pemCertKey}` pairs and serves them during TLS handshakes.
//!
//! The endpoint itself is external; these types describe its contract.

use serde::{Deserialize, Serialize};

/// Certificates, keyed by hostname (POST list, GET `?hostname=`)
pub const CERTIFICATES_PATH: &str = "/configuration/certs";

/// PEM certificate chain and key served for one hostname
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostCertificate {
    pub hostname: String,
    #[serde(rename = "pemCertKey")]
    pub pem_cert_key: String,
}

/// Path used to fetch the stored certificate for `hostname`
pub fn certificate_lookup_path(hostname: &str) -> String {
    format!("{}?hostname={}", CERTIFICATES_PATH, hostname)
}

/// Serialize the body of a certificates POST
pub fn encode_certificates(certs: &[HostCertificate]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(certs)
}
