//! Certificate records kept in the local store

use super::CertError;
use certsync_core::{Checksum, HostCertificate};
use openssl::x509::X509;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// Decoded X.509 certificate.
///
/// Two certificates are equal when their DER encodings are equal.
#[derive(Clone)]
pub struct ParsedCertificate {
    der: Vec<u8>,
    x509: X509,
    subject: String,
}

impl ParsedCertificate {
    /// Parse a DER encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self, CertError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| CertError::Parse(e.to_string()))?;
        let subject = cert.subject().to_string();
        let x509 = X509::from_der(der)?;

        Ok(Self {
            der: der.to_vec(),
            x509,
            subject,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Borrow the certificate through x509-parser
    pub fn parsed(&self) -> Result<X509Certificate<'_>, CertError> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| CertError::Parse(e.to_string()))
    }
}

impl PartialEq for ParsedCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for ParsedCertificate {}

impl fmt::Debug for ParsedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedCertificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// A validated certificate derived from a secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Leading certificate of the bundle
    pub certificate: ParsedCertificate,
    /// Subject CN and SAN names, sorted ascending and deduplicated.
    /// Empty for CA-only records.
    pub common_names: Vec<String>,
    /// notAfter of the certificate
    pub expire_time: SystemTime,
    /// PEM certificate chain, newline, PEM key. Empty for CA-only records.
    pub pem_bundle: Vec<u8>,
    /// File holding `pem_bundle` (and the CA when one is configured)
    pub stored_file_path: Option<PathBuf>,
    /// File holding the client-auth CA
    pub ca_file_path: Option<PathBuf>,
    /// Checksum of `stored_file_path` as of the last write
    pub checksum: Option<Checksum>,
    pub namespace: String,
    pub name: String,
}

impl CertificateRecord {
    pub(crate) fn new(certificate: ParsedCertificate, expire_time: SystemTime) -> Self {
        Self {
            certificate,
            common_names: Vec::new(),
            expire_time,
            pem_bundle: Vec::new(),
            stored_file_path: None,
            ca_file_path: None,
            checksum: None,
            namespace: String::new(),
            name: String::new(),
        }
    }

    pub fn is_ca_only(&self) -> bool {
        self.common_names.is_empty()
    }

    pub fn is_stored_on_disk(&self) -> bool {
        self.stored_file_path.is_some()
    }

    pub fn has_ca(&self) -> bool {
        self.ca_file_path.is_some()
    }

    /// Check if certificate is expired
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expire_time
    }

    /// Days until expiry
    pub fn days_until_expiry(&self) -> i64 {
        match self.expire_time.duration_since(SystemTime::now()) {
            Ok(duration) => (duration.as_secs() / 86400) as i64,
            Err(e) => -(e.duration().as_secs() as i64 / 86400),
        }
    }

    /// Payload entries for the dynamic certificate endpoint, one per name
    pub fn host_certificates(&self) -> Vec<HostCertificate> {
        if self.pem_bundle.is_empty() {
            return Vec::new();
        }
        let pem = String::from_utf8_lossy(&self.pem_bundle).into_owned();
        self.common_names
            .iter()
            .filter(|cn| !cn.is_empty())
            .map(|cn| HostCertificate {
                hostname: cn.clone(),
                pem_cert_key: pem.clone(),
            })
            .collect()
    }
}

/// Decode the first PEM block of `data` and require it to carry `expected`
/// as its type label. Returns the block contents.
pub fn decode_first_pem_block(data: &[u8], expected: &'static str) -> Result<Vec<u8>, CertError> {
    let pem = match Pem::iter_from_buffer(data).next() {
        Some(Ok(pem)) => pem,
        Some(Err(_)) | None => return Err(CertError::InvalidPem),
    };

    if pem.label != expected {
        return Err(CertError::WrongPemType {
            expected,
            found: pem.label,
        });
    }

    Ok(pem.contents)
}

/// Convert the certificate's notAfter to a `SystemTime`
pub fn not_after(cert: &X509Certificate<'_>) -> SystemTime {
    let timestamp = cert.validity().not_after.timestamp();
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}
