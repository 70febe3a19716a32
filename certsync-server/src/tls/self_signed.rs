//! Self-signed default certificate
//!
//! Served for hosts without a configured certificate so the listener can
//! always complete a handshake.

use super::builder::keypair_certificate;
use super::certificate::CertificateRecord;
use super::persister::DiskPersister;
use super::CertError;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SanType,
};
use time::{Duration, OffsetDateTime};

/// File stem the default certificate is stored under
pub const DEFAULT_CERTIFICATE_NAME: &str = "default-fake-certificate";
/// Hostname covered by the default certificate
pub const DEFAULT_CERTIFICATE_HOST: &str = "ingress.local";

const COMMON_NAME: &str = "Ingress Controller Fake Certificate";
const ORGANIZATION: &str = "Acme Co";
const VALIDITY_DAYS: i64 = 365;

/// Generated certificate and key, PEM encoded
#[derive(Debug, Clone)]
pub struct SelfSignedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generate a self-signed serving certificate for `host`
pub fn generate_self_signed(host: &str) -> Result<SelfSignedCert, CertError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, COMMON_NAME);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = dn;

    let dns_name = host
        .try_into()
        .map_err(|e| CertError::Parse(format!("Invalid DNS name '{}': {}", host, e)))?;
    params.subject_alt_names = vec![SanType::DnsName(dns_name)];
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);

    let key_pair = KeyPair::generate()
        .map_err(|e| CertError::Parse(format!("Failed to generate key pair: {}", e)))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Parse(format!("Failed to generate certificate: {}", e)))?;

    Ok(SelfSignedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

/// Generate the default certificate and store it as
/// `default-fake-certificate.pem`
pub fn default_certificate(persister: &DiskPersister) -> Result<CertificateRecord, CertError> {
    let generated = generate_self_signed(DEFAULT_CERTIFICATE_HOST)?;
    let cert = generated.cert_pem.as_bytes();
    let key = generated.key_pem.as_bytes();

    let mut record = keypair_certificate(cert, cert, key)?;
    persister.store_on_disk(DEFAULT_CERTIFICATE_NAME, &mut record)?;

    if let Some(path) = &record.stored_file_path {
        tracing::info!(
            path = %path.display(),
            host = DEFAULT_CERTIFICATE_HOST,
            "Generated default certificate"
        );
    }

    Ok(record)
}
