//! Builds validated certificate records from raw secret material

use super::certificate::{
    CERTIFICATE_PEM_LABEL, CertificateRecord, ParsedCertificate, decode_first_pem_block, not_after,
};
use super::chain::ChainResolver;
use super::san::{SUBJECT_ALT_NAME_OID, parse_san_extension};
use super::CertError;
use openssl::pkey::PKey;
use openssl::x509::X509;
use std::collections::BTreeSet;
use std::sync::Arc;
use x509_parser::certificate::X509Certificate;

/// Parses certificate, key and CA bytes into [`CertificateRecord`]s
#[derive(Clone, Default)]
pub struct CertificateBuilder {
    chain_resolver: Option<Arc<dyn ChainResolver>>,
}

impl CertificateBuilder {
    /// Builder without chain completion
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder that completes missing intermediates before validating
    pub fn with_chain_resolver(chain_resolver: Arc<dyn ChainResolver>) -> Self {
        Self {
            chain_resolver: Some(chain_resolver),
        }
    }

    /// Validate a certificate and key pair.
    ///
    /// Chain completion failures are logged and the original certificate
    /// bytes are used.
    pub async fn build_keypair_certificate(
        &self,
        cert: &[u8],
        key: &[u8],
    ) -> Result<CertificateRecord, CertError> {
        let mut chain = cert.to_vec();

        if let Some(resolver) = &self.chain_resolver {
            match resolver.complete_chain(cert).await {
                Ok(Some(completed)) => {
                    tracing::debug!("Completed certificate chain with fetched intermediates");
                    chain = completed;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Error generating certificate chain for secret: {}", e);
                }
            }
        }

        keypair_certificate(&chain, cert, key)
    }

    /// Validate a CA certificate used only as a trust anchor
    pub fn build_ca_only_certificate(&self, ca: &[u8]) -> Result<CertificateRecord, CertError> {
        let der = decode_first_pem_block(ca, CERTIFICATE_PEM_LABEL)?;
        let certificate = ParsedCertificate::from_der(&der)?;
        let expire_time = not_after(&certificate.parsed()?);

        Ok(CertificateRecord::new(certificate, expire_time))
    }
}

/// Build a keypair record from an already completed `chain`. `cert` is the
/// certificate as supplied, used for the key check.
pub(crate) fn keypair_certificate(
    chain: &[u8],
    cert: &[u8],
    key: &[u8],
) -> Result<CertificateRecord, CertError> {
    let mut bundle = Vec::with_capacity(chain.len() + key.len() + 1);
    bundle.extend_from_slice(chain);
    bundle.push(b'\n');
    bundle.extend_from_slice(key);

    let der = decode_first_pem_block(&bundle, CERTIFICATE_PEM_LABEL)?;
    let certificate = ParsedCertificate::from_der(&der)?;

    verify_key_matches(cert, key)?;

    let parsed = certificate.parsed()?;
    let common_names = common_names(&parsed)?;
    let expire_time = not_after(&parsed);
    drop(parsed);

    let mut record = CertificateRecord::new(certificate, expire_time);
    record.common_names = common_names;
    record.pem_bundle = bundle;
    Ok(record)
}

/// Check that the private key in `key_pem` belongs to the leading
/// certificate of `cert_pem`
pub fn verify_key_matches(cert_pem: &[u8], key_pem: &[u8]) -> Result<(), CertError> {
    let cert = X509::from_pem(cert_pem).map_err(|e| CertError::CertKeyMismatch(e.to_string()))?;
    let key =
        PKey::private_key_from_pem(key_pem).map_err(|e| CertError::CertKeyMismatch(e.to_string()))?;
    let public = cert
        .public_key()
        .map_err(|e| CertError::CertKeyMismatch(e.to_string()))?;

    if !public.public_eq(&key) {
        return Err(CertError::CertKeyMismatch(
            "private key does not match certificate public key".to_string(),
        ));
    }
    Ok(())
}

/// Subject CN plus every SAN DNS name and email, sorted and deduplicated.
///
/// The subject CN is always included, as an empty string when missing.
fn common_names(cert: &X509Certificate<'_>) -> Result<Vec<String>, CertError> {
    let mut names = BTreeSet::new();

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default();
    names.insert(cn.to_string());

    for ext in cert.extensions() {
        if ext.oid.to_id_string() != SUBJECT_ALT_NAME_OID {
            continue;
        }
        let san = parse_san_extension(ext.value)?;
        names.extend(san.dns_names);
        names.extend(san.email_addresses);
    }

    Ok(names.into_iter().collect())
}
