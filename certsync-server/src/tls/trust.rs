//! Client-authentication trust bundles
//!
//! A secret's `ca.crt` is the trust anchor used to validate client
//! certificates. It is either written to its own `ca-<name>.pem` file or
//! appended to the serving certificate's file when the same secret also
//! terminates TLS.

use super::certificate::CertificateRecord;
use super::persister::{DiskPersister, checksum};
use super::CertError;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509, X509StoreContext};

/// Configures client-auth CA files through a [`DiskPersister`]
#[derive(Debug, Clone, Copy)]
pub struct TrustBundleConfigurer<'a> {
    persister: &'a DiskPersister,
}

impl<'a> TrustBundleConfigurer<'a> {
    pub fn new(persister: &'a DiskPersister) -> Self {
        Self { persister }
    }

    /// Write `ca` to `ca-<name>.pem` and point the record at it
    pub fn configure_ca_only(
        &self,
        name: &str,
        ca: &[u8],
        record: &mut CertificateRecord,
    ) -> Result<(), CertError> {
        let path = self.persister.ca_file_path(name);
        self.persister.write_file(&path, &[ca])?;

        record.checksum = Some(checksum(&path)?);
        record.stored_file_path = Some(path.clone());
        record.ca_file_path = Some(path.clone());

        tracing::debug!(path = %path.display(), "Created CA certificate for authentication");
        Ok(())
    }

    /// Append `ca` to the record's stored certificate and key file after
    /// checking that the serving certificate chains up to it
    pub fn configure_ca_with_serving_cert(
        &self,
        ca: &[u8],
        record: &mut CertificateRecord,
    ) -> Result<(), CertError> {
        verify_against_root(record.certificate.x509(), ca)?;

        let path = record.stored_file_path.clone().ok_or(CertError::NotOnDisk)?;
        let cert_and_key = std::fs::read(&path).map_err(|e| CertError::io(&path, e))?;
        self.persister.write_file(&path, &[cert_and_key.as_slice(), b"\n".as_slice(), ca])?;

        record.ca_file_path = Some(path.clone());
        record.checksum = Some(checksum(&path)?);
        Ok(())
    }
}

/// Verify `cert` using the certificates in `ca_pem` as the only trust roots.
///
/// Any certificate in the bundle is an anchor, self-signed or not.
pub fn verify_against_root(cert: &X509, ca_pem: &[u8]) -> Result<(), CertError> {
    let roots = X509::stack_from_pem(ca_pem)
        .map_err(|e| CertError::ChainVerificationFailed(format!("invalid CA bundle: {}", e)))?;
    if roots.is_empty() {
        return Err(CertError::ChainVerificationFailed(
            "CA bundle contains no certificates".to_string(),
        ));
    }

    let mut store = X509StoreBuilder::new()?;
    store.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;
    for root in roots {
        store.add_cert(root)?;
    }
    let store = store.build();

    let intermediates: Stack<X509> = Stack::new()?;
    let mut ctx = X509StoreContext::new()?;
    let (verified, result) = ctx.init(&store, cert, &intermediates, |c| {
        let verified = c.verify_cert()?;
        Ok((verified, c.error()))
    })?;

    if !verified {
        return Err(CertError::ChainVerificationFailed(
            result.error_string().to_string(),
        ));
    }
    Ok(())
}
