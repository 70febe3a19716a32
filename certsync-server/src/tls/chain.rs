//! Intermediate certificate chain completion
//!
//! When a secret carries only a leaf certificate, clients that do not cache
//! intermediates fail to build a trust path. The resolver follows the
//! Authority Information Access (caIssuers) pointers of the leaf upward and
//! returns the leaf followed by the fetched intermediates.

use super::CertError;
use async_trait::async_trait;
use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509StoreContext, X509VerifyResult};
use std::time::Duration;

/// Upper bound on issuer hops followed for one certificate
pub const MAX_CHAIN_DEPTH: usize = 10;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Completes a certificate's intermediate chain.
///
/// Returns `Ok(None)` when the certificate already verifies or nothing
/// could be added.
#[async_trait]
pub trait ChainResolver: Send + Sync {
    async fn complete_chain(&self, cert_pem: &[u8]) -> Result<Option<Vec<u8>>, CertError>;
}

/// Fetches the issuer certificate published at an AIA URL
#[async_trait]
pub trait IssuerFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError>;
}

/// Fetches issuers over HTTP
pub struct HttpIssuerFetcher {
    client: reqwest::Client,
}

impl HttpIssuerFetcher {
    pub fn new() -> Result<Self, CertError> {
        install_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| CertError::ChainFetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl IssuerFetcher for HttpIssuerFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CertError::ChainFetch(format!("{}: {}", url, e)))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| CertError::ChainFetch(format!("{}: {}", url, e)))?;
        Ok(body.to_vec())
    }
}

/// Install ring as the process-wide rustls provider unless one is set
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Chain resolver following AIA caIssuers pointers
pub struct AiaChainResolver<F = HttpIssuerFetcher> {
    fetcher: F,
}

impl AiaChainResolver<HttpIssuerFetcher> {
    pub fn http() -> Result<Self, CertError> {
        Ok(Self::new(HttpIssuerFetcher::new()?))
    }
}

impl<F: IssuerFetcher> AiaChainResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl<F: IssuerFetcher> ChainResolver for AiaChainResolver<F> {
    async fn complete_chain(&self, cert_pem: &[u8]) -> Result<Option<Vec<u8>>, CertError> {
        let leaf = X509::from_pem(cert_pem).map_err(|e| CertError::Parse(e.to_string()))?;

        if verifies_with_system_roots(&leaf)? {
            return Ok(None);
        }

        let mut chain = Vec::new();
        let mut current = leaf.clone();
        for _ in 0..MAX_CHAIN_DEPTH {
            if is_self_signed(&current) {
                break;
            }
            let Some(url) = ca_issuers_url(&current) else {
                break;
            };

            tracing::debug!(url = %url, "Fetching issuer certificate");
            let body = self.fetcher.fetch(&url).await?;
            let issuer = parse_issuer(&body)?;
            if is_self_signed(&issuer) {
                break;
            }
            chain.push(issuer.clone());
            current = issuer;
        }

        if chain.is_empty() {
            return Ok(None);
        }

        let mut out = leaf.to_pem()?;
        for cert in &chain {
            out.extend_from_slice(&cert.to_pem()?);
        }
        Ok(Some(out))
    }
}

/// Verify `cert` against the system trust store, using only itself as an
/// available intermediate
fn verifies_with_system_roots(cert: &X509) -> Result<bool, CertError> {
    let mut store = X509StoreBuilder::new()?;
    store.set_default_paths()?;
    let store = store.build();

    let mut intermediates = Stack::new()?;
    intermediates.push(cert.clone())?;

    let mut ctx = X509StoreContext::new()?;
    let verified = ctx.init(&store, cert, &intermediates, |c| c.verify_cert())?;
    Ok(verified)
}

fn is_self_signed(cert: &X509) -> bool {
    cert.issued(cert) == X509VerifyResult::OK
}

fn ca_issuers_url(cert: &X509) -> Option<String> {
    cert.authority_info()?
        .iter()
        .filter(|ad| ad.method().nid() == Nid::AD_CA_ISSUERS)
        .find_map(|ad| ad.location().uri().map(str::to_string))
}

fn parse_issuer(body: &[u8]) -> Result<X509, CertError> {
    X509::from_der(body)
        .or_else(|_| X509::from_pem(body))
        .map_err(|e| CertError::ChainFetch(format!("invalid issuer certificate: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::test_support::{
        CertFixture, generate_ca, generate_intermediate, generate_leaf_with_aia,
    };
    use std::collections::HashMap;

    struct MapFetcher(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl IssuerFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| CertError::ChainFetch(format!("{url}: 404 Not Found")))
        }
    }

    fn pem_count(data: &[u8]) -> usize {
        String::from_utf8_lossy(data)
            .matches("-----BEGIN CERTIFICATE-----")
            .count()
    }

    #[tokio::test]
    async fn test_fetches_missing_intermediate() {
        let root = generate_ca("Test Root CA");
        let intermediate = generate_intermediate(
            &root,
            "Test Intermediate CA",
            Some("http://pki.test/root.crt"),
        );
        let leaf = generate_leaf_with_aia(
            &intermediate,
            "example.com",
            &["example.com"],
            Some("http://pki.test/intermediate.crt"),
        );

        let fetcher = MapFetcher(HashMap::from([
            (
                "http://pki.test/intermediate.crt".to_string(),
                intermediate.der.clone(),
            ),
            ("http://pki.test/root.crt".to_string(), root.der.clone()),
        ]));
        let resolver = AiaChainResolver::new(fetcher);

        let completed = resolver
            .complete_chain(leaf.cert_pem.as_bytes())
            .await
            .unwrap()
            .expect("chain should be completed");

        // root is not included
        assert_eq!(pem_count(&completed), 2);
        let certs = X509::stack_from_pem(&completed).unwrap();
        assert_eq!(certs[0].to_der().unwrap(), leaf.der);
        assert_eq!(certs[1].to_der().unwrap(), intermediate.der);
    }

    #[tokio::test]
    async fn test_accepts_pem_encoded_issuer() {
        let root = generate_ca("Test Root CA");
        let intermediate = generate_intermediate(&root, "Test Intermediate CA", None);
        let leaf = generate_leaf_with_aia(
            &intermediate,
            "example.com",
            &["example.com"],
            Some("http://pki.test/intermediate.pem"),
        );

        let fetcher = MapFetcher(HashMap::from([(
            "http://pki.test/intermediate.pem".to_string(),
            intermediate.cert_pem.clone().into_bytes(),
        )]));
        let completed = AiaChainResolver::new(fetcher)
            .complete_chain(leaf.cert_pem.as_bytes())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pem_count(&completed), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let root = generate_ca("Test Root CA");
        let leaf = generate_leaf_with_aia(
            &root,
            "example.com",
            &["example.com"],
            Some("http://pki.test/missing.crt"),
        );

        let err = AiaChainResolver::new(MapFetcher(HashMap::new()))
            .complete_chain(leaf.cert_pem.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, CertError::ChainFetch(_)));
    }

    #[tokio::test]
    async fn test_self_signed_needs_no_replacement() {
        let cert = CertFixture::self_signed("example.com", &["example.com"]);
        let result = AiaChainResolver::new(MapFetcher(HashMap::new()))
            .complete_chain(cert.cert_pem.as_bytes())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_invalid_issuer_body_is_a_fetch_failure() {
        let root = generate_ca("Test Root CA");
        let leaf = generate_leaf_with_aia(
            &root,
            "example.com",
            &["example.com"],
            Some("http://pki.test/garbage.crt"),
        );
        let fetcher = MapFetcher(HashMap::from([(
            "http://pki.test/garbage.crt".to_string(),
            b"<html>not a cert</html>".to_vec(),
        )]));
        let err = AiaChainResolver::new(fetcher)
            .complete_chain(leaf.cert_pem.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, CertError::ChainFetch(_)));
    }

    #[tokio::test]
    async fn test_builder_falls_back_to_original_bytes_on_fetch_failure() {
        use crate::tls::CertificateBuilder;
        use std::sync::Arc;

        let root = generate_ca("Test Root CA");
        let leaf = generate_leaf_with_aia(
            &root,
            "example.com",
            &["example.com"],
            Some("http://pki.test/unreachable.crt"),
        );
        let builder = CertificateBuilder::with_chain_resolver(Arc::new(AiaChainResolver::new(
            MapFetcher(HashMap::new()),
        )));

        let record = builder
            .build_keypair_certificate(leaf.cert_pem.as_bytes(), leaf.key_pem.as_bytes())
            .await
            .unwrap();
        assert!(record.pem_bundle.starts_with(leaf.cert_pem.as_bytes()));
    }
}
