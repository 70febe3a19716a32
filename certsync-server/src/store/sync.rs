//! Keeps local certificate records in step with their secrets

use super::cache::LocalCertificateCache;
use super::secrets::SecretLister;
use super::{StoreEvent, SyncOutcome};
use crate::config::SyncConfig;
use crate::tls::{
    AiaChainResolver, CertError, CertificateBuilder, CertificateRecord, DiskPersister,
    TrustBundleConfigurer, verify_against_root,
};
use certsync_core::{HostCertificate, SecretKey, SecretShape};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Builds, persists and caches certificate records for secrets.
///
/// Every sync holds one store-wide lock from the secret fetch to the change
/// notification, so at most one sync is in flight.
pub struct CertificateSynchronizer {
    config: SyncConfig,
    builder: CertificateBuilder,
    persister: DiskPersister,
    cache: LocalCertificateCache,
    secrets: Arc<dyn SecretLister>,
    events: mpsc::Sender<StoreEvent>,
    lock: Mutex<()>,
}

impl CertificateSynchronizer {
    /// Create the synchronizer and its certificate directory
    pub fn new(
        config: SyncConfig,
        secrets: Arc<dyn SecretLister>,
        events: mpsc::Sender<StoreEvent>,
    ) -> Result<Self, CertError> {
        let builder = if config.enable_chain_completion {
            CertificateBuilder::with_chain_resolver(Arc::new(AiaChainResolver::http()?))
        } else {
            CertificateBuilder::new()
        };

        let persister = DiskPersister::new(&config.cert_dir);
        persister.init()?;

        Ok(Self {
            config,
            builder,
            persister,
            cache: LocalCertificateCache::new(),
            secrets,
            events,
            lock: Mutex::new(()),
        })
    }

    /// Replace the certificate builder
    pub fn with_builder(mut self, builder: CertificateBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn persister(&self) -> &DiskPersister {
        &self.persister
    }

    pub fn cache(&self) -> &LocalCertificateCache {
        &self.cache
    }

    /// Rebuild the record for `key` from its secret and store it.
    ///
    /// The cache is only written, and a notification only sent, when the
    /// new record differs from the cached one. On failure the cache is left
    /// untouched.
    pub async fn sync(&self, key: &SecretKey) -> Result<SyncOutcome, CertError> {
        let _guard = self.lock.lock().await;

        let secret = self.secrets.by_key(key)?;
        let name = key.to_string();

        let mut record = match secret.shape() {
            SecretShape::Keypair { cert, key: pkey, ca } => {
                let mut record = self.builder.build_keypair_certificate(cert, pkey).await?;

                // a rejected CA must not touch the stored file
                if let Some(ca) = ca {
                    verify_against_root(record.certificate.x509(), ca)?;
                }

                if !self.config.enable_dynamic_certificates || ca.is_some() {
                    self.persister.store_on_disk(&name, &mut record)?;
                }

                if let Some(ca) = ca {
                    TrustBundleConfigurer::new(&self.persister)
                        .configure_ca_with_serving_cert(ca, &mut record)?;
                    tracing::debug!(secret = %key, "Configured client certificate authentication");
                }
                record
            }
            SecretShape::CaOnly { ca } => {
                let mut record = self.builder.build_ca_only_certificate(ca)?;
                TrustBundleConfigurer::new(&self.persister).configure_ca_only(
                    &name,
                    ca,
                    &mut record,
                )?;
                record
            }
            SecretShape::AuthOnly => return Err(CertError::SecretIsAuthOnly),
            SecretShape::Malformed(reason) => {
                return Err(CertError::MalformedSecret(format!("{}: {}", key, reason)));
            }
        };

        record.namespace = key.namespace.clone();
        record.name = key.name.clone();

        let outcome = match self.cache.get(key) {
            Some(existing) if existing == record => return Ok(SyncOutcome::Unchanged),
            Some(_) => SyncOutcome::Updated,
            None => SyncOutcome::Added,
        };

        self.cache.insert(key.clone(), record);
        self.notify().await;
        Ok(outcome)
    }

    /// Sync `key` in response to a change of its secret and log the result.
    ///
    /// Authentication-only secrets are expected and not reported.
    pub async fn handle_secret_change(&self, key: &SecretKey) -> Result<SyncOutcome, CertError> {
        let result = self.sync(key).await;
        match &result {
            Ok(SyncOutcome::Added) => tracing::info!(secret = %key, "Adding secret to local store"),
            Ok(SyncOutcome::Updated) => {
                tracing::info!(secret = %key, "Updating secret in local store")
            }
            Ok(SyncOutcome::Unchanged) => {
                tracing::debug!(secret = %key, "Secret unchanged, skipping update")
            }
            Err(e) if e.is_auth_only() => {}
            Err(e) => tracing::warn!(secret = %key, error = %e, "Error obtaining X.509 certificate"),
        }
        result
    }

    /// Record for a secret
    pub fn lookup(&self, key: &SecretKey) -> Result<CertificateRecord, CertError> {
        self.cache
            .get(key)
            .ok_or_else(|| CertError::NotFound(format!("local SSL certificate {}", key)))
    }

    /// Keypair record serving `hostname`
    pub fn find_for_host(&self, hostname: &str) -> Option<CertificateRecord> {
        self.cache.find_for_host(hostname)
    }

    /// Hostname and PEM pairs for dynamic certificate delivery
    pub fn host_certificates(&self) -> Vec<HostCertificate> {
        self.cache.host_certificates()
    }

    async fn notify(&self) {
        if self.events.send(StoreEvent::ConfigurationChanged).await.is_err() {
            tracing::warn!("Store event receiver closed, dropping configuration change");
        }
    }
}
