//! Secret source consumed by the synchronizer

use crate::tls::CertError;
use certsync_core::{Secret, SecretKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

/// Looks up secrets by key
pub trait SecretLister: Send + Sync {
    fn by_key(&self, key: &SecretKey) -> Result<Secret, CertError>;
}

/// Secrets held in memory, fed by tests or by manifest files
#[derive(Debug, Default)]
pub struct InMemorySecretLister {
    secrets: RwLock<HashMap<SecretKey, Secret>>,
}

impl InMemorySecretLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a secret
    pub fn insert(&self, secret: Secret) {
        self.secrets.write().insert(secret.key(), secret);
    }

    pub fn remove(&self, key: &SecretKey) -> Option<Secret> {
        self.secrets.write().remove(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<SecretKey> {
        let mut keys: Vec<SecretKey> = self.secrets.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Load every `*.json` secret manifest in `dir`
    pub fn load_dir(&self, dir: &Path) -> Result<usize, CertError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CertError::io(dir, e))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry.map_err(|e| CertError::io(dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let raw = std::fs::read(&path).map_err(|e| CertError::io(&path, e))?;
            let secret: Secret = serde_json::from_slice(&raw).map_err(|e| {
                CertError::MalformedSecret(format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!(secret = %secret.key(), path = %path.display(), "Loaded secret manifest");
            self.insert(secret);
            loaded += 1;
        }
        Ok(loaded)
    }
}

impl SecretLister for InMemorySecretLister {
    fn by_key(&self, key: &SecretKey) -> Result<Secret, CertError> {
        self.secrets
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CertError::NotFound(format!("secret {}", key)))
    }
}
