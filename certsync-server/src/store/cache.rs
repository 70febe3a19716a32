//! In-memory certificate records keyed by secret

use crate::tls::CertificateRecord;
use certsync_core::{HostCertificate, SecretKey, is_valid_hostname};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Latest successfully built record per secret.
///
/// Written only by the synchronizer; records are never evicted.
#[derive(Debug, Default)]
pub struct LocalCertificateCache {
    records: RwLock<HashMap<SecretKey, CertificateRecord>>,
}

impl LocalCertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for a secret
    pub fn get(&self, key: &SecretKey) -> Option<CertificateRecord> {
        self.records.read().get(key).cloned()
    }

    /// Insert or replace the record for a secret
    pub(crate) fn insert(&self, key: SecretKey, record: CertificateRecord) {
        self.records.write().insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All secret keys, sorted
    pub fn keys(&self) -> Vec<SecretKey> {
        let mut keys: Vec<SecretKey> = self.records.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keypair record whose names cover `hostname`, preferring the record
    /// of the lowest secret key when several match
    pub fn find_for_host(&self, hostname: &str) -> Option<CertificateRecord> {
        let records = self.records.read();
        records
            .iter()
            .filter(|(_, record)| !record.is_ca_only())
            .filter(|(_, record)| is_valid_hostname(hostname, &record.common_names))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, record)| record.clone())
    }

    /// Push payload for every keypair record, sorted by hostname
    pub fn host_certificates(&self) -> Vec<HostCertificate> {
        let records = self.records.read();
        let mut keys: Vec<&SecretKey> = records.keys().collect();
        keys.sort();

        let mut certs: Vec<HostCertificate> = keys
            .into_iter()
            .flat_map(|key| records[key].host_certificates())
            .collect();
        // stable: for duplicate hostnames the lowest secret key wins
        certs.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        certs.dedup_by(|a, b| a.hostname == b.hostname);
        certs
    }
}
