#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use certsync_core::{CA_CERT_KEY, Secret, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};
use certsync_server::config::SyncConfig;
use certsync_server::store::{CertificateSynchronizer, InMemorySecretLister, StoreEvent};
use certsync_server::tls::CertificateBuilder;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const NAMESPACE: &str = "default";

pub struct KeypairFixture {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: Vec<u8>,
}

pub struct CaFixture {
    pub cert_pem: String,
    pub issuer: Issuer<'static, KeyPair>,
}

fn params(cn: &str, sans: &[&str]) -> CertificateParams {
    let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(sans).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params
}

pub fn self_signed(cn: &str, sans: &[&str]) -> KeypairFixture {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, sans).self_signed(&key).unwrap();
    KeypairFixture {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
    }
}

pub fn root_ca(cn: &str) -> CaFixture {
    let key = KeyPair::generate().unwrap();
    let mut params = params(cn, &[]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
    let cert = params.self_signed(&key).unwrap();
    CaFixture {
        cert_pem: cert.pem(),
        issuer: Issuer::new(params, key),
    }
}

pub fn leaf(ca: &CaFixture, cn: &str, sans: &[&str]) -> KeypairFixture {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, sans).signed_by(&key, &ca.issuer).unwrap();
    KeypairFixture {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
    }
}

pub fn keypair_secret(name: &str, fixture: &KeypairFixture) -> Secret {
    Secret::new(NAMESPACE, name)
        .with_data(TLS_CERT_KEY, fixture.cert_pem.clone())
        .with_data(TLS_PRIVATE_KEY_KEY, fixture.key_pem.clone())
}

pub fn ca_secret(name: &str, ca: &CaFixture) -> Secret {
    Secret::new(NAMESPACE, name).with_data(CA_CERT_KEY, ca.cert_pem.clone())
}

/// Synchronizer over an in-memory secret source and a temporary
/// certificate directory
pub struct Harness {
    pub temp: TempDir,
    pub secrets: Arc<InMemorySecretLister>,
    pub sync: Arc<CertificateSynchronizer>,
    pub events: mpsc::Receiver<StoreEvent>,
}

impl Harness {
    pub fn new(enable_dynamic_certificates: bool) -> Self {
        Self::with_builder(enable_dynamic_certificates, CertificateBuilder::new())
    }

    pub fn with_builder(enable_dynamic_certificates: bool, builder: CertificateBuilder) -> Self {
        let temp = TempDir::new().unwrap();
        let secrets = Arc::new(InMemorySecretLister::new());
        let (tx, events) = mpsc::channel(64);
        let config = SyncConfig {
            cert_dir: temp.path().join("ssl"),
            enable_dynamic_certificates,
            enable_chain_completion: false,
        };
        let sync = CertificateSynchronizer::new(config, secrets.clone(), tx)
            .unwrap()
            .with_builder(builder);
        let sync = Arc::new(sync);
        Self {
            temp,
            secrets,
            sync,
            events,
        }
    }

    pub fn cert_dir(&self) -> PathBuf {
        self.temp.path().join("ssl")
    }

    /// Files in the certificate directory, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.cert_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Drain pending notifications
    pub fn drain_events(&mut self) -> usize {
        let mut count = 0;
        while self.events.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}
