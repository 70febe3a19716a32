//! Hot-reloadable certificate for the controller's own TLS listener
//!
//! The certificate and key are loaded once at startup and reloaded whenever
//! either file changes. Files are read and parsed outside the lock; only
//! the final swap happens under it. A failed reload clears the keypair so
//! handshakes fail instead of serving stale material.

use super::builder::verify_key_matches;
use super::{CertError, ListenerError};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use parking_lot::Mutex;
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(150);

type LoadResult = Result<Arc<CertifiedKey>, Arc<CertError>>;

struct Shared {
    cert_path: PathBuf,
    key_path: PathBuf,
    current: Mutex<LoadResult>,
}

impl Shared {
    fn reload(&self) -> Result<(), Arc<CertError>> {
        let loaded = load_certified_key(&self.cert_path, &self.key_path)
            .map(Arc::new)
            .map_err(Arc::new);

        let outcome = match &loaded {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone()),
        };
        *self.current.lock() = loaded;

        match &outcome {
            Ok(()) => tracing::info!(
                cert = %self.cert_path.display(),
                "Reloaded listener certificate"
            ),
            Err(e) => tracing::error!(
                cert = %self.cert_path.display(),
                key = %self.key_path.display(),
                error = %e,
                "Failed to reload listener certificate"
            ),
        }
        outcome
    }
}

/// Serving keypair for the listener, swapped in place on file changes
pub struct ReloadableCertificateProvider {
    shared: Arc<Shared>,
}

/// Keeps the file watcher alive
pub struct WatcherHandle {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    _thread: std::thread::JoinHandle<()>,
}

impl ReloadableCertificateProvider {
    /// Load the keypair from `cert_path` and `key_path`.
    ///
    /// Failure is reported as [`ListenerError::InitialLoad`] and should stop
    /// startup.
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Result<Self, ListenerError> {
        let cert_path = cert_path.into();
        let key_path = key_path.into();

        let certified_key =
            load_certified_key(&cert_path, &key_path).map_err(ListenerError::InitialLoad)?;
        tracing::info!(cert = %cert_path.display(), "Loaded listener certificate");

        Ok(Self {
            shared: Arc::new(Shared {
                cert_path,
                key_path,
                current: Mutex::new(Ok(Arc::new(certified_key))),
            }),
        })
    }

    pub fn cert_path(&self) -> &Path {
        &self.shared.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.shared.key_path
    }

    /// Current keypair, or the error of the last reload
    pub fn certificate(&self) -> LoadResult {
        self.shared.current.lock().clone()
    }

    /// Re-read both files and swap the result in
    pub fn reload(&self) -> Result<(), Arc<CertError>> {
        self.shared.reload()
    }

    /// Watch the parent directories of both files and reload on changes.
    ///
    /// Watching the directories rather than the files keeps working when a
    /// file is replaced by rename. Drop the handle to stop watching.
    pub fn watch(&self) -> Result<WatcherHandle, ListenerError> {
        let (tx, rx) = std_mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, tx)?;

        let watched = [
            resolve_watch_path(&self.shared.cert_path)?,
            resolve_watch_path(&self.shared.key_path)?,
        ];

        let mut dirs: Vec<&Path> = watched.iter().filter_map(|p| p.parent()).collect();
        dirs.dedup();
        for dir in dirs {
            debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;
            tracing::debug!(dir = %dir.display(), "Watching listener certificate directory");
        }

        let shared = self.shared.clone();
        let handle = std::thread::spawn(move || {
            for result in rx {
                match result {
                    Ok(events) => {
                        if events.iter().any(|event| watched.contains(&event.path)) {
                            let _ = shared.reload();
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Listener certificate watch error: {:?}", e);
                    }
                }
            }
        });

        Ok(WatcherHandle {
            _debouncer: debouncer,
            _thread: handle,
        })
    }

    /// rustls server configuration resolving certificates through this
    /// provider
    pub fn tls_config(self: Arc<Self>) -> Result<ServerConfig, ListenerError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(self);
        Ok(config)
    }
}

impl ResolvesServerCert for ReloadableCertificateProvider {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.certificate().ok()
    }
}

impl fmt::Debug for ReloadableCertificateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadableCertificateProvider")
            .field("cert_path", &self.shared.cert_path)
            .field("key_path", &self.shared.key_path)
            .field("loaded", &self.shared.current.lock().is_ok())
            .finish()
    }
}

/// Absolute path of `path` with its parent directory canonicalized, so it
/// compares equal to paths reported by the watcher
fn resolve_watch_path(path: &Path) -> Result<PathBuf, ListenerError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        notify::Error::path_not_found().add_path(path.to_path_buf())
    })?;
    let parent = parent.canonicalize().map_err(notify::Error::io)?;
    Ok(parent.join(file_name))
}

fn load_certified_key(cert_path: &Path, key_path: &Path) -> Result<CertifiedKey, CertError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| CertError::io(cert_path, e))?;
    let key_pem = std::fs::read(key_path).map_err(|e| CertError::io(key_path, e))?;

    verify_key_matches(&cert_pem, &key_pem)?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| CertError::io(cert_path, e))?;
    if certs.is_empty() {
        return Err(CertError::InvalidPem);
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| CertError::io(key_path, e))?
        .ok_or(CertError::InvalidPem)?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| CertError::CertKeyMismatch(e.to_string()))?;

    Ok(CertifiedKey::new(certs, signing_key))
}
