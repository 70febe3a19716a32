//! Deterministic, checksum-tracked certificate files

use super::certificate::{CertificateRecord, decode_first_pem_block};
use super::CertError;
use certsync_core::Checksum;
use std::io::Write;
use std::path::{Path, PathBuf};

/// PEM type label accepted by [`DiskPersister::add_or_update_auxiliary_parameter`]
pub const AUXILIARY_PARAMETER_PEM_LABEL: &str = "DH PARAMETERS";

const PEM_EXTENSION: &str = "pem";

/// Writes certificate material under one fixed directory
#[derive(Debug, Clone)]
pub struct DiskPersister {
    cert_dir: PathBuf,
}

impl DiskPersister {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
        }
    }

    /// Create the certificate directory
    pub fn init(&self) -> Result<(), CertError> {
        std::fs::create_dir_all(&self.cert_dir).map_err(|e| CertError::io(&self.cert_dir, e))
    }

    /// Get certificate directory
    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    /// `<cert_dir>/<name>.pem`, with path separators in `name` replaced by `-`
    pub fn pem_file_path(&self, name: &str) -> PathBuf {
        self.cert_dir
            .join(format!("{}.{}", sanitize(name), PEM_EXTENSION))
    }

    /// `<cert_dir>/ca-<name>.pem`
    pub fn ca_file_path(&self, name: &str) -> PathBuf {
        self.cert_dir
            .join(format!("ca-{}.{}", sanitize(name), PEM_EXTENSION))
    }

    /// Write the record's PEM bundle to its deterministic path and refresh
    /// `stored_file_path` and `checksum`
    pub fn store_on_disk(&self, name: &str, record: &mut CertificateRecord) -> Result<(), CertError> {
        let path = self.pem_file_path(name);
        self.write_file(&path, &[record.pem_bundle.as_slice()])?;

        record.checksum = Some(checksum(&path)?);
        record.stored_file_path = Some(path);
        Ok(())
    }

    /// Create or truncate `path` and write `parts` in order
    pub(crate) fn write_file(&self, path: &Path, parts: &[&[u8]]) -> Result<(), CertError> {
        let mut file = std::fs::File::create(path).map_err(|e| CertError::io(path, e))?;
        for part in parts {
            file.write_all(part).map_err(|e| CertError::io(path, e))?;
        }
        Ok(())
    }

    /// Install auxiliary parameters (DH parameters) under `<name>.pem`.
    ///
    /// The bytes are staged in a temporary file in the certificate directory
    /// and only renamed onto the final path once their PEM type has been
    /// validated. The temporary file is removed on every failure path.
    pub fn add_or_update_auxiliary_parameter(
        &self,
        name: &str,
        raw: &[u8],
    ) -> Result<PathBuf, CertError> {
        let final_path = self.pem_file_path(name);

        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{}.", sanitize(name)))
            .suffix(".tmp")
            .tempfile_in(&self.cert_dir)
            .map_err(|e| CertError::io(&self.cert_dir, e))?;
        tracing::debug!(
            temp_path = %temp.path().display(),
            name = %name,
            "Created temp file for auxiliary parameter"
        );

        temp.write_all(raw)
            .and_then(|_| temp.flush())
            .map_err(|e| CertError::io(temp.path(), e))?;

        let written = std::fs::read(temp.path()).map_err(|e| CertError::io(temp.path(), e))?;
        decode_first_pem_block(&written, AUXILIARY_PARAMETER_PEM_LABEL)?;

        temp.persist(&final_path)
            .map_err(|e| CertError::io(&final_path, e.error))?;

        Ok(final_path)
    }
}

/// Checksum of the file at `path`
pub fn checksum(path: &Path) -> Result<Checksum, CertError> {
    let data = std::fs::read(path).map_err(|e| CertError::io(path, e))?;
    Ok(Checksum::of(&data))
}

fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "-")
}
