//! Secret record model
//!
//! Secrets are the external records certificates are derived from. They
//! carry a byte-valued data map keyed by well-known field names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Serving certificate (PEM, optionally followed by intermediates)
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Private key matching [`TLS_CERT_KEY`]
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
/// Trust anchor used to validate client certificates
pub const CA_CERT_KEY: &str = "ca.crt";
/// Basic-auth credentials; secrets carrying only this field are not certificates
pub const AUTH_KEY: &str = "auth";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("invalid secret key {0:?}: expected <namespace>/<name>")]
    InvalidKey(String),
}

/// Identity of a secret: `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretKey {
    pub namespace: String,
    pub name: String,
}

impl SecretKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for SecretKey {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(SecretError::InvalidKey(s.to_string())),
        }
    }
}

/// A secret record as delivered by the secret source.
///
/// Data values are base64 encoded when serialized, matching the shape of a
/// Kubernetes secret manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub namespace: String,
    pub name: String,
    #[serde(default, with = "base64_data")]
    pub data: BTreeMap<String, Vec<u8>>,
}

/// How a secret is used, decided from which fields it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretShape<'a> {
    /// Serving certificate and key, with an optional client-auth CA
    Keypair {
        cert: &'a [u8],
        key: &'a [u8],
        ca: Option<&'a [u8]>,
    },
    /// Only a trust anchor for client certificate validation
    CaOnly { ca: &'a [u8] },
    /// Basic-auth secret, not certificate material
    AuthOnly,
    /// Neither a usable keypair nor a CA
    Malformed(&'static str),
}

impl Secret {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn key(&self) -> SecretKey {
        SecretKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn get(&self, field: &str) -> Option<&[u8]> {
        self.data.get(field).map(Vec::as_slice)
    }

    /// Classify the secret. Presence and emptiness of a field are checked
    /// separately: a keypair needs both fields present and non-empty.
    pub fn shape(&self) -> SecretShape<'_> {
        let ca = self.get(CA_CERT_KEY).filter(|ca| !ca.is_empty());

        match (self.get(TLS_CERT_KEY), self.get(TLS_PRIVATE_KEY_KEY)) {
            (Some(cert), Some(key)) => {
                if cert.is_empty() {
                    return SecretShape::Malformed("key 'tls.crt' missing from secret");
                }
                if key.is_empty() {
                    return SecretShape::Malformed("key 'tls.key' missing from secret");
                }
                SecretShape::Keypair { cert, key, ca }
            }
            _ => match ca {
                Some(ca) => SecretShape::CaOnly { ca },
                None if self.data.contains_key(AUTH_KEY) => SecretShape::AuthOnly,
                None => SecretShape::Malformed("secret contains no keypair or CA certificate"),
            },
        }
    }
}

mod base64_data {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(data: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(data.iter().map(|(k, v)| (k, BASE64.encode(v))))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                BASE64
                    .decode(v.trim())
                    .map(|bytes| (k.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("field {k:?} is not base64: {e}")))
            })
            .collect()
    }
}
