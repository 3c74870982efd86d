//! The credential lookup service backing the pre-shared key scheme.
//!
//! Persistent credential storage is external to this service; the gateway
//! only ever performs read-only lookups against it.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::{collections::HashMap, path::Path, time::Duration};
use subtle::ConstantTimeEq as _;

use crate::consts::{DEFAULT_HTTP_TIMEOUT_SECS, PBKDF2_ITERATIONS, PBKDF2_OUTPUT_LEN};

/// A stored credential record as returned by the credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    /// The public key identifier.
    pub key_id: String,
    /// The per-credential salt.
    pub salt: String,
    /// Hex-encoded PBKDF2-HMAC-SHA512 hash of the secret.
    pub hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("credential store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to read keystore file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse keystore file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The credential store the gateway looks key identities up in.
#[derive(Debug)]
pub enum Keystore {
    /// A remote credential service queried over HTTP.
    Http(HttpKeystore),
    /// A fixed in-memory credential set, loaded from a JSON file.
    Static(StaticKeystore),
    /// No key-scheme credentials configured; every lookup misses.
    Disabled,
}

impl Keystore {
    /// Look up the stored credential for a key identifier. A missing record
    /// is not an error.
    pub async fn lookup(&self, key_id: &str) -> Result<Option<StoredCredential>, KeystoreError> {
        match self {
            Self::Http(store) => store.lookup(key_id).await,
            Self::Static(store) => Ok(store.lookup(key_id)),
            Self::Disabled => Ok(None),
        }
    }

    /// Verify a secret against the stored credential for `key_id`.
    ///
    /// The secret is stretched with PBKDF2-HMAC-SHA512 using the stored salt
    /// and compared against the stored hash in constant time. Returns `false`
    /// for unknown keys, undecodable stored hashes and mismatches alike.
    pub async fn verify(&self, key_id: &str, secret: &str) -> Result<bool, KeystoreError> {
        let Some(credential) = self.lookup(key_id).await? else {
            return Ok(false);
        };
        Ok(credential.matches(secret))
    }
}

impl StoredCredential {
    /// Create a credential record from a plaintext secret. Used by tests and
    /// operator tooling; the gateway itself never sees plaintext secrets at
    /// rest.
    pub fn derive(key_id: impl Into<String>, salt: impl Into<String>, secret: &str) -> Self {
        let salt = salt.into();
        let hash = alloy_primitives::hex::encode(derive_secret_hash(secret, &salt));
        Self { key_id: key_id.into(), salt, hash }
    }

    /// Constant-time comparison of a candidate secret with the stored hash.
    pub fn matches(&self, secret: &str) -> bool {
        let Ok(stored) = alloy_primitives::hex::decode(&self.hash) else {
            return false;
        };
        let derived = derive_secret_hash(secret, &self.salt);
        stored.len() == derived.len() && bool::from(derived.ct_eq(&stored))
    }
}

/// Stretch a secret with PBKDF2-HMAC-SHA512.
fn derive_secret_hash(secret: &str, salt: &str) -> [u8; PBKDF2_OUTPUT_LEN] {
    let mut out = [0u8; PBKDF2_OUTPUT_LEN];
    pbkdf2_hmac::<Sha512>(secret.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut out);
    out
}

/// A remote credential store client.
#[derive(Debug)]
pub struct HttpKeystore {
    inner: reqwest::Client,
    url: String,
}

impl HttpKeystore {
    /// Create a new credential store client with a default HTTP timeout of 2 seconds.
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .build()
            .expect("to build reqwest client");
        Self { inner: client, url }
    }

    async fn lookup(&self, key_id: &str) -> Result<Option<StoredCredential>, KeystoreError> {
        let endpoint = format!("{}/api/v1/credentials/{key_id}", self.url);
        let response = self.inner.get(endpoint).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let credential = response.error_for_status()?.json::<StoredCredential>().await?;
        Ok(Some(credential))
    }
}

/// An in-memory credential set.
#[derive(Debug, Default)]
pub struct StaticKeystore {
    credentials: HashMap<String, StoredCredential>,
}

impl StaticKeystore {
    /// Load credentials from a JSON file containing a list of records.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeystoreError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<StoredCredential> = serde_json::from_str(&raw)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: impl IntoIterator<Item = StoredCredential>) -> Self {
        let credentials =
            records.into_iter().map(|record| (record.key_id.clone(), record)).collect();
        Self { credentials }
    }

    fn lookup(&self, key_id: &str) -> Option<StoredCredential> {
        self.credentials.get(key_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_against_static_store() {
        let credential = StoredCredential::derive("searcher-1", "salt-1", "hunter2");
        let keystore = Keystore::Static(StaticKeystore::from_records([credential]));

        assert!(keystore.verify("searcher-1", "hunter2").await.unwrap());
        assert!(!keystore.verify("searcher-1", "hunter3").await.unwrap());
        assert!(!keystore.verify("searcher-2", "hunter2").await.unwrap());
    }

    #[test]
    fn derived_hash_depends_on_salt() {
        let a = StoredCredential::derive("k", "salt-a", "secret");
        let b = StoredCredential::derive("k", "salt-b", "secret");
        assert_ne!(a.hash, b.hash);
        assert!(a.matches("secret"));
        assert!(!a.matches("Secret"));
    }

    #[tokio::test]
    async fn disabled_store_misses() {
        let keystore = Keystore::Disabled;
        assert!(!keystore.verify("any", "secret").await.unwrap());
    }
}
