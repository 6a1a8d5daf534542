// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The persisted signer identity.
//!
//! ## Blob format
//!
//! Stored under [`IDENTITY_KEY`] as JSON:
//!
//! ```json
//! { "nsec": "nsec1...", "npub": "npub1...", "allowedOrigins": ["https://app.example"] }
//! ```
//!
//! `allowedOrigins` may be absent in older blobs and is read as empty. The
//! `npub` must be the key derived from `nsec`; a mismatch is treated as a
//! corrupt record rather than silently trusting either half.

use std::collections::BTreeSet;

use nostr_secp::{
    decode_npub, decode_nsec, derive_public_key, encode_npub, encode_nsec, generate_secret_key,
    CryptoError, PublicKey, SecretKey,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::store::{BlobStore, StoreError};

/// Blob store key holding the identity record.
pub const IDENTITY_KEY: &str = "nostr_identity";

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Provisioning was attempted without usable persistent storage.
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("No identity found")]
    Missing,

    #[error("Corrupt identity record: {0}")]
    Corrupt(String),

    #[error("Identity npub does not match its nsec")]
    KeyMismatch,

    #[error("Invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encoded key pair handed back by provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub nsec: String,
    pub npub: String,
}

/// On-disk shape of the record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    nsec: String,
    npub: String,
    #[serde(default, rename = "allowedOrigins")]
    allowed_origins: Vec<String>,
}

/// Secret/public key pair plus the origins allowed to use it.
#[derive(Clone)]
pub struct IdentityRecord {
    secret_key: SecretKey,
    public_key: PublicKey,
    allowed_origins: BTreeSet<String>,
}

impl IdentityRecord {
    /// Fresh identity with no authorized origins.
    pub fn generate() -> Self {
        Self::from_secret_key(generate_secret_key())
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = derive_public_key(&secret_key);
        Self {
            secret_key,
            public_key,
            allowed_origins: BTreeSet::new(),
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn allowed_origins(&self) -> &BTreeSet<String> {
        &self.allowed_origins
    }

    /// Literal membership test, no pattern matching.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.contains(origin)
    }

    /// Add `origin` to the allow-list. Returns false if it was already there.
    pub fn allow_origin(&mut self, origin: &str) -> Result<bool, IdentityError> {
        validate_origin(origin)?;
        Ok(self.allowed_origins.insert(origin.to_string()))
    }

    /// Returns false if `origin` was not on the allow-list.
    pub fn revoke_origin(&mut self, origin: &str) -> bool {
        self.allowed_origins.remove(origin)
    }

    pub fn credentials(&self) -> Result<Credentials, IdentityError> {
        Ok(Credentials {
            nsec: encode_nsec(&self.secret_key)?,
            npub: encode_npub(&self.public_key)?,
        })
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, IdentityError> {
        let Credentials { nsec, npub } = self.credentials()?;
        let stored = StoredIdentity {
            nsec,
            npub,
            allowed_origins: self.allowed_origins.iter().cloned().collect(),
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    pub fn from_blob(bytes: &[u8]) -> Result<Self, IdentityError> {
        let stored: StoredIdentity = serde_json::from_slice(bytes)?;
        let secret_key = decode_nsec(&stored.nsec)?;
        let public_key = decode_npub(&stored.npub)?;

        if derive_public_key(&secret_key) != public_key {
            return Err(IdentityError::KeyMismatch);
        }

        Ok(Self {
            secret_key,
            public_key,
            allowed_origins: stored.allowed_origins.into_iter().collect(),
        })
    }
}

impl std::fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("secret_key", &"<redacted>")
            .field("public_key", &self.public_key.to_hex())
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

/// Accept only serialized web origins: `scheme://host[:port]` exactly as a
/// browser would report them, so literal matching works.
fn validate_origin(origin: &str) -> Result<(), IdentityError> {
    let invalid = |reason: String| IdentityError::InvalidOrigin {
        origin: origin.to_string(),
        reason,
    };

    let url = Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
    let serialized = url.origin().ascii_serialization();

    if serialized == "null" {
        return Err(invalid("opaque origin".to_string()));
    }
    if serialized != origin {
        return Err(invalid(format!("expected {serialized}")));
    }
    Ok(())
}

/// Where the signer loads and saves its identity.
pub trait IdentityStore: Send + Sync {
    /// `Ok(None)` when nothing has been provisioned yet.
    fn load(&self) -> Result<Option<IdentityRecord>, IdentityError>;

    fn save(&self, identity: &IdentityRecord) -> Result<(), IdentityError>;
}

/// [`IdentityStore`] over a [`BlobStore`], using [`IDENTITY_KEY`].
#[derive(Debug)]
pub struct BlobIdentityStore<B> {
    blobs: B,
}

impl<B: BlobStore> BlobIdentityStore<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }
}

impl<B: BlobStore> IdentityStore for BlobIdentityStore<B> {
    fn load(&self) -> Result<Option<IdentityRecord>, IdentityError> {
        match self.blobs.get(IDENTITY_KEY)? {
            Some(bytes) => IdentityRecord::from_blob(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, identity: &IdentityRecord) -> Result<(), IdentityError> {
        self.blobs.set(IDENTITY_KEY, &identity.to_blob()?)?;
        Ok(())
    }
}

/// Create and persist a brand-new identity, replacing any existing one.
pub fn provision(store: &dyn IdentityStore) -> Result<Credentials, IdentityError> {
    let identity = IdentityRecord::generate();
    let credentials = identity.credentials()?;

    store.save(&identity).map_err(|e| match e {
        IdentityError::Store(StoreError::Unavailable(reason)) => IdentityError::Environment(reason),
        other => other,
    })?;

    info!("Provisioned identity {}", credentials.npub);
    Ok(credentials)
}

/// Authorize `origin` for the stored identity. Returns false if it already was.
pub fn grant_origin(store: &dyn IdentityStore, origin: &str) -> Result<bool, IdentityError> {
    let mut identity = store.load()?.ok_or(IdentityError::Missing)?;
    let added = identity.allow_origin(origin)?;
    if added {
        store.save(&identity)?;
        info!("Granted origin {}", origin);
    }
    Ok(added)
}

/// Withdraw `origin` from the stored identity. Returns false if it was absent.
pub fn revoke_origin(store: &dyn IdentityStore, origin: &str) -> Result<bool, IdentityError> {
    let mut identity = store.load()?.ok_or(IdentityError::Missing)?;
    let removed = identity.revoke_origin(origin);
    if removed {
        store.save(&identity)?;
        info!("Revoked origin {}", origin);
    } else {
        warn!("Origin {} was not authorized", origin);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileBlobStore, MemoryBlobStore};
    use tempfile::TempDir;

    fn memory_store() -> BlobIdentityStore<MemoryBlobStore> {
        BlobIdentityStore::new(MemoryBlobStore::new())
    }

    #[test]
    fn test_load_without_identity() {
        assert!(memory_store().load().unwrap().is_none());
    }

    #[test]
    fn test_provision_persists_expected_shape() {
        let store = memory_store();
        let creds = provision(&store).unwrap();

        let raw = store.blobs().get(IDENTITY_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["nsec"], creds.nsec.as_str());
        assert_eq!(json["npub"], creds.npub.as_str());
        assert_eq!(json["allowedOrigins"], serde_json::json!([]));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.public_key(), decode_npub(&creds.npub).unwrap());
        assert!(loaded.allowed_origins().is_empty());
    }

    #[test]
    fn test_reprovision_replaces_identity() {
        let store = memory_store();
        let first = provision(&store).unwrap();
        grant_origin(&store, "https://app.example").unwrap();

        let second = provision(&store).unwrap();
        assert_ne!(first.npub, second.npub);

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(encode_npub(&loaded.public_key()).unwrap(), second.npub);
        assert!(loaded.allowed_origins().is_empty());
    }

    #[test]
    fn test_provision_without_storage() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let store = BlobIdentityStore::new(FileBlobStore::new(blocker.join("store")));
        assert!(matches!(
            provision(&store),
            Err(IdentityError::Environment(_))
        ));
    }

    #[test]
    fn test_missing_allowed_origins_defaults_empty() {
        let identity = IdentityRecord::generate();
        let creds = identity.credentials().unwrap();
        let blob = serde_json::json!({ "nsec": creds.nsec, "npub": creds.npub });

        let loaded = IdentityRecord::from_blob(blob.to_string().as_bytes()).unwrap();
        assert!(loaded.allowed_origins().is_empty());
        assert_eq!(loaded.public_key(), identity.public_key());
    }

    #[test]
    fn test_mismatched_npub_rejected() {
        let a = IdentityRecord::generate().credentials().unwrap();
        let b = IdentityRecord::generate().credentials().unwrap();
        let blob = serde_json::json!({ "nsec": a.nsec, "npub": b.npub, "allowedOrigins": [] });

        assert!(matches!(
            IdentityRecord::from_blob(blob.to_string().as_bytes()),
            Err(IdentityError::KeyMismatch)
        ));
    }

    #[test]
    fn test_unparsable_blob_rejected() {
        assert!(matches!(
            IdentityRecord::from_blob(b"not json"),
            Err(IdentityError::Serialization(_))
        ));
        assert!(matches!(
            IdentityRecord::from_blob(br#"{"nsec":"nsec1bogus","npub":"npub1bogus"}"#),
            Err(IdentityError::Crypto(_))
        ));
    }

    #[test]
    fn test_grant_and_revoke_origin() {
        let store = memory_store();
        provision(&store).unwrap();

        assert!(grant_origin(&store, "https://app.example").unwrap());
        assert!(!grant_origin(&store, "https://app.example").unwrap());
        assert!(grant_origin(&store, "http://localhost:5173").unwrap());

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.is_origin_allowed("https://app.example"));
        assert!(loaded.is_origin_allowed("http://localhost:5173"));

        assert!(revoke_origin(&store, "https://app.example").unwrap());
        assert!(!revoke_origin(&store, "https://app.example").unwrap());
        assert!(!store
            .load()
            .unwrap()
            .unwrap()
            .is_origin_allowed("https://app.example"));
    }

    #[test]
    fn test_grant_requires_identity() {
        assert!(matches!(
            grant_origin(&memory_store(), "https://app.example"),
            Err(IdentityError::Missing)
        ));
    }

    #[test]
    fn test_non_canonical_origins_refused() {
        let mut identity = IdentityRecord::generate();
        for origin in [
            "https://app.example/",
            "https://app.example/path",
            "https://app.example:443",
            "app.example",
            "data:text/plain,hi",
            "*",
        ] {
            assert!(
                matches!(
                    identity.allow_origin(origin),
                    Err(IdentityError::InvalidOrigin { .. })
                ),
                "{origin} should be refused"
            );
        }
        assert!(identity.allowed_origins().is_empty());
    }

    #[test]
    fn test_origin_match_is_literal() {
        let mut identity = IdentityRecord::generate();
        identity.allow_origin("https://app.example").unwrap();

        assert!(identity.is_origin_allowed("https://app.example"));
        assert!(!identity.is_origin_allowed("https://sub.app.example"));
        assert!(!identity.is_origin_allowed("http://app.example"));
        assert!(!identity.is_origin_allowed("https://app.example:8443"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let identity = IdentityRecord::generate();
        let nsec = identity.credentials().unwrap().nsec;
        let rendered = format!("{:?}", identity);

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&nsec));
    }
}
