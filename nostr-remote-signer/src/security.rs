//! Origin authorization for the remote signer.
//!
//! Every request, including read-only ones like `getPublicKey`, must come
//! from an origin on the identity's allow-list. Matching is literal: no
//! wildcards, no subdomain or scheme folding. Without an identity nothing is
//! authorized.
//!
//! Rejections carry a fixed message so a caller learns nothing about which
//! origins are allowed.

use nostr_keystore::IdentityRecord;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("No identity found")]
    MissingIdentity,

    #[error("Origin not allowed")]
    OriginRejected,
}

/// True iff `origin` is literally on `identity`'s allow-list.
pub fn authorize(identity: Option<&IdentityRecord>, origin: &str) -> bool {
    identity.is_some_and(|identity| identity.is_origin_allowed(origin))
}

/// Hand back the identity if `origin` may use it.
pub fn admit(identity: Option<IdentityRecord>, origin: &str) -> Result<IdentityRecord, AccessError> {
    let identity = identity.ok_or(AccessError::MissingIdentity)?;

    if !authorize(Some(&identity), origin) {
        warn!("Rejecting request from unauthorized origin {:?}", origin);
        return Err(AccessError::OriginRejected);
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_for(origins: &[&str]) -> IdentityRecord {
        let mut identity = IdentityRecord::generate();
        for origin in origins {
            identity.allow_origin(origin).unwrap();
        }
        identity
    }

    #[test]
    fn test_no_identity_denies() {
        assert!(!authorize(None, "https://app.example"));
        assert_eq!(
            admit(None, "https://app.example").unwrap_err(),
            AccessError::MissingIdentity
        );
    }

    #[test]
    fn test_empty_allow_list_denies() {
        let identity = identity_for(&[]);
        assert!(!authorize(Some(&identity), "https://app.example"));
    }

    #[test]
    fn test_listed_origin_admitted() {
        let identity = identity_for(&["https://app.example"]);
        let public_key = identity.public_key();

        let admitted = admit(Some(identity), "https://app.example").unwrap();
        assert_eq!(admitted.public_key(), public_key);
    }

    #[test]
    fn test_unlisted_origin_rejected() {
        let identity = identity_for(&["https://app.example"]);

        for origin in [
            "https://evil.example",
            "https://app.example.evil.example",
            "http://app.example",
            "https://app.example/",
            "",
            "*",
        ] {
            assert!(!authorize(Some(&identity), origin), "{origin} authorized");
        }
        assert_eq!(
            admit(Some(identity), "https://evil.example").unwrap_err(),
            AccessError::OriginRejected
        );
    }

    #[test]
    fn test_rejection_message_is_generic() {
        assert_eq!(AccessError::OriginRejected.to_string(), "Origin not allowed");
    }
}
