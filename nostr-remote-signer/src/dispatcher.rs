//! Signer-side request dispatch.
//!
//! Each call is independent: the identity is reloaded from the store, the
//! origin is checked, and the request is routed to the matching [`Signer`]
//! operation. Every failure becomes an error [`Response`]; nothing escapes to
//! the caller.

use std::sync::Arc;

use nostr_keystore::{IdentityRecord, IdentityStore};
use nostr_secp::{parse_public_key, CryptoError, LocalSigner, Signer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::protocol::{Method, MethodError, Request, Response};
use crate::relays::{default_relays, RelayMap};
use crate::security::{admit, AccessError};

/// Reply text for failures that render empty.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Errors raised while handling one request.
///
/// Display text is what the caller sees in the `error` field.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Method(#[from] MethodError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct Dispatcher {
    store: Arc<dyn IdentityStore>,
    relays: RelayMap,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            relays: default_relays(),
        }
    }

    /// Handle `request` on behalf of `origin`. Always returns a response.
    pub fn dispatch(&self, request: &Request, origin: &str) -> Response {
        debug!(
            "Request: id={}, type={}, origin={}",
            request.id, request.method, origin
        );

        match self.try_dispatch(request, origin) {
            Ok(result) => Response::success(request.id.clone(), result),
            Err(e) => {
                match &e {
                    DispatchError::Access(_) | DispatchError::Method(_) => {
                        warn!("Request {} rejected: {}", request.id, e)
                    }
                    _ => error!("Request {} failed: {}", request.id, e),
                }
                let mut message = e.to_string();
                if message.is_empty() {
                    message = UNKNOWN_ERROR.to_string();
                }
                Response::error(request.id.clone(), message)
            }
        }
    }

    fn try_dispatch(&self, request: &Request, origin: &str) -> Result<Value, DispatchError> {
        let identity = admit(self.load_identity(), origin)?;
        let method = Method::parse(&request.method, request.params.as_ref())?;
        let signer = LocalSigner::new(identity.secret_key().clone());

        self.execute(&method, &signer)
    }

    /// Absent and unreadable records are treated alike: no identity.
    fn load_identity(&self) -> Option<IdentityRecord> {
        match self.store.load() {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Failed to load identity: {}", e);
                None
            }
        }
    }

    fn execute(&self, method: &Method, signer: &dyn Signer) -> Result<Value, DispatchError> {
        let result = match method {
            Method::GetPublicKey => Value::String(signer.public_key().to_hex()),
            Method::SignEvent(template) => serde_json::to_value(signer.sign_event(template)?)?,
            Method::GetRelays => serde_json::to_value(&self.relays)?,
            Method::Nip04Encrypt(p) => {
                let counterparty = parse_public_key(&p.pubkey)?;
                Value::String(signer.nip04_encrypt(&counterparty, &p.plaintext)?)
            }
            Method::Nip04Decrypt(p) => {
                let counterparty = parse_public_key(&p.pubkey)?;
                Value::String(signer.nip04_decrypt(&counterparty, &p.ciphertext)?)
            }
            Method::Nip44Encrypt(p) => {
                let counterparty = parse_public_key(&p.pubkey)?;
                Value::String(signer.nip44_encrypt(&counterparty, &p.plaintext)?)
            }
            Method::Nip44Decrypt(p) => {
                let counterparty = parse_public_key(&p.pubkey)?;
                Value::String(signer.nip44_decrypt(&counterparty, &p.ciphertext)?)
            }
        };
        Ok(result)
    }
}
