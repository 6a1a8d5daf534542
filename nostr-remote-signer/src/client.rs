//! Client side: correlates outbound requests with inbound responses.
//!
//! Every call gets a fresh random id and an entry in the pending table. The
//! inbound listener looks replies up by id; unknown ids (replies to another
//! client sharing the inbox, duplicates, late replies) are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use nostr_secp::{parse_public_key, EventTemplate, PublicKey, SignedEvent};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

use crate::channel::{ChannelError, MessageChannel, MessageEvent, MessagePort, WindowOpener};
use crate::protocol::{DecryptParams, EncryptParams, Method, Request};
use crate::relays::RelayMap;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const REQUEST_ID_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to signer")]
    NotConnected,

    /// The signer answered with an error.
    #[error("{0}")]
    Remote(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where the signer context is opened
    pub signer_url: String,
    /// Requests are posted scoped to this origin
    pub signer_origin: String,
    /// `None` waits forever
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Config for the signer at `signer_url`, origin derived from the URL.
    pub fn new(signer_url: impl Into<String>) -> Result<Self, ChannelError> {
        let signer_url = signer_url.into();
        let parsed = Url::parse(&signer_url).map_err(|e| ChannelError::InvalidUrl {
            url: signer_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            signer_origin: parsed.origin().ascii_serialization(),
            signer_url,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

type Outcome = Result<Value, ClientError>;
type PendingTable = Mutex<HashMap<String, oneshot::Sender<Outcome>>>;

pub struct SignerClient {
    config: ClientConfig,
    opener: Arc<dyn WindowOpener>,
    inbox: Arc<dyn MessageChannel>,
    window: Mutex<Option<Arc<dyn MessagePort>>>,
    pending: Arc<PendingTable>,
    listening: AtomicBool,
}

impl SignerClient {
    /// `opener` opens the signer; replies arrive on `inbox`.
    pub fn new(
        config: ClientConfig,
        opener: Arc<dyn WindowOpener>,
        inbox: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            config,
            opener,
            inbox,
            window: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            listening: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the signer unless a live one is already open.
    pub fn connect(&self) -> Result<(), ClientError> {
        let mut window = self.window.lock();
        if window.as_ref().is_some_and(|w| !w.is_closed()) {
            return Ok(());
        }

        self.listen();
        let port = self.opener.open(&self.config.signer_url)?;
        info!("Opened signer at {}", self.config.signer_url);
        *window = Some(port);
        Ok(())
    }

    /// Calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    /// Post `method` and return a handle to its response.
    pub fn begin(&self, method: Method) -> Result<PendingCall, ClientError> {
        let port = self.window.lock().clone().ok_or(ClientError::NotConnected)?;

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.pending.lock();
            let id = loop {
                let candidate = random_id();
                if !pending.contains_key(&candidate) {
                    break candidate;
                }
            };
            pending.insert(id.clone(), tx);
            id
        };

        // From here on, an early return drops the call and clears its entry.
        let call = PendingCall {
            id,
            rx,
            pending: self.pending.clone(),
            timeout: self.config.request_timeout,
        };

        let request = Request::new(call.id.clone(), &method)?;
        debug!("Posting request {} ({})", request.id, request.method);
        port.post_message(serde_json::to_value(&request)?, &self.config.signer_origin)?;

        Ok(call)
    }

    pub async fn get_public_key(&self) -> Result<PublicKey, ClientError> {
        let hex: String = self.call(Method::GetPublicKey).await?;
        parse_public_key(&hex).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn sign_event(&self, template: EventTemplate) -> Result<SignedEvent, ClientError> {
        self.call(Method::SignEvent(template)).await
    }

    pub async fn get_relays(&self) -> Result<RelayMap, ClientError> {
        self.call(Method::GetRelays).await
    }

    pub async fn nip04_encrypt(
        &self,
        pubkey: &PublicKey,
        plaintext: &str,
    ) -> Result<String, ClientError> {
        self.call(Method::Nip04Encrypt(encrypt_params(pubkey, plaintext)))
            .await
    }

    pub async fn nip04_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError> {
        self.call(Method::Nip04Decrypt(decrypt_params(pubkey, ciphertext)))
            .await
    }

    pub async fn nip44_encrypt(
        &self,
        pubkey: &PublicKey,
        plaintext: &str,
    ) -> Result<String, ClientError> {
        self.call(Method::Nip44Encrypt(encrypt_params(pubkey, plaintext)))
            .await
    }

    pub async fn nip44_decrypt(
        &self,
        pubkey: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, ClientError> {
        self.call(Method::Nip44Decrypt(decrypt_params(pubkey, ciphertext)))
            .await
    }

    async fn call<T: DeserializeOwned>(&self, method: Method) -> Result<T, ClientError> {
        let result = self.begin(method)?.wait().await?;
        Ok(serde_json::from_value(result)?)
    }

    fn listen(&self) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        // Weak, so a window outliving the client does not keep its table.
        let pending = Arc::downgrade(&self.pending);
        self.inbox.on_message(Arc::new(move |event: MessageEvent| {
            if let Some(pending) = pending.upgrade() {
                route_response(&pending, &event.data);
            }
        }));
    }
}

impl std::fmt::Debug for SignerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerClient")
            .field("config", &self.config)
            .field("pending_calls", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

fn route_response(pending: &PendingTable, data: &Value) {
    let Some(object) = data.as_object() else {
        return;
    };
    let Some(id) = object.get("id").and_then(Value::as_str) else {
        return;
    };
    let Some(tx) = pending.lock().remove(id) else {
        debug!("Ignoring response for unknown request {}", id);
        return;
    };

    let outcome = match (object.get("error"), object.get("result")) {
        (Some(error), _) if !error.is_null() => Err(ClientError::Remote(
            error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        )),
        (_, Some(result)) => Ok(result.clone()),
        _ => Err(ClientError::Protocol(format!(
            "response {id} has neither result nor error"
        ))),
    };
    // The caller may have stopped waiting.
    let _ = tx.send(outcome);
}

fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect()
}

fn encrypt_params(pubkey: &PublicKey, plaintext: &str) -> EncryptParams {
    EncryptParams {
        pubkey: pubkey.to_hex(),
        plaintext: plaintext.to_string(),
    }
}

fn decrypt_params(pubkey: &PublicKey, ciphertext: &str) -> DecryptParams {
    DecryptParams {
        pubkey: pubkey.to_hex(),
        ciphertext: ciphertext.to_string(),
    }
}

/// A request in flight.
///
/// Dropping it without waiting removes its pending entry.
#[derive(Debug)]
pub struct PendingCall {
    id: String,
    rx: oneshot::Receiver<Outcome>,
    pending: Arc<PendingTable>,
    timeout: Option<Duration>,
}

impl PendingCall {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.id.clone(),
            pending: Arc::downgrade(&self.pending),
        }
    }

    /// Wait for the response, the deadline or cancellation.
    pub async fn wait(mut self) -> Result<Value, ClientError> {
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!("Request {} timed out", self.id);
                    return Err(ClientError::Timeout(limit));
                }
            },
            None => (&mut self.rx).await,
        };

        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Cancels a [`PendingCall`] from elsewhere.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: String,
    pending: Weak<PendingTable>,
}

impl CancelHandle {
    /// Returns false if the call already finished.
    pub fn cancel(&self) -> bool {
        let Some(pending) = self.pending.upgrade() else {
            return false;
        };
        let Some(tx) = pending.lock().remove(&self.id) else {
            return false;
        };
        debug!("Request {} cancelled", self.id);
        let _ = tx.send(Err(ClientError::Cancelled));
        true
    }
}
