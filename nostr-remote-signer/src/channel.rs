//! Cross-context messaging.
//!
//! The signer and its clients never call each other directly. They exchange
//! JSON values over a channel that stamps every message with the sender's
//! origin and hands the receiver a [`MessagePort`] for replies. Two
//! implementations exist: [`crate::memory`] for in-process windows and
//! [`crate::server`] for the daemon's Unix socket.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No async runtime available")]
    NoRuntime,
}

/// One inbound message.
#[derive(Clone)]
pub struct MessageEvent {
    /// Sender's origin as asserted by the channel, not by the payload
    pub origin: String,
    pub data: Value,
    /// Where replies to this message go
    pub source: Arc<dyn MessagePort>,
}

impl std::fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEvent")
            .field("origin", &self.origin)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Capability to post messages to another context.
pub trait MessagePort: Send + Sync {
    /// Deliver `data` if the receiver's origin is `target_origin`.
    ///
    /// A mismatch is not an error; the message is dropped, as a browser
    /// would.
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), ChannelError>;

    fn is_closed(&self) -> bool;
}

pub type MessageHandler = Arc<dyn Fn(MessageEvent) + Send + Sync>;

/// Source of inbound messages.
pub trait MessageChannel: Send + Sync {
    /// Register `handler` for every subsequent message. Handlers are never
    /// removed.
    fn on_message(&self, handler: MessageHandler);
}

/// Opens the signer context and returns a port into it.
pub trait WindowOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<Arc<dyn MessagePort>, ChannelError>;
}
