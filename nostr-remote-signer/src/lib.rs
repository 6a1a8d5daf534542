//! Remote signer for Nostr keys.
//!
//! The secret key lives in a signer context (a separate window, or the
//! `nostr-signer-daemon` process) and never leaves it. Applications talk to
//! it through a message channel; the signer serves only origins on the
//! identity's allow-list.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   {id, type, params}   ┌──────────────────┐
//! │  SignerClient   │ ─────────────────────► │ SignerTransport  │
//! │ (pending table) │ ◄───────────────────── │  └─ Dispatcher   │
//! └─────────────────┘    {id, result|error}  │     └─ security  │
//!                                            │     └─ Signer    │
//!                                            └──────────────────┘
//! ```
//!
//! The channel is either in-process ([`memory`]) or the daemon's Unix
//! socket ([`server`]).
//!
//! ## Usage
//!
//! Provision an identity and allow an application:
//! ```bash
//! nostr-signer-daemon provision
//! nostr-signer-daemon allow https://app.example
//! nostr-signer-daemon serve --socket /var/run/nostr-signer.sock
//! ```
//!
//! Then, from the bridging process:
//! ```ignore
//! let connector = SocketConnector::new("/var/run/nostr-signer.sock", "https://app.example");
//! let client = SignerClient::new(ClientConfig::new("unix:///var/run/nostr-signer.sock")?,
//!     connector.clone(), connector);
//! client.connect()?;
//! let pubkey = client.get_public_key().await?;
//! ```

pub mod channel;
pub mod client;
pub mod dispatcher;
pub mod memory;
pub mod protocol;
pub mod relays;
pub mod security;
pub mod server;
pub mod transport;

pub use channel::{
    ChannelError, MessageChannel, MessageEvent, MessageHandler, MessagePort, WindowOpener,
};
pub use client::{
    CancelHandle, ClientConfig, ClientError, PendingCall, SignerClient, DEFAULT_REQUEST_TIMEOUT,
};
pub use dispatcher::{DispatchError, Dispatcher};
pub use memory::{MemoryOpener, MemoryWindow};
pub use protocol::{DecryptParams, EncryptParams, Method, MethodError, Request, Response};
pub use relays::{default_relays, RelayMap, RelayPolicy};
pub use security::{admit, authorize, AccessError};
pub use server::{Frame, ServerConfig, ServerError, SignerServer, SocketConnector};
pub use transport::SignerTransport;
