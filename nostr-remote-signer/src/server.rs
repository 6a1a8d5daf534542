//! Unix socket channel for the signer daemon.
//!
//! Each frame is a little-endian `u32` length followed by a JSON
//! [`Frame`]. Towards the server `origin` is the origin the connecting
//! process asserts for its caller; towards the client it is the origin the
//! reply is scoped to. The socket is owner-only, so only local processes
//! running as the daemon's user can assert origins at all.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nostr_keystore::IdentityStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::{
    ChannelError, MessageChannel, MessageEvent, MessageHandler, MessagePort, WindowOpener,
};
use crate::dispatcher::Dispatcher;
use crate::memory::ANY_ORIGIN;
use crate::transport::SignerTransport;

/// 1MB max
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: String,
    pub data: Value,
}

/// Errors from the signer server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Read one frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ServerError>
where
    R: AsyncRead + Unpin,
{
    let msg_len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if msg_len > MAX_FRAME_LEN {
        return Err(ServerError::Protocol("Message too large".to_string()));
    }

    let mut msg_buf = vec![0u8; msg_len];
    reader.read_exact(&mut msg_buf).await?;

    Ok(Some(serde_json::from_slice(&msg_buf)?))
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(frame)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ServerError::Protocol("Message too large".to_string()));
    }

    writer.write_u32_le(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Server configuration.
pub struct ServerConfig {
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Where the identity is loaded from on every request
    pub store: Arc<dyn IdentityStore>,
}

#[derive(Default)]
struct SocketChannel {
    handlers: Mutex<Vec<MessageHandler>>,
}

impl SocketChannel {
    fn deliver(&self, event: MessageEvent) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl MessageChannel for SocketChannel {
    fn on_message(&self, handler: MessageHandler) {
        self.handlers.lock().push(handler);
    }
}

/// Reply port for one accepted connection.
///
/// A connection has a single peer, so `target_origin` is carried in the
/// frame rather than checked here.
struct ConnectionPort {
    tx: mpsc::UnboundedSender<Frame>,
}

impl MessagePort for ConnectionPort {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), ChannelError> {
        self.tx
            .send(Frame {
                origin: target_origin.to_string(),
                data,
            })
            .map_err(|_| ChannelError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Remote signer server.
pub struct SignerServer {
    listener: UnixListener,
    socket_path: PathBuf,
    channel: Arc<SocketChannel>,
}

impl SignerServer {
    /// Bind the socket and install the signer on it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        // Remove existing socket file if it exists
        if config.socket_path.exists() {
            std::fs::remove_file(&config.socket_path)?;
        }

        if let Some(parent) = config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&config.socket_path)?;
        info!("Signer server listening on {:?}", config.socket_path);

        // Owner only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&config.socket_path, perms)?;
        }

        let channel = Arc::new(SocketChannel::default());
        SignerTransport::new(Dispatcher::new(config.store)).install(channel.as_ref());

        Ok(Self {
            listener,
            socket_path: config.socket_path,
            channel,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!("Signer server starting...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    debug!("New connection");
                    let channel = self.channel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, channel).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, channel: Arc<SocketChannel>) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                warn!("Error writing response: {}", e);
                break;
            }
        }
    });

    let port: Arc<dyn MessagePort> = Arc::new(ConnectionPort { tx });
    let result = loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => channel.deliver(MessageEvent {
                origin: frame.origin,
                data: frame.data,
                source: port.clone(),
            }),
            Ok(None) => break Ok(()),
            // Framing is intact, only this body is bad.
            Err(ServerError::Serialization(e)) => warn!("Skipping undecodable frame: {}", e),
            Err(e) => break Err(e),
        }
    };

    // Let queued responses drain before closing.
    drop(port);
    let _ = writer_task.await;
    debug!("Connection closed");
    result
}

/// Client end of the daemon socket.
///
/// Acts as both the [`WindowOpener`] and the inbox of a
/// [`crate::SignerClient`]. Every request is sent with `origin` asserted;
/// replies scoped to any other origin are dropped.
pub struct SocketConnector {
    socket_path: PathBuf,
    origin: String,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
}

impl SocketConnector {
    pub fn new(socket_path: impl AsRef<Path>, origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            origin: origin.into(),
            handlers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl MessageChannel for SocketConnector {
    fn on_message(&self, handler: MessageHandler) {
        self.handlers.lock().push(handler);
    }
}

impl WindowOpener for SocketConnector {
    /// Connect to the daemon. `url` only names the peer in inbound events.
    fn open(&self, url: &str) -> Result<Arc<dyn MessagePort>, ChannelError> {
        let handle = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        let stream = std::os::unix::net::UnixStream::connect(&self.socket_path)?;
        stream.set_nonblocking(true)?;
        let stream = {
            let _guard = handle.enter();
            UnixStream::from_std(stream)?
        };
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        let closed = Arc::new(AtomicBool::new(false));

        let port: Arc<dyn MessagePort> = Arc::new(ConnectorPort {
            tx,
            origin: self.origin.clone(),
            closed: closed.clone(),
        });

        handle.spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!("Error writing request: {}", e);
                    break;
                }
            }
        });

        let origin = self.origin.clone();
        let peer = url.to_string();
        let handlers = self.handlers.clone();
        let source = port.clone();
        handle.spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) if frame.origin == origin || frame.origin == ANY_ORIGIN => {
                        let event = MessageEvent {
                            origin: peer.clone(),
                            data: frame.data,
                            source: source.clone(),
                        };
                        let handlers = handlers.lock().clone();
                        for handler in handlers {
                            handler(event.clone());
                        }
                    }
                    Ok(Some(frame)) => {
                        debug!("Dropping frame scoped to {:?}", frame.origin);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading from signer: {}", e);
                        break;
                    }
                }
            }
            closed.store(true, Ordering::SeqCst);
        });

        info!("Connected to signer socket {:?}", self.socket_path);
        Ok(port)
    }
}

struct ConnectorPort {
    tx: mpsc::UnboundedSender<Frame>,
    origin: String,
    closed: Arc<AtomicBool>,
}

impl MessagePort for ConnectorPort {
    /// The daemon is the only peer; `target_origin` is not checked.
    fn post_message(&self, data: Value, _target_origin: &str) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.tx
            .send(Frame {
                origin: self.origin.clone(),
                data,
            })
            .map_err(|_| ChannelError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, ClientError, SignerClient};
    use nostr_keystore::{grant_origin, provision, BlobIdentityStore, FileBlobStore};
    use nostr_secp::decode_npub;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    const APP: &str = "https://app.example";

    fn create_test_server(temp_dir: &TempDir) -> (SignerServer, String) {
        let store = Arc::new(BlobIdentityStore::new(FileBlobStore::new(
            temp_dir.path().join("store"),
        )));
        let creds = provision(store.as_ref()).unwrap();
        grant_origin(store.as_ref(), APP).unwrap();

        let config = ServerConfig {
            socket_path: temp_dir.path().join("run").join("signer.sock"),
            store,
        };
        (SignerServer::new(config).unwrap(), creds.npub)
    }

    fn socket_client(socket_path: &Path, origin: &str) -> SignerClient {
        let connector = SocketConnector::new(socket_path, origin);
        let config = ClientConfig::new(format!("unix://{}", socket_path.display()))
            .unwrap()
            .with_request_timeout(Some(Duration::from_secs(5)));
        SignerClient::new(config, connector.clone(), connector)
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let frame = Frame {
            origin: APP.to_string(),
            data: json!({ "id": "1", "type": "getRelays" }),
        };

        write_frame(&mut a, &frame).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(frame));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32_le((MAX_FRAME_LEN + 1) as u32).await.unwrap();

        match read_frame(&mut b).await {
            Err(ServerError::Protocol(msg)) => assert_eq!(msg, "Message too large"),
            other => panic!("Expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let temp_dir = TempDir::new().unwrap();
        let (server, _) = create_test_server(&temp_dir);
        assert!(server.socket_path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(server.socket_path())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_stale_socket_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let (first, _) = create_test_server(&temp_dir);
        let path = first.socket_path().to_path_buf();
        drop(first);

        let store = Arc::new(BlobIdentityStore::new(FileBlobStore::new(
            temp_dir.path().join("store"),
        )));
        let second = SignerServer::new(ServerConfig {
            socket_path: path.clone(),
            store,
        });
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_client_over_socket() {
        let temp_dir = TempDir::new().unwrap();
        let (server, npub) = create_test_server(&temp_dir);
        let path = server.socket_path().to_path_buf();
        tokio::spawn(async move { server.run().await });

        let client = socket_client(&path, APP);
        client.connect().unwrap();

        let public_key = client.get_public_key().await.unwrap();
        assert_eq!(public_key, decode_npub(&npub).unwrap());

        let relays = client.get_relays().await.unwrap();
        assert_eq!(relays.len(), 3);
    }

    #[tokio::test]
    async fn test_unlisted_origin_over_socket() {
        let temp_dir = TempDir::new().unwrap();
        let (server, _) = create_test_server(&temp_dir);
        let path = server.socket_path().to_path_buf();
        tokio::spawn(async move { server.run().await });

        let client = socket_client(&path, "https://evil.example");
        client.connect().unwrap();

        match client.get_public_key().await {
            Err(ClientError::Remote(msg)) => assert_eq!(msg, "Origin not allowed"),
            other => panic!("Expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_raw_frames() {
        let temp_dir = TempDir::new().unwrap();
        let (server, _) = create_test_server(&temp_dir);
        let path = server.socket_path().to_path_buf();
        tokio::spawn(async move { server.run().await });

        let mut stream = UnixStream::connect(&path).await.unwrap();

        // Not a request: no reply.
        write_frame(
            &mut stream,
            &Frame {
                origin: APP.to_string(),
                data: json!("hello"),
            },
        )
        .await
        .unwrap();
        // Not a frame: skipped.
        stream.write_u32_le(5).await.unwrap();
        stream.write_all(b"{oops").await.unwrap();

        write_frame(
            &mut stream,
            &Frame {
                origin: APP.to_string(),
                data: json!({ "id": "2", "type": "bogus" }),
            },
        )
        .await
        .unwrap();

        let reply = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(reply.origin, APP);
        assert_eq!(reply.data, json!({ "id": "2", "error": "Unsupported method" }));
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let temp_dir = TempDir::new().unwrap();
        let (server, _) = create_test_server(&temp_dir);
        let path = server.socket_path().to_path_buf();
        tokio::spawn(async move { server.run().await });

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_u32_le(2 * MAX_FRAME_LEN as u32).await.unwrap();

        assert_eq!(read_frame(&mut stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connector_drops_frames_for_other_origins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let connector = SocketConnector::new(&path, APP);
        let (tx, mut rx) = mpsc::unbounded_channel();
        connector.on_message(Arc::new(move |event: MessageEvent| {
            let _ = tx.send(event.data);
        }));
        let port = connector.open("unix:///fake").unwrap();

        let (mut peer, _) = listener.accept().await.unwrap();
        for (origin, n) in [("https://other.example", 1), (APP, 2)] {
            write_frame(
                &mut peer,
                &Frame {
                    origin: origin.to_string(),
                    data: json!(n),
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(rx.recv().await, Some(json!(2)));

        // Requests carry the connector's origin.
        port.post_message(json!({ "id": "x" }), "ignored").unwrap();
        let request = read_frame(&mut peer).await.unwrap().unwrap();
        assert_eq!(request.origin, APP);

        drop(peer);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !port.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_connector_needs_runtime() {
        let connector = SocketConnector::new("/nonexistent.sock", APP);
        assert!(matches!(
            connector.open("unix:///nonexistent.sock"),
            Err(ChannelError::NoRuntime)
        ));
    }
}
