//! In-process windows with browser `postMessage` semantics.
//!
//! Delivery is synchronous: `post_message` runs the receiver's handlers
//! before returning. Handlers are cloned out of the lock first, so a handler
//! may post again (the signer replying from inside its handler, for one).
//!
//! Ports hold windows weakly. Whoever created a window owns it; a port into a
//! dropped window behaves as closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::channel::{
    ChannelError, MessageChannel, MessageEvent, MessageHandler, MessagePort, WindowOpener,
};

/// Matches any receiver origin.
pub const ANY_ORIGIN: &str = "*";

pub struct MemoryWindow {
    origin: String,
    handlers: Mutex<Vec<MessageHandler>>,
    closed: AtomicBool,
    this: Weak<MemoryWindow>,
}

impl MemoryWindow {
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        let origin = origin.into();
        Arc::new_cyclic(|this| Self {
            origin,
            handlers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// A port that posts from this window into `target`.
    pub fn port_to(&self, target: &Arc<MemoryWindow>) -> Arc<dyn MessagePort> {
        Arc::new(WindowPort {
            from: self.this.clone(),
            from_origin: self.origin.clone(),
            to: Arc::downgrade(target),
        })
    }

    /// Closed windows reject posts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.handlers.lock().len()
    }

    fn deliver(&self, event: MessageEvent) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl MessageChannel for MemoryWindow {
    fn on_message(&self, handler: MessageHandler) {
        self.handlers.lock().push(handler);
    }
}

impl std::fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("origin", &self.origin)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct WindowPort {
    from: Weak<MemoryWindow>,
    from_origin: String,
    to: Weak<MemoryWindow>,
}

impl MessagePort for WindowPort {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), ChannelError> {
        let to = match self.to.upgrade() {
            Some(to) if !to.is_closed() => to,
            _ => return Err(ChannelError::Closed),
        };

        if target_origin != ANY_ORIGIN && target_origin != to.origin {
            debug!(
                "Dropping message for {:?}: receiver origin is {:?}",
                target_origin, to.origin
            );
            return Ok(());
        }

        let reply = WindowPort {
            from: self.to.clone(),
            from_origin: to.origin.clone(),
            to: self.from.clone(),
        };
        to.deliver(MessageEvent {
            origin: self.from_origin.clone(),
            data,
            source: Arc::new(reply),
        });
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.to.upgrade().map_or(true, |to| to.is_closed())
    }
}

type WindowInit = dyn Fn(&Arc<MemoryWindow>) + Send + Sync;

/// Opens in-process windows on behalf of `opener`.
///
/// Each window's origin is derived from the URL it is opened at; `init` runs
/// on every new window before the port is handed out, typically to install a
/// [`crate::SignerTransport`]. Opened windows are owned here.
pub struct MemoryOpener {
    opener: Arc<MemoryWindow>,
    init: Box<WindowInit>,
    opened: Mutex<Vec<Arc<MemoryWindow>>>,
}

impl MemoryOpener {
    pub fn new(
        opener: Arc<MemoryWindow>,
        init: impl Fn(&Arc<MemoryWindow>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            opener,
            init: Box::new(init),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Every window opened so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<MemoryWindow>> {
        self.opened.lock().clone()
    }
}

impl WindowOpener for MemoryOpener {
    fn open(&self, url: &str) -> Result<Arc<dyn MessagePort>, ChannelError> {
        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let window = MemoryWindow::new(parsed.origin().ascii_serialization());
        (self.init)(&window);
        debug!("Opened window {:?} at {}", window.origin(), url);

        let port = self.opener.port_to(&window);
        self.opened.lock().push(window);
        Ok(port)
    }
}
