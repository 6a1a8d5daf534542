//! Signer side of the channel: inbound messages in, responses out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{MessageChannel, MessageEvent};
use crate::dispatcher::Dispatcher;
use crate::protocol::{Request, Response};

pub struct SignerTransport {
    dispatcher: Dispatcher,
    installed: AtomicBool,
}

impl SignerTransport {
    pub fn new(dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            installed: AtomicBool::new(false),
        })
    }

    /// Start serving `channel`. Later calls are ignored.
    pub fn install(self: &Arc<Self>, channel: &dyn MessageChannel) {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("Signer transport already installed");
            return;
        }
        let transport = self.clone();
        channel.on_message(Arc::new(move |event: MessageEvent| {
            transport.handle_event(event)
        }));
    }

    /// The response owed for `event`, or `None` if it is not a request.
    ///
    /// The origin comes from the channel envelope; anything the payload says
    /// about its origin is ignored.
    pub fn respond(&self, event: &MessageEvent) -> Option<Response> {
        let request = match Request::from_message(&event.data) {
            Some(request) => request,
            None => {
                debug!("Ignoring non-request message from {:?}", event.origin);
                return None;
            }
        };
        Some(self.dispatcher.dispatch(&request, &event.origin))
    }

    fn handle_event(&self, event: MessageEvent) {
        let Some(response) = self.respond(&event) else {
            return;
        };

        let data = match serde_json::to_value(&response) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode response {}: {}", response.id, e);
                return;
            }
        };
        if let Err(e) = event.source.post_message(data, &event.origin) {
            warn!("Failed to deliver response {}: {}", response.id, e);
        }
    }
}
