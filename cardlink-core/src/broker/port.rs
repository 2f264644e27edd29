//! `postMessage` between windows of different origins.

use super::message::BrokerMessage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// One delivered message, as a `message` event listener sees it.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    /// Origin of the sending window, stamped by the transport.
    pub origin: String,
    pub data: serde_json::Value,
    /// Port for replying to the sender.
    pub source: Option<WindowPort>,
}

/// Address of a window that can receive posted messages.
#[derive(Debug, Clone)]
pub struct WindowPort {
    origin: String,
    tx: UnboundedSender<PostedMessage>,
}

impl WindowPort {
    /// A window at `origin` and the inbox its listener reads from.
    pub fn channel(origin: &str) -> (WindowPort, UnboundedReceiver<PostedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            WindowPort {
                origin: origin.to_string(),
                tx,
            },
            rx,
        )
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Deliver `data` if this window's origin matches `target_origin`
    /// (`"*"` matches anything). Returns whether it was delivered.
    pub fn post_value(
        &self,
        data: serde_json::Value,
        target_origin: &str,
        sender: &WindowPort,
    ) -> bool {
        if target_origin != "*" && target_origin != self.origin {
            trace!(
                target_origin = %target_origin,
                origin = %self.origin,
                "Dropping message for other origin"
            );
            return false;
        }
        self.tx
            .send(PostedMessage {
                origin: sender.origin.clone(),
                data,
                source: Some(sender.clone()),
            })
            .is_ok()
    }

    pub fn post_message(
        &self,
        message: &BrokerMessage,
        target_origin: &str,
        sender: &WindowPort,
    ) -> bool {
        self.post_value(message.to_value(), target_origin, sender)
    }
}
