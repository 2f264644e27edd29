//! Broker page living on another origin than the pages that drive it.
//!
//! Trusted pages post `open`/`focus`/`ping` requests; the broker opens or
//! focuses named tabs on their behalf. Messages from any other origin get
//! no reply and have no effect.

use super::message::BrokerMessage;
use super::origin::OriginPolicy;
use super::port::{PostedMessage, WindowPort};
use crate::tabs::{OpenStrategy, TabOpener, WindowHost};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the broker did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Rejected,
    Ignored,
    Ponged,
    Opened,
    Focused,
}

pub struct CrossOriginBroker<H> {
    policy: OriginPolicy,
    opener: TabOpener<H>,
    port: WindowPort,
}

impl<H: WindowHost> CrossOriginBroker<H> {
    /// `port` is the broker window's own address, used as the reply source.
    pub fn new(policy: OriginPolicy, host: H, port: WindowPort) -> Self {
        CrossOriginBroker {
            policy,
            opener: TabOpener::new(host, OpenStrategy::DirectTarget),
            port,
        }
    }

    pub fn opener(&self) -> &TabOpener<H> {
        &self.opener
    }

    /// Tell the page that opened us we are listening. Its origin is not
    /// known here, so the target is `*`; receivers filter by origin.
    pub fn announce_ready(&self, opener: Option<&WindowPort>) {
        if let Some(opener) = opener {
            opener.post_message(&BrokerMessage::Ready, "*", &self.port);
        }
    }

    pub fn handle(&self, message: &PostedMessage) -> Disposition {
        if !self.policy.allows(&message.origin) {
            warn!(origin = %message.origin, "Rejected message from untrusted origin");
            return Disposition::Rejected;
        }
        let Some(request) = BrokerMessage::parse(&message.data) else {
            debug!(origin = %message.origin, "Ignoring unrecognised message");
            return Disposition::Ignored;
        };

        match request {
            BrokerMessage::Ping { id } => {
                self.reply(message, BrokerMessage::Pong { id });
                Disposition::Ponged
            }
            BrokerMessage::Open { name, url, id } => {
                if name.is_empty() || url.is_empty() {
                    self.ack(message, id, false);
                    return Disposition::Ignored;
                }
                debug!(window = %name, url = %url, "Opening for remote page");
                self.opener.open_named(&url, &name);
                self.ack(message, id, true);
                Disposition::Opened
            }
            BrokerMessage::Focus { name, id } => {
                if name.is_empty() {
                    self.ack(message, id, false);
                    return Disposition::Ignored;
                }
                self.opener.focus_named(&name);
                self.ack(message, id, true);
                Disposition::Focused
            }
            BrokerMessage::Pong { .. } | BrokerMessage::Ready | BrokerMessage::Ack { .. } => {
                Disposition::Ignored
            }
        }
    }

    fn ack(&self, message: &PostedMessage, id: Option<u64>, ok: bool) {
        if let Some(id) = id {
            self.reply(message, BrokerMessage::Ack { id, ok });
        }
    }

    fn reply(&self, message: &PostedMessage, reply: BrokerMessage) {
        match &message.source {
            Some(source) => {
                if !source.post_message(&reply, &message.origin, &self.port) {
                    debug!(origin = %message.origin, "Reply not delivered");
                }
            }
            None => debug!(origin = %message.origin, "No source window to reply to"),
        }
    }

    /// Handle messages until the inbox closes or `cancel_token` fires.
    pub async fn run(
        &self,
        mut inbox: UnboundedReceiver<PostedMessage>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Broker cancelled");
                    break;
                }
                message = inbox.recv() => match message {
                    Some(message) => {
                        self.handle(&message);
                    }
                    None => {
                        debug!("Broker inbox closed");
                        break;
                    }
                },
            }
        }
    }
}

pub struct BrokerHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl BrokerHandle {
    pub(super) fn new(handle: JoinHandle<()>, cancel_token: CancellationToken) -> Self {
        BrokerHandle {
            handle,
            cancel_token,
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait_for_completion(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Broker task ended abnormally");
        }
    }
}

/// Announce readiness to `opener` and serve `inbox` on a background task.
pub fn spawn_cross_origin_broker<H>(
    broker: CrossOriginBroker<H>,
    inbox: UnboundedReceiver<PostedMessage>,
    opener: Option<WindowPort>,
) -> BrokerHandle
where
    H: WindowHost + 'static,
{
    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();
    info!(trusted_host = %broker.policy.trusted_host(), "Starting cross-origin broker");

    let handle = tokio::spawn(async move {
        broker.announce_ready(opener.as_ref());
        broker.run(inbox, cancel_clone).await;
    });

    BrokerHandle::new(handle, cancel_token)
}
