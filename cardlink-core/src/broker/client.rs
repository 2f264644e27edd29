//! Page-side driver for a [`CrossOriginBroker`](super::CrossOriginBroker).

use super::message::BrokerMessage;
use super::port::{PostedMessage, WindowPort};
use crate::config::BrokerConfig;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// No matching reply within the caller's deadline.
    Timeout,
    /// The broker answered `ok: false`.
    Refused,
    /// The message could not be posted or the inbox closed.
    Disconnected,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Timeout => write!(f, "Broker did not answer in time"),
            BrokerError::Refused => write!(f, "Broker refused the request"),
            BrokerError::Disconnected => write!(f, "Broker window is gone"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Fixed-interval, bounded retry for the startup handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        RetryPolicy {
            interval: Duration::from_millis(config.ping_interval_ms),
            max_attempts: config.ping_max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&BrokerConfig::default())
    }
}

/// Replies kept for later waiters before the oldest is dropped.
const PENDING_LIMIT: usize = 32;

struct Inbox {
    rx: UnboundedReceiver<PostedMessage>,
    // broker replies nobody was waiting for yet, oldest first
    pending: VecDeque<BrokerMessage>,
}

pub struct BrokerClient {
    port: WindowPort,
    broker: WindowPort,
    inbox: Mutex<Inbox>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl BrokerClient {
    /// `port`/`inbox` belong to the page; `broker` is the broker window.
    /// Replies not coming from the broker's origin are discarded.
    pub fn new(
        port: WindowPort,
        inbox: UnboundedReceiver<PostedMessage>,
        broker: WindowPort,
    ) -> Self {
        BrokerClient {
            port,
            broker,
            inbox: Mutex::new(Inbox {
                rx: inbox,
                pending: VecDeque::new(),
            }),
            next_id: AtomicU64::new(1),
            request_timeout: BrokerConfig::default().request_timeout(),
        }
    }

    /// How long `open` and `focus` wait for their acknowledgement.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn post(&self, message: &BrokerMessage) -> Result<(), BrokerError> {
        if self.broker.post_message(message, self.broker.origin(), &self.port) {
            Ok(())
        } else {
            Err(BrokerError::Disconnected)
        }
    }

    /// First broker reply accepted by `matches`, looking at replies held
    /// back by earlier waiters before reading the inbox. Replies that do
    /// not match are kept for later waiters.
    async fn await_reply<F>(
        &self,
        timeout: Duration,
        matches: F,
    ) -> Result<BrokerMessage, BrokerError>
    where
        F: Fn(&BrokerMessage) -> bool,
    {
        let mut inbox = self.inbox.lock().await;
        let Inbox { rx, pending } = &mut *inbox;

        if let Some(index) = pending.iter().position(&matches) {
            if let Some(reply) = pending.remove(index) {
                return Ok(reply);
            }
        }

        let wait = async {
            while let Some(posted) = rx.recv().await {
                if posted.origin != self.broker.origin() {
                    debug!(origin = %posted.origin, "Discarding reply from unexpected origin");
                    continue;
                }
                match BrokerMessage::parse(&posted.data) {
                    Some(reply) if matches(&reply) => return Ok(reply),
                    Some(reply) => {
                        trace!(reply = ?reply, "Holding reply for a later waiter");
                        if pending.len() == PENDING_LIMIT {
                            pending.pop_front();
                        }
                        pending.push_back(reply);
                    }
                    None => trace!("Skipping unrecognised message"),
                }
            }
            Err(BrokerError::Disconnected)
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(BrokerError::Timeout))
    }

    async fn request_ack(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let Some(id) = message.request_id() else {
            return self.post(&message);
        };
        self.post(&message)?;
        let reply = self
            .await_reply(self.request_timeout, |reply| {
                matches!(reply, BrokerMessage::Ack { id: reply_id, .. } if *reply_id == id)
            })
            .await?;
        match reply {
            BrokerMessage::Ack { ok: true, .. } => Ok(()),
            _ => Err(BrokerError::Refused),
        }
    }

    pub async fn open(&self, name: &str, url: &str) -> Result<(), BrokerError> {
        let message = BrokerMessage::Open {
            name: name.to_string(),
            url: url.to_string(),
            id: Some(self.next_id()),
        };
        self.request_ack(message).await
    }

    pub async fn focus(&self, name: &str) -> Result<(), BrokerError> {
        let message = BrokerMessage::Focus {
            name: name.to_string(),
            id: Some(self.next_id()),
        };
        self.request_ack(message).await
    }

    /// One ping. A `pong` without an id (older brokers) also counts.
    pub async fn ping(&self, timeout: Duration) -> Result<(), BrokerError> {
        let id = self.next_id();
        self.post(&BrokerMessage::Ping { id: Some(id) })?;
        self.await_reply(timeout, |reply| match reply {
            BrokerMessage::Pong { id: None } => true,
            BrokerMessage::Pong { id: Some(reply_id) } => *reply_id == id,
            _ => false,
        })
        .await
        .map(|_| ())
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.await_reply(timeout, |reply| *reply == BrokerMessage::Ready)
            .await
            .map(|_| ())
    }

    /// Ping every `interval` until a pong arrives. Gives up quietly after
    /// `max_attempts` and returns `false`.
    pub async fn ping_until_pong(&self, policy: RetryPolicy) -> bool {
        for attempt in 1..=policy.max_attempts {
            match self.ping(policy.interval).await {
                Ok(()) => {
                    debug!(attempt, "Broker answered ping");
                    return true;
                }
                Err(BrokerError::Disconnected) => return false,
                Err(e) => trace!(attempt, error = %e, "Ping unanswered"),
            }
        }
        debug!(attempts = policy.max_attempts, "Broker never answered, giving up");
        false
    }
}
