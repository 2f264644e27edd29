//! Same-origin broker over a named broadcast channel.
//!
//! Every participant on the bus sees every message except its own, like a
//! browser `BroadcastChannel`. No origin check is needed because a bus is
//! only shared between pages of one origin.

use super::client::BrokerError;
use super::cross_origin::BrokerHandle;
use super::message::BrokerMessage;
use crate::config::BrokerConfig;
use crate::tabs::{OpenStrategy, TabOpener, WindowHost};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Envelope {
    sender: u64,
    data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct BroadcastBus {
    origin: String,
    name: String,
    tx: broadcast::Sender<Envelope>,
    next_endpoint: Arc<AtomicU64>,
}

impl BroadcastBus {
    pub fn new(origin: &str, name: &str) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        BroadcastBus {
            origin: origin.to_string(),
            name: name.to_string(),
            tx,
            next_endpoint: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The bus named by `config.bus_name` for pages of `origin`.
    pub fn from_config(origin: &str, config: &BrokerConfig) -> Self {
        Self::new(origin, &config.bus_name)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join the bus. Only messages posted after this call are received.
    pub fn endpoint(&self) -> BusEndpoint {
        BusEndpoint {
            id: self.next_endpoint.fetch_add(1, Ordering::SeqCst),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

pub struct BusEndpoint {
    id: u64,
    tx: broadcast::Sender<Envelope>,
    rx: broadcast::Receiver<Envelope>,
}

impl BusEndpoint {
    pub fn post(&self, message: &BrokerMessage) {
        let envelope = Envelope {
            sender: self.id,
            data: message.to_value(),
        };
        // Err only means nobody else is listening right now.
        if self.tx.send(envelope).is_err() {
            debug!("Bus message had no listeners");
        }
    }

    /// Post a request carrying an id and wait for its `ack` (or `pong` for
    /// a ping). Requests without an id are only posted.
    pub async fn request(
        &mut self,
        message: &BrokerMessage,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        let Some(id) = message.request_id() else {
            self.post(message);
            return Ok(());
        };
        self.post(message);

        let wait = async {
            while let Some(data) = self.recv().await {
                match BrokerMessage::parse(&data) {
                    Some(BrokerMessage::Ack { id: reply_id, ok }) if reply_id == id => {
                        return if ok { Ok(()) } else { Err(BrokerError::Refused) };
                    }
                    Some(BrokerMessage::Pong { id: Some(reply_id) }) if reply_id == id => {
                        return Ok(());
                    }
                    _ => {}
                }
            }
            Err(BrokerError::Disconnected)
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(BrokerError::Timeout))
    }

    /// Next message from another participant; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.sender == self.id => continue,
                Ok(envelope) => return Some(envelope.data),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Bus listener lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

pub struct BusBroker<H> {
    opener: TabOpener<H>,
    endpoint: BusEndpoint,
}

impl<H: WindowHost> BusBroker<H> {
    pub fn new(bus: &BroadcastBus, host: H) -> Self {
        BusBroker {
            opener: TabOpener::new(host, OpenStrategy::LookupThenReplace),
            endpoint: bus.endpoint(),
        }
    }

    fn handle(&self, data: &serde_json::Value) {
        let Some(request) = BrokerMessage::parse(data) else {
            debug!("Ignoring unrecognised bus message");
            return;
        };
        match request {
            BrokerMessage::Ping { id } => self.endpoint.post(&BrokerMessage::Pong { id }),
            BrokerMessage::Open { name, url, id } => {
                let ok = !name.is_empty() && !url.is_empty();
                if ok {
                    self.opener.open_named(&url, &name);
                }
                if let Some(id) = id {
                    self.endpoint.post(&BrokerMessage::Ack { id, ok });
                }
            }
            BrokerMessage::Focus { name, id } => {
                let ok = !name.is_empty();
                if ok {
                    self.opener.focus_named(&name);
                }
                if let Some(id) = id {
                    self.endpoint.post(&BrokerMessage::Ack { id, ok });
                }
            }
            BrokerMessage::Pong { .. } | BrokerMessage::Ready | BrokerMessage::Ack { .. } => {}
        }
    }

    /// Announce `ready`, then serve the bus until cancelled.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        info!("Bus broker listening");
        self.endpoint.post(&BrokerMessage::Ready);
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                data = self.endpoint.recv() => match data {
                    Some(data) => self.handle(&data),
                    None => break,
                },
            }
        }
        debug!("Bus broker stopped");
    }
}

/// Serve the bus on a background task until the handle is cancelled.
pub fn spawn_bus_broker<H>(broker: BusBroker<H>) -> BrokerHandle
where
    H: WindowHost + 'static,
{
    let cancel_token = CancellationToken::new();
    let handle = tokio::spawn(broker.run(cancel_token.clone()));
    BrokerHandle::new(handle, cancel_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::TabRegistry;

    async fn next_message(endpoint: &mut BusEndpoint) -> Option<BrokerMessage> {
        let data = tokio::time::timeout(Duration::from_secs(1), endpoint.recv())
            .await
            .ok()??;
        BrokerMessage::parse(&data)
    }

    #[tokio::test]
    async fn test_endpoint_does_not_hear_itself() {
        let bus = BroadcastBus::new("https://poromagia.com", "cardlink-broker");
        let mut a = bus.endpoint();
        let mut b = bus.endpoint();

        a.post(&BrokerMessage::Ping { id: Some(1) });
        assert_eq!(next_message(&mut b).await, Some(BrokerMessage::Ping { id: Some(1) }));
        let own = tokio::time::timeout(Duration::from_millis(50), a.recv()).await;
        assert!(own.is_err());
    }

    #[tokio::test]
    async fn test_request_waits_for_matching_ack() {
        let config = BrokerConfig::default();
        let bus = BroadcastBus::from_config("https://poromagia.com", &config);
        assert_eq!(bus.name(), "cardlink-broker");

        let mut page = bus.endpoint();
        let registry = TabRegistry::new();
        let handle = spawn_bus_broker(BusBroker::new(&bus, registry.clone()));

        let open = BrokerMessage::Open {
            name: "MCMWindow".to_string(),
            url: "https://www.cardmarket.com/x".to_string(),
            id: Some(1),
        };
        page.request(&open, config.request_timeout()).await.unwrap();
        assert_eq!(
            registry.current_url("MCMWindow").as_deref(),
            Some("https://www.cardmarket.com/x")
        );

        let focus = BrokerMessage::Focus {
            name: String::new(),
            id: Some(2),
        };
        assert_eq!(
            page.request(&focus, config.request_timeout()).await,
            Err(BrokerError::Refused)
        );

        handle.cancel();
        handle.wait_for_completion().await;
        assert_eq!(
            page.request(&BrokerMessage::Ping { id: Some(3) }, Duration::from_millis(50)).await,
            Err(BrokerError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_bus_broker_serves_requests() {
        let bus = BroadcastBus::new("https://poromagia.com", "cardlink-broker");
        let mut page = bus.endpoint();
        let registry = TabRegistry::new();
        let broker = BusBroker::new(&bus, registry.clone());
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(broker.run(cancel_token.clone()));

        assert_eq!(next_message(&mut page).await, Some(BrokerMessage::Ready));

        page.post(&BrokerMessage::Ping { id: Some(3) });
        assert_eq!(next_message(&mut page).await, Some(BrokerMessage::Pong { id: Some(3) }));

        page.post(&BrokerMessage::Open {
            name: "TCGWindow".to_string(),
            url: "https://www.tcgplayer.com/product/1".to_string(),
            id: Some(4),
        });
        assert_eq!(
            next_message(&mut page).await,
            Some(BrokerMessage::Ack { id: 4, ok: true })
        );
        assert_eq!(
            registry.current_url("TCGWindow").as_deref(),
            Some("https://www.tcgplayer.com/product/1")
        );

        page.post(&BrokerMessage::Focus {
            name: String::new(),
            id: Some(5),
        });
        assert_eq!(
            next_message(&mut page).await,
            Some(BrokerMessage::Ack { id: 5, ok: false })
        );

        cancel_token.cancel();
        task.await.unwrap();
    }
}
