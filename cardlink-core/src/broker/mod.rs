//! Relaying named-tab operations between pages.
//!
//! [`CrossOriginBroker`] serves `postMessage` requests from trusted origins,
//! [`BusBroker`] does the same over a same-origin broadcast channel, and
//! [`BrokerClient`] is the requesting side with correlated acknowledgements.

pub mod bus;
pub mod client;
pub mod cross_origin;
pub mod message;
pub mod origin;
pub mod port;

pub use bus::{BroadcastBus, BusBroker, BusEndpoint, spawn_bus_broker};
pub use client::{BrokerClient, BrokerError, RetryPolicy};
pub use cross_origin::{BrokerHandle, CrossOriginBroker, Disposition, spawn_cross_origin_broker};
pub use message::BrokerMessage;
pub use origin::OriginPolicy;
pub use port::{PostedMessage, WindowPort};
