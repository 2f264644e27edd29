use serde::{Deserialize, Serialize};

/// Wire format shared by every broker flavour, e.g.
/// `{"type":"open","name":"MCMWindow","url":"https://...","id":3}`.
///
/// Requests may carry an `id`; the broker then answers with a `pong` or
/// `ack` echoing it. Requests without one are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BrokerMessage {
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Open {
        #[serde(default)]
        name: String,
        #[serde(default)]
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Focus {
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Ready,
    Ack {
        id: u64,
        ok: bool,
    },
}

impl BrokerMessage {
    pub fn parse(data: &serde_json::Value) -> Option<BrokerMessage> {
        BrokerMessage::deserialize(data).ok()
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Derived Serialize for this enum cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            BrokerMessage::Ping { id }
            | BrokerMessage::Pong { id }
            | BrokerMessage::Open { id, .. }
            | BrokerMessage::Focus { id, .. } => *id,
            BrokerMessage::Ack { id, .. } => Some(*id),
            BrokerMessage::Ready => None,
        }
    }
}
