use serde::{Deserialize, Serialize};

/// A single record of intercepted WebSocket traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: TrafficEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<u64>,
    pub details: serde_json::Value,
}

impl TrafficEntry {
    /// Create a new `TrafficEntry` with an auto-generated UUID v4 and the
    /// current UTC timestamp. `socket_id` defaults to `None`.
    pub fn new(event_type: TrafficEventType, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            socket_id: None,
            details,
        }
    }

    /// Attach the connection the entry belongs to, consuming and returning
    /// `self` for builder-style usage.
    pub fn with_socket(mut self, socket_id: u64) -> Self {
        self.socket_id = Some(socket_id);
        self
    }
}

/// The kind of traffic being recorded.
///
/// `Connect`, `Send` and `Close` are outbound calls; `Open`, `Message`,
/// `Error` and `Closed` are events reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficEventType {
    SessionStarted,
    SessionStopped,
    Connect,
    Send,
    Close,
    Open,
    Message,
    Error,
    Closed,
}
