use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::{EventKind, Listener, Subscription};

/// Identifier correlating calls and events to one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SocketId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Extra options supplied alongside a `connect` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Additional HTTP headers sent with the upgrade request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// The two accepted shapes of a `close` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseRequest {
    /// Close with an explicit status code and reason.
    WithDetails {
        code: u16,
        reason: String,
        socket_id: SocketId,
    },
    /// Close with the transport's default status.
    Simple { socket_id: SocketId },
}

impl CloseRequest {
    pub fn socket_id(&self) -> SocketId {
        match self {
            CloseRequest::WithDetails { socket_id, .. } | CloseRequest::Simple { socket_id } => {
                *socket_id
            }
        }
    }
}

/// Payload type of a `websocketMessage` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Binary,
}

/// Asynchronous notification emitted by a transport.
///
/// The serialized form uses the event names of the native module
/// (`websocketOpen`, `websocketMessage`, ...) as the `event` tag, leaving
/// `type` free for the message payload type. Binary payloads travel as
/// base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TransportEvent {
    #[serde(rename = "websocketOpen")]
    Open { id: SocketId },

    #[serde(rename = "websocketMessage")]
    Message {
        id: SocketId,
        #[serde(rename = "type")]
        kind: MessageType,
        #[serde(default)]
        data: Option<String>,
    },

    #[serde(rename = "websocketClosed")]
    Closed {
        id: SocketId,
        code: u16,
        #[serde(default)]
        reason: String,
    },

    #[serde(rename = "websocketFailed")]
    Failed { id: SocketId, message: String },
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Open { .. } => EventKind::Open,
            TransportEvent::Message { .. } => EventKind::Message,
            TransportEvent::Closed { .. } => EventKind::Closed,
            TransportEvent::Failed { .. } => EventKind::Failed,
        }
    }

    pub fn socket_id(&self) -> SocketId {
        match self {
            TransportEvent::Open { id }
            | TransportEvent::Message { id, .. }
            | TransportEvent::Closed { id, .. }
            | TransportEvent::Failed { id, .. } => *id,
        }
    }
}

/// The raw WebSocket capability being observed.
///
/// Implementors own connection establishment, framing and error recovery.
/// Every operation is fire-and-forget from the caller's point of view: the
/// outcome of a connection is reported later through the event stream.
///
/// The trait is synchronous so that a wrapper can run its observer before
/// delegating without introducing an await point between the two.
pub trait Transport: Send + Sync {
    /// Error returned when the transport rejects a call outright.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection identified by `socket_id`.
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectOptions,
        socket_id: SocketId,
    ) -> Result<(), Self::Error>;

    /// Send a text frame.
    fn send(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error>;

    /// Send a binary frame. `data` is the base64 encoding of the payload.
    fn send_binary(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error>;

    /// Start the closing handshake for a connection.
    fn close(&self, request: &CloseRequest) -> Result<(), Self::Error>;

    /// Subscribe to one kind of lifecycle event.
    fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription;
}
