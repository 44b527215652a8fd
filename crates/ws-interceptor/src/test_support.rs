//! In-memory transport used by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::events::{EventEmitter, EventKind, Listener, Subscription};
use crate::transport::{CloseRequest, ConnectOptions, SocketId, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect {
        url: String,
        protocols: Vec<String>,
        options: ConnectOptions,
        socket_id: SocketId,
    },
    Send {
        data: String,
        socket_id: SocketId,
    },
    SendBinary {
        data: String,
        socket_id: SocketId,
    },
    Close(CloseRequest),
}

#[derive(Debug, thiserror::Error)]
#[error("transport rejected the call")]
pub struct Rejected;

/// Records every call it receives and lets tests emit events by hand.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    events: EventEmitter,
    reject: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn emit(&self, event: TransportEvent) {
        self.events.emit(&event);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.listener_count(kind)
    }

    /// Make every subsequent call fail after being recorded.
    pub fn reject_calls(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    fn record(&self, call: Call) -> Result<(), Rejected> {
        self.calls.lock().push(call);
        if self.reject.load(Ordering::SeqCst) {
            Err(Rejected)
        } else {
            Ok(())
        }
    }
}

impl Transport for RecordingTransport {
    type Error = Rejected;

    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectOptions,
        socket_id: SocketId,
    ) -> Result<(), Rejected> {
        self.record(Call::Connect {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            options: options.clone(),
            socket_id,
        })
    }

    fn send(&self, data: &str, socket_id: SocketId) -> Result<(), Rejected> {
        self.record(Call::Send {
            data: data.to_string(),
            socket_id,
        })
    }

    fn send_binary(&self, data: &str, socket_id: SocketId) -> Result<(), Rejected> {
        self.record(Call::SendBinary {
            data: data.to_string(),
            socket_id,
        })
    }

    fn close(&self, request: &CloseRequest) -> Result<(), Rejected> {
        self.record(Call::Close(request.clone()))
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.events.add_listener(kind, listener)
    }
}
