use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::transport::TransportEvent;

/// The four lifecycle events a transport reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Closed,
    Failed,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Message,
        EventKind::Open,
        EventKind::Closed,
        EventKind::Failed,
    ];

    /// The event name used by the native module.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Open => "websocketOpen",
            EventKind::Message => "websocketMessage",
            EventKind::Closed => "websocketClosed",
            EventKind::Failed => "websocketFailed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback registered for one kind of event.
pub type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Registration>,
}

/// Thread-safe listener registry that transports embed to publish their
/// lifecycle events.
///
/// Listeners run synchronously on the thread calling [`emit`](Self::emit),
/// in registration order. The registry lock is released before any listener
/// runs, so a listener may freely add or remove subscriptions.
#[derive(Clone, Default)]
pub struct EventEmitter {
    registry: Arc<Mutex<Registry>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Registration { id, kind, listener });

        tracing::trace!(event = %kind, subscription = id, "listener added");

        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every listener registered for its kind.
    pub fn emit(&self, event: &TransportEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .registry
            .lock()
            .entries
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Number of live subscriptions for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .entries
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventEmitter")
            .field("listeners", &registry.entries.len())
            .finish()
    }
}

/// Handle to a registered listener.
///
/// The listener stays registered for as long as the handle is alive;
/// [`remove`](Self::remove) or dropping the handle cancels it. Cancelling
/// after the emitter itself is gone is a no-op.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Cancel the subscription.
    pub fn remove(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().entries.retain(|r| r.id != self.id);
            tracing::trace!(event = %self.kind, subscription = self.id, "listener removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
