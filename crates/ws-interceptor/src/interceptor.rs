use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::events::{EventKind, Listener, Subscription};
use crate::render::{render_binary_lossy, NO_VALUE};
use crate::transport::{
    CloseRequest, ConnectOptions, MessageType, SocketId, Transport, TransportEvent,
};

/// Details of a `websocketClosed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Details of a `websocketFailed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
}

type ConnectCallback = Arc<dyn Fn(&str, &[String], &ConnectOptions, SocketId) + Send + Sync>;
type SendCallback = Arc<dyn Fn(&str, SocketId) + Send + Sync>;
type CloseCallback = Arc<dyn Fn(Option<u16>, Option<&str>, SocketId) + Send + Sync>;
type OpenCallback = Arc<dyn Fn(SocketId) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(SocketId, &str) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(SocketId, &ErrorInfo) + Send + Sync>;
type ClosedCallback = Arc<dyn Fn(SocketId, &CloseInfo) + Send + Sync>;

/// The registered-callback table. Every slot is independent and optional.
#[derive(Default)]
struct Callbacks {
    connect: Option<ConnectCallback>,
    send: Option<SendCallback>,
    close: Option<CloseCallback>,
    on_open: Option<OpenCallback>,
    on_message: Option<MessageCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<ClosedCallback>,
}

#[derive(Default)]
struct State {
    enabled: bool,
    subscriptions: Vec<Subscription>,
}

/// Observes a [`Transport`] without changing what it does.
///
/// The interceptor wraps the transport and implements [`Transport`] itself,
/// so it can stand in wherever the raw handle was used. While interception is
/// enabled, each outbound call first hands its arguments to the matching
/// observer callback and then delegates to the wrapped transport, returning
/// its result untouched. Lifecycle events are bridged from the transport to
/// the `on_*` callbacks through four subscriptions held for as long as
/// interception stays enabled.
///
/// While disabled every call goes straight to the wrapped transport.
///
/// Observer callbacks run synchronously on the calling (or emitting) thread.
/// A callback that panics is contained and logged; the delegated call still
/// runs.
pub struct Interceptor<T: Transport> {
    transport: Arc<T>,
    callbacks: Arc<RwLock<Callbacks>>,
    state: Mutex<State>,
}

impl<T: Transport> Interceptor<T> {
    /// Wrap `transport`. Interception starts disabled.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            callbacks: Arc::new(RwLock::new(Callbacks::default())),
            state: Mutex::new(State::default()),
        }
    }

    /// The wrapped transport, exactly as it was handed to [`new`](Self::new).
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Callback registration
    // -----------------------------------------------------------------------

    /// Invoked when `connect` is called.
    pub fn set_connect_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &[String], &ConnectOptions, SocketId) + Send + Sync + 'static,
    {
        self.callbacks.write().connect = Some(Arc::new(callback));
    }

    pub fn clear_connect_callback(&self) {
        self.callbacks.write().connect = None;
    }

    /// Invoked when `send` or `send_binary` is called. Binary payloads are
    /// passed in their printable rendering.
    pub fn set_send_callback<F>(&self, callback: F)
    where
        F: Fn(&str, SocketId) + Send + Sync + 'static,
    {
        self.callbacks.write().send = Some(Arc::new(callback));
    }

    pub fn clear_send_callback(&self) {
        self.callbacks.write().send = None;
    }

    /// Invoked when `close` is called. A [`CloseRequest::Simple`] call
    /// reports `None` for both code and reason.
    pub fn set_close_callback<F>(&self, callback: F)
    where
        F: Fn(Option<u16>, Option<&str>, SocketId) + Send + Sync + 'static,
    {
        self.callbacks.write().close = Some(Arc::new(callback));
    }

    pub fn clear_close_callback(&self) {
        self.callbacks.write().close = None;
    }

    /// Invoked on `websocketOpen`.
    pub fn set_on_open_callback<F>(&self, callback: F)
    where
        F: Fn(SocketId) + Send + Sync + 'static,
    {
        self.callbacks.write().on_open = Some(Arc::new(callback));
    }

    pub fn clear_on_open_callback(&self) {
        self.callbacks.write().on_open = None;
    }

    /// Invoked on `websocketMessage`.
    pub fn set_on_message_callback<F>(&self, callback: F)
    where
        F: Fn(SocketId, &str) + Send + Sync + 'static,
    {
        self.callbacks.write().on_message = Some(Arc::new(callback));
    }

    pub fn clear_on_message_callback(&self) {
        self.callbacks.write().on_message = None;
    }

    /// Invoked on `websocketFailed`.
    pub fn set_on_error_callback<F>(&self, callback: F)
    where
        F: Fn(SocketId, &ErrorInfo) + Send + Sync + 'static,
    {
        self.callbacks.write().on_error = Some(Arc::new(callback));
    }

    pub fn clear_on_error_callback(&self) {
        self.callbacks.write().on_error = None;
    }

    /// Invoked on `websocketClosed`.
    pub fn set_on_close_callback<F>(&self, callback: F)
    where
        F: Fn(SocketId, &CloseInfo) + Send + Sync + 'static,
    {
        self.callbacks.write().on_close = Some(Arc::new(callback));
    }

    pub fn clear_on_close_callback(&self) {
        self.callbacks.write().on_close = None;
    }

    // -----------------------------------------------------------------------
    // Enable / disable
    // -----------------------------------------------------------------------

    pub fn is_interceptor_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Start intercepting calls and bridging events. No-op when already
    /// enabled.
    pub fn enable_interception(&self) {
        let mut state = self.state.lock();
        if state.enabled {
            return;
        }

        state.subscriptions = self.register_events();
        state.enabled = true;

        tracing::debug!(
            subscriptions = state.subscriptions.len(),
            "websocket interception enabled"
        );
    }

    /// Stop intercepting, remove the event subscriptions and clear every
    /// callback slot. No-op when already disabled.
    pub fn disable_interception(&self) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }

        state.enabled = false;
        *self.callbacks.write() = Callbacks::default();

        for subscription in state.subscriptions.drain(..) {
            subscription.remove();
        }

        tracing::debug!("websocket interception disabled");
    }

    /// Subscribe to the four lifecycle events of the wrapped transport.
    fn register_events(&self) -> Vec<Subscription> {
        EventKind::ALL
            .iter()
            .map(|&kind| {
                let listener = bridge_listener(kind, Arc::clone(&self.callbacks));
                self.transport.add_listener(kind, listener)
            })
            .collect()
    }

    /// Clone a callback out of its slot if interception is enabled.
    fn active<C: Clone>(&self, pick: impl FnOnce(&Callbacks) -> &Option<C>) -> Option<C> {
        if !self.is_interceptor_enabled() {
            return None;
        }
        slot(&self.callbacks, pick)
    }
}

impl<T: Transport> Transport for Interceptor<T> {
    type Error = T::Error;

    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectOptions,
        socket_id: SocketId,
    ) -> Result<(), Self::Error> {
        if let Some(callback) = self.active(|c| &c.connect) {
            observe("connect", || callback(url, protocols, options, socket_id));
        }
        self.transport.connect(url, protocols, options, socket_id)
    }

    fn send(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error> {
        if let Some(callback) = self.active(|c| &c.send) {
            observe("send", || callback(data, socket_id));
        }
        self.transport.send(data, socket_id)
    }

    fn send_binary(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error> {
        if let Some(callback) = self.active(|c| &c.send) {
            let rendered = render_binary_lossy(Some(data));
            observe("send", || callback(&rendered, socket_id));
        }
        self.transport.send_binary(data, socket_id)
    }

    fn close(&self, request: &CloseRequest) -> Result<(), Self::Error> {
        if let Some(callback) = self.active(|c| &c.close) {
            observe("close", || match request {
                CloseRequest::WithDetails {
                    code,
                    reason,
                    socket_id,
                } => callback(Some(*code), Some(reason.as_str()), *socket_id),
                CloseRequest::Simple { socket_id } => callback(None, None, *socket_id),
            });
        }
        self.transport.close(request)
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.transport.add_listener(kind, listener)
    }
}

impl<T: Transport> fmt::Debug for Interceptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Interceptor")
            .field("enabled", &state.enabled)
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

/// Build the listener that relays one kind of event to its callback slot.
fn bridge_listener(kind: EventKind, callbacks: Arc<RwLock<Callbacks>>) -> Listener {
    match kind {
        EventKind::Message => Arc::new(move |event: &TransportEvent| {
            let TransportEvent::Message { id, kind, data } = event else {
                return;
            };
            let Some(callback) = slot(&callbacks, |c| &c.on_message) else {
                return;
            };
            let rendered = match (kind, data) {
                (MessageType::Binary, data) => render_binary_lossy(data.as_deref()),
                (MessageType::Text, Some(text)) => text.clone(),
                (MessageType::Text, None) => NO_VALUE.to_string(),
            };
            observe("on_message", || callback(*id, &rendered));
        }),
        EventKind::Open => Arc::new(move |event: &TransportEvent| {
            let TransportEvent::Open { id } = event else {
                return;
            };
            let Some(callback) = slot(&callbacks, |c| &c.on_open) else {
                return;
            };
            observe("on_open", || callback(*id));
        }),
        EventKind::Closed => Arc::new(move |event: &TransportEvent| {
            let TransportEvent::Closed { id, code, reason } = event else {
                return;
            };
            let Some(callback) = slot(&callbacks, |c| &c.on_close) else {
                return;
            };
            let info = CloseInfo {
                code: *code,
                reason: reason.clone(),
            };
            observe("on_close", || callback(*id, &info));
        }),
        EventKind::Failed => Arc::new(move |event: &TransportEvent| {
            let TransportEvent::Failed { id, message } = event else {
                return;
            };
            let Some(callback) = slot(&callbacks, |c| &c.on_error) else {
                return;
            };
            let info = ErrorInfo {
                message: message.clone(),
            };
            observe("on_error", || callback(*id, &info));
        }),
    }
}

/// Clone a callback out of the table. The read guard is released before the
/// caller invokes it, so callbacks may re-register slots or disable
/// interception.
fn slot<C: Clone>(
    callbacks: &RwLock<Callbacks>,
    pick: impl FnOnce(&Callbacks) -> &Option<C>,
) -> Option<C> {
    let guard = callbacks.read();
    pick(&*guard).clone()
}

/// Run an observer callback, containing any panic it raises.
fn observe(hook: &'static str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            hook,
            panic = panic_message(payload.as_ref()),
            "observer callback panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
