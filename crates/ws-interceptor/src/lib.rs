//! Observation shim for WebSocket transports.
//!
//! This crate lets an inspector watch the traffic of a WebSocket transport
//! without altering what the transport does. An [`Interceptor`] wraps any
//! [`Transport`] and
//!
//! - reports every `connect`, `send`, `send_binary` and `close` call to a
//!   registered observer callback before delegating to the real transport,
//! - bridges the transport's lifecycle events (`websocketOpen`,
//!   `websocketMessage`, `websocketFailed`, `websocketClosed`) to observer
//!   callbacks, rendering binary payloads in printable form.
//!
//! # Architecture
//!
//! ```text
//! caller --call--> Interceptor --call--> Transport
//!                      |                     |
//!                 [callbacks] <--events------+
//! ```
//!
//! Interception is toggled with [`Interceptor::enable_interception`] and
//! [`Interceptor::disable_interception`]. Disabling clears every registered
//! callback.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ws_interceptor::{Interceptor, SocketId, Transport};
//!
//! let interceptor = Interceptor::new(Arc::new(my_transport));
//! interceptor.set_send_callback(|data, id| println!("socket {id} <- {data}"));
//! interceptor.enable_interception();
//!
//! interceptor.send("hello", SocketId(1))?;
//! ```

pub mod events;
pub mod interceptor;
pub mod render;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the primary public types at the crate root for convenience.
pub use events::{EventEmitter, EventKind, Listener, Subscription};
pub use interceptor::{CloseInfo, ErrorInfo, Interceptor};
pub use render::{render_binary, render_binary_lossy, render_bytes, RenderError, NO_VALUE};
pub use transport::{
    CloseRequest, ConnectOptions, MessageType, SocketId, Transport, TransportEvent,
};
