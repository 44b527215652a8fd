use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use ws_interceptor::{
    CloseRequest, ConnectOptions, EventEmitter, EventKind, Listener, MessageType, SocketId,
    Subscription, Transport, TransportEvent,
};

/// Status reported when the peer closes without a status code.
const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug, Error)]
pub enum TungsteniteTransportError {
    #[error("socket {0} is already connected")]
    DuplicateSocket(SocketId),

    #[error("socket {0} is not connected")]
    UnknownSocket(SocketId),

    #[error("binary payload is not valid base64: {0}")]
    InvalidBinary(#[from] base64::DecodeError),

    #[error("invalid connect request: {0}")]
    InvalidRequest(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Outbound work queued for a connection task.
#[derive(Debug)]
enum Command {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

type SocketTable = Arc<Mutex<HashMap<SocketId, mpsc::UnboundedSender<Command>>>>;

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// Every connection runs in its own task on the runtime captured at
/// construction. Calls only enqueue work for that task, so they never block;
/// the outcome of each connection is reported through the event stream.
pub struct TungsteniteTransport {
    runtime: Handle,
    events: EventEmitter,
    sockets: SocketTable,
}

impl TungsteniteTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            events: EventEmitter::new(),
            sockets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn command(
        &self,
        socket_id: SocketId,
        command: Command,
    ) -> Result<(), TungsteniteTransportError> {
        let sockets = self.sockets.lock();
        let tx = sockets
            .get(&socket_id)
            .ok_or(TungsteniteTransportError::UnknownSocket(socket_id))?;
        tx.send(command)
            .map_err(|_| TungsteniteTransportError::UnknownSocket(socket_id))
    }
}

impl Transport for TungsteniteTransport {
    type Error = TungsteniteTransportError;

    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectOptions,
        socket_id: SocketId,
    ) -> Result<(), Self::Error> {
        let request = build_request(url, protocols, options)?;

        let rx = {
            let mut sockets = self.sockets.lock();
            if sockets.contains_key(&socket_id) {
                return Err(TungsteniteTransportError::DuplicateSocket(socket_id));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            sockets.insert(socket_id, tx);
            rx
        };

        tracing::debug!(%socket_id, %url, "spawning connection task");
        self.runtime.spawn(run_socket(
            socket_id,
            request,
            rx,
            self.events.clone(),
            Arc::clone(&self.sockets),
        ));

        Ok(())
    }

    fn send(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error> {
        self.command(socket_id, Command::Text(data.to_string()))
    }

    fn send_binary(&self, data: &str, socket_id: SocketId) -> Result<(), Self::Error> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
        self.command(socket_id, Command::Binary(bytes))
    }

    fn close(&self, request: &CloseRequest) -> Result<(), Self::Error> {
        let frame = match request {
            CloseRequest::WithDetails { code, reason, .. } => Some(CloseFrame {
                code: CloseCode::from(*code),
                reason: reason.clone().into(),
            }),
            CloseRequest::Simple { .. } => None,
        };
        self.command(request.socket_id(), Command::Close(frame))
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.events.add_listener(kind, listener)
    }
}

/// Build the upgrade request, adding subprotocols and extra headers.
fn build_request(
    url: &str,
    protocols: &[String],
    options: &ConnectOptions,
) -> Result<Request, TungsteniteTransportError> {
    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();

    if !protocols.is_empty() {
        let joined = protocols.join(", ");
        let value = HeaderValue::from_str(&joined).map_err(|e| {
            TungsteniteTransportError::InvalidHeader {
                name: "Sec-WebSocket-Protocol".to_string(),
                reason: e.to_string(),
            }
        })?;
        headers.insert("Sec-WebSocket-Protocol", value);
    }

    for (name, value) in &options.headers {
        let invalid = |reason: String| TungsteniteTransportError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header_name, header_value);
    }

    Ok(request)
}

/// Drive one connection from handshake to close, reporting every lifecycle
/// step through `events`.
async fn run_socket(
    socket_id: SocketId,
    request: Request,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventEmitter,
    sockets: SocketTable,
) {
    let ws = match tokio_tungstenite::connect_async(request).await {
        Ok((ws, _response)) => ws,
        Err(err) => {
            sockets.lock().remove(&socket_id);
            tracing::debug!(%socket_id, %err, "handshake failed");
            events.emit(&TransportEvent::Failed {
                id: socket_id,
                message: err.to_string(),
            });
            return;
        }
    };

    events.emit(&TransportEvent::Open { id: socket_id });

    let (mut write, mut read) = ws.split();

    let outcome = loop {
        tokio::select! {
            command = commands.recv() => {
                let message = match command {
                    Some(Command::Text(text)) => Message::Text(text.into()),
                    Some(Command::Binary(bytes)) => Message::Binary(bytes.into()),
                    Some(Command::Close(frame)) => Message::Close(frame),
                    // Every sender is gone; nobody can address this socket.
                    None => break Ok(None),
                };
                if let Err(err) = write.send(message).await {
                    break Err(err);
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        events.emit(&TransportEvent::Message {
                            id: socket_id,
                            kind: MessageType::Text,
                            data: Some(text.to_string()),
                        });
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        events.emit(&TransportEvent::Message {
                            id: socket_id,
                            kind: MessageType::Binary,
                            data: Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
                        });
                    }
                    Some(Ok(Message::Close(frame))) => break Ok(frame),
                    // Ping, pong and raw frames are handled by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Err(err),
                    None => break Ok(None),
                }
            }
        }
    };

    sockets.lock().remove(&socket_id);

    match outcome {
        Ok(frame) => {
            let (code, reason) = frame
                .map(|f| (u16::from(f.code), f.reason.to_string()))
                .unwrap_or((NO_STATUS_RECEIVED, String::new()));
            tracing::debug!(%socket_id, code, "connection closed");
            events.emit(&TransportEvent::Closed {
                id: socket_id,
                code,
                reason,
            });
        }
        Err(err) => {
            tracing::debug!(%socket_id, %err, "connection failed");
            events.emit(&TransportEvent::Failed {
                id: socket_id,
                message: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_protocols_and_headers() {
        let mut options = ConnectOptions::default();
        options
            .headers
            .insert("Authorization".to_string(), "Bearer abc".to_string());

        let request = build_request(
            "ws://127.0.0.1:9000/ws",
            &["v12.stomp".to_string(), "v11.stomp".to_string()],
            &options,
        )
        .unwrap();

        assert_eq!(
            request.headers()["Sec-WebSocket-Protocol"],
            "v12.stomp, v11.stomp"
        );
        assert_eq!(request.headers()["Authorization"], "Bearer abc");
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut options = ConnectOptions::default();
        options
            .headers
            .insert("bad header".to_string(), "x".to_string());

        let err = build_request("ws://127.0.0.1:9000", &[], &options).unwrap_err();
        assert!(matches!(
            err,
            TungsteniteTransportError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = build_request("not a url", &[], &ConnectOptions::default()).unwrap_err();
        assert!(matches!(err, TungsteniteTransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn calls_on_unknown_socket_fail() {
        let transport = TungsteniteTransport::new(Handle::current());

        assert!(matches!(
            transport.send("x", SocketId(1)),
            Err(TungsteniteTransportError::UnknownSocket(SocketId(1)))
        ));
        assert!(matches!(
            transport.close(&CloseRequest::Simple {
                socket_id: SocketId(1)
            }),
            Err(TungsteniteTransportError::UnknownSocket(_))
        ));
        assert!(matches!(
            transport.send_binary("%%%", SocketId(1)),
            Err(TungsteniteTransportError::InvalidBinary(_))
        ));
    }

    #[tokio::test]
    async fn failed_handshake_is_reported_as_event() {
        // Bind then drop a listener to get a port nobody is listening on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TungsteniteTransport::new(Handle::current());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = transport.add_listener(
            EventKind::Failed,
            Arc::new(move |event: &TransportEvent| {
                let _ = tx.send(event.clone());
            }),
        );

        transport
            .connect(
                &format!("ws://{addr}"),
                &[],
                &ConnectOptions::default(),
                SocketId(9),
            )
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.socket_id(), SocketId(9));
        assert!(matches!(event, TransportEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn duplicate_socket_ids_are_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{addr}");

        let transport = TungsteniteTransport::new(Handle::current());
        transport
            .connect(&url, &[], &ConnectOptions::default(), SocketId(1))
            .unwrap();

        assert!(matches!(
            transport.connect(&url, &[], &ConnectOptions::default(), SocketId(1)),
            Err(TungsteniteTransportError::DuplicateSocket(SocketId(1)))
        ));
    }
}
