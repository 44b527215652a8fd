//! Observer callbacks that turn intercepted traffic into `tracing` events and
//! traffic-log entries.

use serde_json::json;
use traffic_log::{TrafficEntry, TrafficEventType, TrafficSink};
use ws_interceptor::{Interceptor, Transport};

/// Register a callback in every slot of `interceptor`.
///
/// Each callback emits one structured `tracing` event and, when a sink is
/// given, records the same information to the traffic log.
pub fn install<T: Transport>(interceptor: &Interceptor<T>, sink: Option<TrafficSink>) {
    let s = sink.clone();
    interceptor.set_connect_callback(move |url, protocols, options, socket_id| {
        tracing::info!(%socket_id, %url, ?protocols, headers = options.headers.len(), "connect");
        record(
            &s,
            TrafficEntry::new(
                TrafficEventType::Connect,
                json!({
                    "url": url,
                    "protocols": protocols,
                    "headers": options.headers.keys().collect::<Vec<_>>(),
                }),
            )
            .with_socket(socket_id.0),
        );
    });

    let s = sink.clone();
    interceptor.set_send_callback(move |data, socket_id| {
        tracing::info!(%socket_id, %data, "send");
        record(
            &s,
            TrafficEntry::new(TrafficEventType::Send, json!({ "data": data }))
                .with_socket(socket_id.0),
        );
    });

    let s = sink.clone();
    interceptor.set_close_callback(move |code, reason, socket_id| {
        tracing::info!(%socket_id, ?code, ?reason, "close");
        record(
            &s,
            TrafficEntry::new(
                TrafficEventType::Close,
                json!({ "code": code, "reason": reason }),
            )
            .with_socket(socket_id.0),
        );
    });

    let s = sink.clone();
    interceptor.set_on_open_callback(move |socket_id| {
        tracing::info!(%socket_id, "open");
        record(
            &s,
            TrafficEntry::new(TrafficEventType::Open, json!({})).with_socket(socket_id.0),
        );
    });

    let s = sink.clone();
    interceptor.set_on_message_callback(move |socket_id, data| {
        tracing::info!(%socket_id, %data, "message");
        record(
            &s,
            TrafficEntry::new(TrafficEventType::Message, json!({ "data": data }))
                .with_socket(socket_id.0),
        );
    });

    let s = sink.clone();
    interceptor.set_on_error_callback(move |socket_id, info| {
        tracing::warn!(%socket_id, message = %info.message, "error");
        record(
            &s,
            TrafficEntry::new(TrafficEventType::Error, json!({ "message": info.message }))
                .with_socket(socket_id.0),
        );
    });

    interceptor.set_on_close_callback(move |socket_id, info| {
        tracing::info!(%socket_id, code = info.code, reason = %info.reason, "closed");
        record(
            &sink,
            TrafficEntry::new(
                TrafficEventType::Closed,
                json!({ "code": info.code, "reason": info.reason }),
            )
            .with_socket(socket_id.0),
        );
    });
}

fn record(sink: &Option<TrafficSink>, entry: TrafficEntry) {
    if let Some(sink) = sink {
        sink.record(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ws_interceptor::{
        CloseRequest, ConnectOptions, EventEmitter, EventKind, Listener, MessageType, SocketId,
        Subscription, TransportEvent,
    };

    /// Transport that accepts every call and lets the test emit events.
    #[derive(Default)]
    struct NullTransport {
        events: EventEmitter,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("unreachable")]
    struct Never;

    impl Transport for NullTransport {
        type Error = Never;

        fn connect(
            &self,
            _url: &str,
            _protocols: &[String],
            _options: &ConnectOptions,
            _socket_id: SocketId,
        ) -> Result<(), Never> {
            Ok(())
        }

        fn send(&self, _data: &str, _socket_id: SocketId) -> Result<(), Never> {
            Ok(())
        }

        fn send_binary(&self, _data: &str, _socket_id: SocketId) -> Result<(), Never> {
            Ok(())
        }

        fn close(&self, _request: &CloseRequest) -> Result<(), Never> {
            Ok(())
        }

        fn add_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
            self.events.add_listener(kind, listener)
        }
    }

    #[tokio::test]
    async fn every_slot_is_recorded_to_the_traffic_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.jsonl");
        let (sink, handle) = TrafficSink::start(&path).await.unwrap();

        let transport = Arc::new(NullTransport::default());
        let interceptor = Interceptor::new(Arc::clone(&transport));
        install(&interceptor, Some(sink));
        interceptor.enable_interception();

        let id = SocketId(3);
        interceptor
            .connect("ws://localhost:9000", &[], &ConnectOptions::default(), id)
            .unwrap();
        transport.events.emit(&TransportEvent::Open { id });
        interceptor.send("hello", id).unwrap();
        interceptor.send_binary("AAEC", id).unwrap();
        transport.events.emit(&TransportEvent::Message {
            id,
            kind: MessageType::Binary,
            data: Some("QQ==".to_string()),
        });
        transport.events.emit(&TransportEvent::Failed {
            id,
            message: "reset".to_string(),
        });
        interceptor
            .close(&CloseRequest::WithDetails {
                code: 1000,
                reason: "bye".to_string(),
                socket_id: id,
            })
            .unwrap();
        transport.events.emit(&TransportEvent::Closed {
            id,
            code: 1000,
            reason: "bye".to_string(),
        });

        // Disabling clears the callbacks, releasing every sink clone.
        interceptor.disable_interception();
        handle.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let entries: Vec<TrafficEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        let types: Vec<TrafficEventType> = entries.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                TrafficEventType::Connect,
                TrafficEventType::Open,
                TrafficEventType::Send,
                TrafficEventType::Send,
                TrafficEventType::Message,
                TrafficEventType::Error,
                TrafficEventType::Close,
                TrafficEventType::Closed,
            ]
        );
        assert!(entries.iter().all(|e| e.socket_id == Some(3)));
        assert_eq!(entries[3].details["data"], "ArrayBuffer {0,1,2}");
        assert_eq!(entries[4].details["data"], "ArrayBuffer {65}");
        assert_eq!(entries[6].details["code"], 1000);
        assert_eq!(entries[6].details["reason"], "bye");
    }
}
