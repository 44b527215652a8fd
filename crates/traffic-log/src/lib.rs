//! Append-only JSON-lines log of intercepted WebSocket traffic.
//!
//! Every observed call or event becomes one newline-terminated JSON object,
//! so a session can be replayed or grepped after the fact.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use traffic_log::{TrafficEntry, TrafficEventType, TrafficSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = TrafficSink::start("traffic.jsonl").await?;
//!
//! sink.record(
//!     TrafficEntry::new(TrafficEventType::Message, serde_json::json!({"data": "hi"}))
//!         .with_socket(1),
//! );
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

pub use entry::{TrafficEntry, TrafficEventType};
pub use sink::TrafficSink;
pub use writer::{TrafficWriteError, TrafficWriter};
