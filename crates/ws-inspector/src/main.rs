mod cli;
mod config;
mod observer;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use traffic_log::{TrafficEntry, TrafficEventType, TrafficSink};
use ws_interceptor::{
    CloseRequest, ConnectOptions, EventKind, Interceptor, SocketId, Transport, TransportEvent,
};

use crate::cli::Cli;
use crate::transport::TungsteniteTransport;

/// The inspector drives a single connection.
const SOCKET_ID: SocketId = SocketId(1);

/// Stdin lines starting with this prefix are sent as binary frames.
const BINARY_PREFIX: &str = "!b64 ";

/// How long to wait for the peer to acknowledge our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the stdin loop stopped.
#[derive(Debug)]
enum Exit {
    /// Stdin reached end of file.
    Eof,
    /// SIGINT was received.
    Interrupted,
    /// The connection closed or failed on its own.
    Disconnected,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();

    if let Some(ref url) = cli.url {
        cfg.target.url = Some(url.clone());
    }
    if !cli.protocols.is_empty() {
        cfg.target.protocols = cli.protocols.clone();
    }
    for raw in &cli.headers {
        let (name, value) = config::parse_header(raw)?;
        cfg.target.headers.insert(name, value);
    }
    if let Some(ref path) = cli.traffic_log {
        cfg.logging.traffic_log_path = path.clone();
    }
    if let Some(ref level) = cli.log_level {
        cfg.logging.level = level.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    let url = cfg
        .target
        .url
        .clone()
        .context("no target url given (use --url or target.url in the config file)")?;

    info!(
        config_file = %cli.config.display(),
        %url,
        protocols = ?cfg.target.protocols,
        traffic_log = %cfg.logging.traffic_log_path.display(),
        "ws-inspector starting"
    );

    // 4. Start the traffic log.
    let (sink, sink_handle) = TrafficSink::start(&cfg.logging.traffic_log_path)
        .await
        .context("failed to start traffic log")?;

    sink.log(TrafficEntry::new(
        TrafficEventType::SessionStarted,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "url": url,
        }),
    ))
    .await;

    // 5. Wrap the transport and install the observers.
    let transport = Arc::new(TungsteniteTransport::new(tokio::runtime::Handle::current()));
    let interceptor = Interceptor::new(transport);
    observer::install(&interceptor, Some(sink.clone()));
    interceptor.enable_interception();

    // Learn when the connection ends, independently of the observers.
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<()>();
    let _ended_subscriptions: Vec<_> = [EventKind::Closed, EventKind::Failed]
        .into_iter()
        .map(|kind| {
            let tx = ended_tx.clone();
            interceptor.add_listener(
                kind,
                Arc::new(move |event: &TransportEvent| {
                    if event.socket_id() == SOCKET_ID {
                        let _ = tx.send(());
                    }
                }),
            )
        })
        .collect();

    // 6. Connect.
    let options = ConnectOptions {
        headers: cfg.target.headers.clone(),
    };
    interceptor
        .connect(&url, &cfg.target.protocols, &options, SOCKET_ID)
        .context("failed to start connection")?;

    // 7. Forward stdin lines until EOF, ctrl-c or disconnect.
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    let exit = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => send_line(&interceptor, &line),
                    Ok(None) => break Exit::Eof,
                    Err(err) => {
                        warn!(%err, "failed to read stdin");
                        break Exit::Eof;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT (ctrl-c)");
                break Exit::Interrupted;
            }
            _ = ended_rx.recv() => break Exit::Disconnected,
        }
    };

    info!(?exit, "input loop finished");

    // 8. Close our side if the connection is still up.
    if !matches!(exit, Exit::Disconnected) {
        let request = CloseRequest::WithDetails {
            code: 1000,
            reason: cfg.target.close_reason.clone(),
            socket_id: SOCKET_ID,
        };
        match interceptor.close(&request) {
            Ok(()) => {
                if tokio::time::timeout(CLOSE_TIMEOUT, ended_rx.recv())
                    .await
                    .is_err()
                {
                    warn!("peer did not acknowledge close in time");
                }
            }
            Err(err) => warn!(%err, "close failed"),
        }
    }

    // 9. Tear down and flush the traffic log.
    interceptor.disable_interception();

    sink.log(TrafficEntry::new(
        TrafficEventType::SessionStopped,
        serde_json::json!({ "exit": format!("{exit:?}") }),
    ))
    .await;
    drop(sink);

    sink_handle
        .await
        .context("traffic log writer task failed")?;

    info!("ws-inspector shutting down");
    Ok(())
}

/// Send one stdin line as a text frame, or as a binary frame when it carries
/// the `!b64 ` prefix.
fn send_line<T: Transport>(transport: &T, line: &str) {
    let result = match line.strip_prefix(BINARY_PREFIX) {
        Some(encoded) => transport.send_binary(encoded.trim(), SOCKET_ID),
        None => transport.send(line, SOCKET_ID),
    };
    if let Err(err) = result {
        warn!(%err, "send failed");
    }
}
