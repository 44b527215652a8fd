use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ws-inspector",
    version,
    about = "Watch the traffic of a WebSocket connection"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ws-inspector.yaml")]
    pub config: PathBuf,

    /// WebSocket URL to connect to (overrides config file setting)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Subprotocol to request; may be repeated (overrides config file setting)
    #[arg(short, long = "protocol")]
    pub protocols: Vec<String>,

    /// Extra upgrade header as KEY=VALUE; may be repeated
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Path of the JSON-lines traffic log (overrides config file setting)
    #[arg(long)]
    pub traffic_log: Option<PathBuf>,

    /// Log level filter when RUST_LOG is unset (overrides config file setting)
    #[arg(long)]
    pub log_level: Option<String>,
}
