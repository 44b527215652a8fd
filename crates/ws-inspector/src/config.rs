use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_close_reason")]
    pub close_reason: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: None,
            protocols: Vec::new(),
            headers: BTreeMap::new(),
            close_reason: default_close_reason(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_traffic_log_path")]
    pub traffic_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            traffic_log_path: default_traffic_log_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_close_reason() -> String {
    "inspector exit".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_traffic_log_path() -> PathBuf {
    PathBuf::from("traffic.jsonl")
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `Ok(None)` when the file does not exist, so the inspector can run
/// from command-line flags alone. Reporting that is left to the caller, which
/// may not have a subscriber installed yet.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    parse(&contents)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

fn parse(contents: &str) -> Result<Config, serde_yml::Error> {
    // An empty document deserializes as unit, not as an empty map.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yml::from_str(contents)
}

/// Parse a `KEY=VALUE` header argument.
pub fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("header {raw:?} is not in KEY=VALUE form"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("header {raw:?} has an empty name");
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_reported_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.yaml")).unwrap().is_none());
    }

    #[test]
    fn existing_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inspector.yaml");
        std::fs::write(&path, "target:\n  url: ws://localhost:1234\n").unwrap();

        let cfg = load(&path).unwrap().unwrap();
        assert_eq!(cfg.target.url.as_deref(), Some("ws://localhost:1234"));
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(cfg.target.url.is_none());
        assert_eq!(cfg.target.close_reason, "inspector exit");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.traffic_log_path, PathBuf::from("traffic.jsonl"));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert!(cfg.target.protocols.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
target:
  url: ws://127.0.0.1:9000/ws
  protocols: [v12.stomp]
  headers:
    Authorization: Bearer abc
logging:
  level: debug
  traffic_log_path: /tmp/traffic.jsonl
"#;
        let cfg = parse(yaml).unwrap();
        assert_eq!(cfg.target.url.as_deref(), Some("ws://127.0.0.1:9000/ws"));
        assert_eq!(cfg.target.protocols, vec!["v12.stomp".to_string()]);
        assert_eq!(
            cfg.target.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(
            cfg.logging.traffic_log_path,
            PathBuf::from("/tmp/traffic.jsonl")
        );
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let cfg = parse("logging:\n  level: trace\n").unwrap();
        assert_eq!(cfg.logging.level, "trace");
        assert_eq!(cfg.logging.traffic_log_path, PathBuf::from("traffic.jsonl"));
        assert!(cfg.target.url.is_none());
    }

    #[test]
    fn header_arguments_are_split_on_first_equals() {
        assert_eq!(
            parse_header("X-Token=a=b").unwrap(),
            ("X-Token".to_string(), "a=b".to_string())
        );
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header("=value").is_err());
    }
}
