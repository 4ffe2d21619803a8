//! Configuration loader and validator for the lectern service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable that overrides `payment.key_secret`.
pub const PAYMENT_SECRET_ENV: &str = "LECTERN_PAYMENT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub payment: Payment,
    #[serde(default)]
    pub notify: Notify,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub listen: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
}

/// Payment provider settings. The secret signs `order_id|payment_id`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub key_secret: String,
}

impl std::fmt::Debug for Payment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payment")
            .field("key_secret", &"[REDACTED]")
            .finish()
    }
}

/// Where change events are delivered. An empty `webhook_url` logs them instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notify {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Default for Notify {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/lectern.db", self.app.data_dir))
    }

    pub fn webhook_url(&self) -> Option<&str> {
        let url = self.notify.webhook_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Load configuration from a YAML file, apply environment overrides, and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(secret) = std::env::var(PAYMENT_SECRET_ENV) {
        cfg.payment.key_secret = secret;
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.listen.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("app.listen must be a socket address"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if cfg.payment.key_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("payment.key_secret must be non-empty"));
    }

    if let Some(url) = cfg.webhook_url() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid("notify.webhook_url must be an http(s) URL"));
        }
    }
    if cfg.notify.timeout_ms == 0 {
        return Err(ConfigError::Invalid("notify.timeout_ms must be > 0"));
    }

    Ok(())
}

/// Example configuration shipped with the service.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  listen: "0.0.0.0:8080"
  poll_interval_ms: 500
  max_backoff_seconds: 60

payment:
  key_secret: "YOUR_PAYMENT_KEY_SECRET"

notify:
  webhook_url: "http://localhost:4000/events"
  timeout_ms: 3000
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.webhook_url(), Some("http://localhost:4000/events"));
    }

    #[test]
    fn notify_section_is_optional() {
        let yaml = r#"app:
  data_dir: "./data"
  listen: "127.0.0.1:9000"
  poll_interval_ms: 100
  max_backoff_seconds: 10
payment:
  key_secret: "s3cret"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.webhook_url(), None);
        assert_eq!(cfg.notify.timeout_ms, 3000);
    }

    #[test]
    fn invalid_payment_secret() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.payment.key_secret = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("payment.key_secret")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_listen_and_webhook() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.listen = "not-an-addr".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("app.listen")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notify.webhook_url = "ftp://events".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.poll_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("YOUR_PAYMENT_KEY_SECRET"));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.listen, "0.0.0.0:8080");
    }
}
