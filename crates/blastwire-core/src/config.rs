//! blastwire.toml configuration.
//!
//! Every section is optional; missing keys take the defaults below.
//!
//! ```toml
//! [log]
//! level = "info"
//! json = false
//! timestamps = false
//!
//! [http]
//! timeout_ms = 30000
//! instance = "wrpc:http/incoming-handler@0.1.0"
//! function = "handle"
//! accept_status = [200, 300]
//!
//! [blaster]
//! timeout_ms = 10000
//! instance = "xk6:wrpc/blaster@0.0.1"
//! function = "blast"
//!
//! [transport]
//! url = "nats://127.0.0.1:4222"
//! prefix = "default"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log: LogConfig,
    pub http: HttpConfig,
    pub blaster: BlasterConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"blastwire_http=trace"`.
    pub level: String,
    pub json: bool,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            timestamps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub instance: String,
    pub function: String,
    /// Half-open `[min, max)` range of statuses counted as valid.
    pub accept_status: [u16; 2],
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            instance: "wrpc:http/incoming-handler@0.1.0".to_string(),
            function: "handle".to_string(),
            accept_status: [200, 300],
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether `status` falls in the configured acceptable range.
    pub fn accepts(&self, status: u16) -> bool {
        let [min, max] = self.accept_status;
        min <= status && status < max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlasterConfig {
    pub timeout_ms: u64,
    pub instance: String,
    pub function: String,
}

impl Default for BlasterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            instance: "xk6:wrpc/blaster@0.0.1".to_string(),
            function: "blast".to_string(),
        }
    }
}

impl BlasterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings handed through to the external transport driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: Option<String>,
    pub prefix: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        if config.http.accept_status[0] > config.http.accept_status[1] {
            anyhow::bail!(
                "http.accept_status must be [min, max) with min <= max, got {:?}",
                config.http.accept_status
            );
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.blaster.timeout(), Duration::from_secs(10));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
[http]
timeout_ms = 500

[transport]
url = "nats://127.0.0.1:4222"

[transport.tags]
env = "ci"
"#,
        )
        .unwrap();
        assert_eq!(config.http.timeout_ms, 500);
        assert_eq!(config.http.function, "handle");
        assert_eq!(config.transport.url.as_deref(), Some("nats://127.0.0.1:4222"));
        assert_eq!(config.transport.tags["env"], "ci");
    }

    #[test]
    fn accept_range_is_half_open() {
        let http = HttpConfig::default();
        assert!(!http.accepts(199));
        assert!(http.accepts(200));
        assert!(http.accepts(299));
        assert!(!http.accepts(300));
    }

    #[test]
    fn inverted_accept_range_is_rejected() {
        let err = BridgeConfig::from_toml_str("[http]\naccept_status = [300, 200]\n").unwrap_err();
        assert!(err.to_string().contains("accept_status"));
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = BridgeConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("wrpc:http/incoming-handler@0.1.0"));
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }
}
