//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Build the filter for `config`: the configured level, or `RUST_LOG` when
/// the level is empty or fails to parse.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    if !config.level.trim().is_empty() {
        if let Ok(filter) = EnvFilter::try_new(&config.level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global `fmt` subscriber described by `config`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));
    let result = match (config.json, config.timestamps) {
        (true, true) => builder.json().try_init(),
        (true, false) => builder.json().without_time().try_init(),
        (false, true) => builder.try_init(),
        (false, false) => builder.without_time().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_wins() {
        let config = LogConfig {
            level: "debug".into(),
            ..LogConfig::default()
        };
        assert_eq!(env_filter(&config).to_string(), "debug");
    }

    #[test]
    fn second_install_fails() {
        let config = LogConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
