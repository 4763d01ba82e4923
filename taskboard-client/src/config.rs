use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskboard_core::{BoardError, BoardResult};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5001";
pub const DEFAULT_CACHE_URL: &str = "sqlite::memory:";
/// The snapshot key the board has always been cached under.
pub const DEFAULT_CACHE_KEY: &str = "columns";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub cache_url: String,
    pub cache_key: String,
    pub request_timeout_ms: u64,
    pub max_notifications: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            cache_url: DEFAULT_CACHE_URL.to_string(),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            request_timeout_ms: 10_000,
            max_notifications: 20,
        }
    }
}

impl ClientConfig {
    /// Reads `TASKBOARD_SERVER_URL`, `TASKBOARD_CACHE_URL`, `TASKBOARD_CACHE_KEY`,
    /// `TASKBOARD_REQUEST_TIMEOUT_MS` and `TASKBOARD_MAX_NOTIFICATIONS`, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> BoardResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BoardResult<Self> {
        let defaults = Self::default();
        let config = Self {
            server_url: lookup("TASKBOARD_SERVER_URL").unwrap_or(defaults.server_url),
            cache_url: lookup("TASKBOARD_CACHE_URL").unwrap_or(defaults.cache_url),
            cache_key: lookup("TASKBOARD_CACHE_KEY").unwrap_or(defaults.cache_key),
            request_timeout_ms: parse(&lookup, "TASKBOARD_REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout_ms),
            max_notifications: parse(&lookup, "TASKBOARD_MAX_NOTIFICATIONS")?
                .unwrap_or(defaults.max_notifications),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(BoardError::Config("server_url must not be empty".into()));
        }
        if self.cache_key.trim().is_empty() {
            return Err(BoardError::Config("cache_key must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(BoardError::Config("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> BoardResult<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BoardError::Config(format!("{} is not a valid number: {:?}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.cache_key, "columns");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let vars = HashMap::from([
            ("TASKBOARD_SERVER_URL", "http://board.test"),
            ("TASKBOARD_MAX_NOTIFICATIONS", "5"),
        ]);
        let config =
            ClientConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server_url, "http://board.test");
        assert_eq!(config.max_notifications, 5);

        let err = ClientConfig::from_lookup(|key| {
            (key == "TASKBOARD_REQUEST_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, BoardError::Config(_)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "cache_key": "board" }"#).unwrap();
        assert_eq!(config.cache_key, "board");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
    }
}
