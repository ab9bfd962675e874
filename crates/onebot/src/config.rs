use std::time::Duration;

use {
    parabox_extension::ConnectionConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    url::Url,
};

use crate::error::{Error, Result};

pub const DEFAULT_HEART_INTERVAL: Duration = Duration::from_secs(10);

/// Settings of one OneBot 11 forward WebSocket connection, read from the
/// connection's config map.
#[derive(Clone)]
pub struct OneBotConfig {
    pub host: String,
    pub port: u16,
    /// Access token, sent as `Authorization: Bearer`.
    pub token: Option<Secret<String>>,
    /// Interval between client pings on the socket.
    pub heart_interval: Duration,
    pub auto_reconnect: bool,
    /// Fill in avatar URLs the protocol itself does not expose.
    pub compatibility_mode: bool,
}

impl std::fmt::Debug for OneBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneBotConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("heart_interval", &self.heart_interval)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("compatibility_mode", &self.compatibility_mode)
            .finish()
    }
}

impl OneBotConfig {
    /// Read the settings. Error messages are the ones shown as connection status.
    pub fn from_connection_config(config: &ConnectionConfig) -> Result<Self> {
        let host = opt_string(config, "host").ok_or_else(|| Error::config("Host is not provided"))?;
        let port = opt_string(config, "port")
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| Error::config("Port is not provided"))?;
        let heart_interval = opt_string(config, "heart_interval")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEART_INTERVAL);

        Ok(Self {
            host,
            port,
            token: opt_string(config, "token").map(Secret::new),
            heart_interval,
            auto_reconnect: opt_bool(config, "auto_reconnect").unwrap_or(false),
            compatibility_mode: opt_bool(config, "compatibility_mode").unwrap_or(false),
        })
    }

    /// WebSocket endpoint. `host` may carry its own `ws://` or `wss://` scheme.
    pub fn ws_url(&self) -> Result<Url> {
        let raw = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("ws://{}", self.host)
        };
        let mut url = Url::parse(&raw).map_err(|e| Error::config(format!("invalid host: {e}")))?;
        url.set_port(Some(self.port))
            .map_err(|()| Error::config("invalid host: cannot carry a port"))?;
        Ok(url)
    }

    pub fn bearer(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose_secret()))
    }
}

/// Non-empty string, or a number rendered as one. Setup forms store both.
fn opt_string(config: &ConnectionConfig, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_bool(config: &ConnectionConfig, key: &str) -> Option<bool> {
    match config.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn config(value: Value) -> ConnectionConfig {
        match value {
            Value::Object(map) => map,
            _ => ConnectionConfig::new(),
        }
    }

    #[test]
    fn missing_host_is_reported_first() {
        let err = OneBotConfig::from_connection_config(&config(json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "Host is not provided");
    }

    #[rstest]
    #[case(json!({ "host": "127.0.0.1" }))]
    #[case(json!({ "host": "127.0.0.1", "port": "" }))]
    #[case(json!({ "host": "127.0.0.1", "port": "not-a-port" }))]
    #[case(json!({ "host": "127.0.0.1", "port": 70000 }))]
    fn unusable_port_is_reported(#[case] value: Value) {
        let err = OneBotConfig::from_connection_config(&config(value)).unwrap_err();
        assert_eq!(err.to_string(), "Port is not provided");
    }

    #[rstest]
    #[case(json!("6700"))]
    #[case(json!(6700))]
    fn port_accepts_string_or_number(#[case] port: Value) {
        let cfg =
            OneBotConfig::from_connection_config(&config(json!({ "host": "10.0.0.2", "port": port })))
                .unwrap();
        assert_eq!(cfg.port, 6700);
        assert_eq!(cfg.ws_url().unwrap().as_str(), "ws://10.0.0.2:6700/");
    }

    #[test]
    fn defaults_apply() {
        let cfg = OneBotConfig::from_connection_config(&config(
            json!({ "host": "h", "port": 1, "heart_interval": "abc" }),
        ))
        .unwrap();
        assert_eq!(cfg.heart_interval, DEFAULT_HEART_INTERVAL);
        assert!(!cfg.auto_reconnect);
        assert!(!cfg.compatibility_mode);
        assert!(cfg.bearer().is_none());
    }

    #[test]
    fn switches_accept_strings() {
        let cfg = OneBotConfig::from_connection_config(&config(json!({
            "host": "wss://bot.example.com",
            "port": "443",
            "auto_reconnect": "true",
            "compatibility_mode": true,
            "heart_interval": 30,
        })))
        .unwrap();
        assert!(cfg.auto_reconnect);
        assert!(cfg.compatibility_mode);
        assert_eq!(cfg.heart_interval, Duration::from_secs(30));
        assert_eq!(cfg.ws_url().unwrap().as_str(), "wss://bot.example.com/");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = OneBotConfig::from_connection_config(&config(
            json!({ "host": "h", "port": 1, "token": "s3cret" }),
        ))
        .unwrap();
        assert_eq!(cfg.bearer().as_deref(), Some("Bearer s3cret"));
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
