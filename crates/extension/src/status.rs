use std::{fmt, sync::Arc};

use {serde::Serialize, tokio::sync::watch};

/// Health of one connection as reported by its extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Activating,
    Active,
    Error(String),
}

impl ConnectionStatus {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(reason.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activating => f.write_str("activating"),
            Self::Active => f.write_str("active"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

pub type StatusReceiver = watch::Receiver<ConnectionStatus>;

/// Single-value status stream. Publishing replaces the current value; slow
/// subscribers only ever see the latest one.
#[derive(Clone)]
pub struct StatusChannel {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Activating);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current status. Returns `false` if it was already equal.
    pub fn publish(&self, status: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    pub fn current(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_activating() {
        assert_eq!(StatusChannel::new().current(), ConnectionStatus::Activating);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let channel = StatusChannel::new();
        let mut rx = channel.subscribe();

        channel.publish(ConnectionStatus::Active);
        channel.publish(ConnectionStatus::error("socket closed"));

        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(
            *rx.borrow_and_update(),
            ConnectionStatus::error("socket closed")
        );
    }

    #[test]
    fn republishing_same_value_is_not_a_change() {
        let channel = StatusChannel::new();
        assert!(channel.publish(ConnectionStatus::Active));
        assert!(!channel.publish(ConnectionStatus::Active));
    }

    #[test]
    fn serializes_reason_alongside_state() {
        let json = serde_json::to_value(ConnectionStatus::error("OneBot disabled")).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({ "state": "error", "reason": "OneBot disabled" }))
        );
    }
}
