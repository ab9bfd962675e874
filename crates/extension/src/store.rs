use {
    anyhow::Result,
    async_trait::async_trait,
    parabox_message::ReceiveMessage,
    serde::Serialize,
};

use crate::connection::ConnectionConfig;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReceiveOutcome {
    /// First delivery; the message, its chat, and its sender are persisted.
    Stored { message_id: i64 },
    /// A message with the same uuid already exists. Nothing changed.
    Duplicate,
}

/// Persistence for inbound messages.
///
/// `ingest` is one unit of work: resolve or create the chat and the sender,
/// insert the message unless its uuid is already stored, and bump the chat's
/// unread counter for new messages. Either all of it is applied or none.
/// Implementations must tolerate concurrent and repeated calls.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn ingest(&self, connection_id: i64, message: &ReceiveMessage)
    -> Result<ReceiveOutcome>;
}

/// A persisted connection configuration, as supplied by the setup wizard.
#[derive(Debug, Clone, Serialize)]
pub struct StoredConnection {
    pub connection_id: i64,
    pub alias: String,
    pub name: String,
    pub extension_key: String,
    pub config: ConnectionConfig,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Persistent storage for connection configurations.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn list(&self) -> Result<Vec<StoredConnection>>;
    async fn get(&self, alias: &str) -> Result<Option<StoredConnection>>;
    /// Insert or update by alias. Returns the connection id.
    async fn upsert(&self, connection: StoredConnection) -> Result<i64>;
    async fn delete(&self, connection_id: i64) -> Result<bool>;
}
