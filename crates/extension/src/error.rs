use std::error::Error as StdError;

use crate::{connection::ConnectionState, descriptor::LoadError};

/// Crate-wide result type for connection runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by the loader, the connection state machine, and the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A requested connection ID is not registered.
    #[error("unknown connection: {connection_id}")]
    UnknownConnection { connection_id: i64 },

    /// The connection exists but is not in a state that allows the operation.
    #[error("connection {connection_id} is {actual}, expected {expected}")]
    InvalidState {
        connection_id: i64,
        actual: ConnectionState,
        expected: ConnectionState,
    },

    /// Operation is currently unavailable (transport down, not initialized).
    #[error("operation unavailable: {message}")]
    Unavailable { message: String },

    /// The extension does not implement this call.
    #[error("{operation} is not supported by this extension")]
    Unsupported { operation: &'static str },

    /// A host-imposed timeout expired before the extension answered.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Content(#[from] parabox_message::Error),

    /// Persistence collaborator failed; the unit of work was not applied.
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Wrapped source error from an extension's own dependencies.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    #[must_use]
    pub fn unknown_connection(connection_id: i64) -> Self {
        Self::UnknownConnection { connection_id }
    }

    #[must_use]
    pub fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

