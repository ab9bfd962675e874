use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required config key is missing or unusable.
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,

    #[error("action {action} timed out")]
    Timeout { action: String },

    #[error("action {action} failed with retcode {retcode}: {message}")]
    Action {
        action: String,
        retcode: i64,
        message: String,
    },
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<Error> for parabox_extension::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotConnected => Self::unavailable("onebot transport is not connected"),
            Error::Config(message) => Self::invalid_input(message),
            other => Self::external("onebot", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
