use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("message has no content elements")]
    EmptyMessage,

    #[error("message uuid is empty")]
    MissingUuid,

    #[error("unknown content kind: {0}")]
    UnknownKind(String),

    #[error("failed to encode message contents: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("stored contents are not a JSON array: {0}")]
    CorruptContents(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
