use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("device link disconnected")]
    Disconnected,
    #[error("device rejected command: {0}")]
    Rejected(String),
    #[error("malformed command: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
