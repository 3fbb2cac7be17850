use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token not found: {0}")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contains corrupt JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TokenError>;
