use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid invite uri: {0}")]
    InvalidInvite(String),
    #[error("peer returned status {0}")]
    PeerRejected(u16),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Conversation(#[from] a2a_conversations::ConversationError),
}

pub type Result<T> = std::result::Result<T, DriverError>;
