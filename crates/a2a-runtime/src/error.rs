use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("host tool not discoverable: {0}")]
    HostUnavailable(String),

    #[error("generic command not configured")]
    GenericUnconfigured,

    #[error("subprocess exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("subprocess timed out after {0}ms")]
    Timeout(u64),

    #[error("failed to parse subprocess output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
