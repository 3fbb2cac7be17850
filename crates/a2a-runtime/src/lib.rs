pub mod adapter;
pub mod error;
pub mod fallback;
pub mod generic;
pub mod host;
pub mod subprocess;
pub mod types;

pub use adapter::RuntimeAdapter;
pub use error::RuntimeError;
pub use types::{CallerInfo, NotifyRequest, RunTurnRequest, SummarizeRequest, SummaryDraft, TurnMessage};
