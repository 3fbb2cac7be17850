use chrono::{DateTime, Utc};

use a2a_core::types::NotifyLevel;

/// Caller-facing facts the monitor needs to summarize and notify without a
/// database round trip at conclusion time.
#[derive(Debug, Clone)]
pub struct TrackedCaller {
    pub token_id: String,
    pub caller_name: String,
    pub owner_name: String,
    pub allowed_topics: Vec<String>,
    pub notify_level: NotifyLevel,
}

#[derive(Debug, Clone)]
pub(crate) struct TrackedCall {
    pub caller: TrackedCaller,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Why the monitor concluded a conversation rather than the peer or the
/// caller ending it through the normal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcludeReason {
    IdleTimeout,
    MaxDuration,
}

impl ConcludeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcludeReason::IdleTimeout => "idle_timeout",
            ConcludeReason::MaxDuration => "max_duration",
        }
    }
}
