//! `a2a-monitor` — background scheduler that concludes inbound calls the
//! peer never explicitly ended, because they went idle or ran too long.

pub mod engine;
pub mod types;

pub use engine::CallMonitor;
pub use types::{ConcludeReason, TrackedCaller};
