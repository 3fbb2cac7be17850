//! `a2a-driver` — the outbound half of the protocol: given an invite URI for
//! a remote peer, drives an adaptive multi-turn conversation against its
//! `/invoke`/`/end` surface and persists the result locally exactly like an
//! inbound call would.

pub mod driver;
pub mod error;
pub mod invite;
pub mod types;

pub use driver::Driver;
pub use error::{DriverError, Result};
pub use invite::{Invite, Scheme};
pub use types::{DriverConfig, DriverOutcome, OutboundCaller, StopReason};
