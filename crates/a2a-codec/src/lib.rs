//! `a2a-codec` — extracts and normalizes the trailing `<collab_state>` JSON
//! block agents may append to a turn's response text.

pub mod decode;
pub mod types;

pub use decode::decode;
pub use types::{CodecOutput, Phase, StatePatch};
