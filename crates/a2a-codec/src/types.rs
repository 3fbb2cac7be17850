use serde::{Deserialize, Serialize};

/// Adaptive pacing phase an agent reports itself to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Handshake,
    Explore,
    DeepDive,
    Synthesize,
    Close,
}

impl std::str::FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "handshake" => Ok(Phase::Handshake),
            "explore" => Ok(Phase::Explore),
            "deep_dive" => Ok(Phase::DeepDive),
            "synthesize" => Ok(Phase::Synthesize),
            "close" => Ok(Phase::Close),
            _ => Err(()),
        }
    }
}

/// Normalized form of a parsed `<collab_state>` block. Field-for-field this
/// mirrors what `a2a-conversations::CollabState` persists — callers merge a
/// `StatePatch` onto the stored state rather than replacing it wholesale,
/// since any field may be absent on a given turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePatch {
    pub phase: Option<Phase>,
    pub overlap_score: Option<f64>,
    pub turn_count: Option<u32>,
    pub active_threads: Vec<String>,
    pub candidate_collaborations: Vec<String>,
    pub open_questions: Vec<String>,
    pub close_signal: Option<bool>,
    pub confidence: Option<f64>,
}

/// Result of decoding one agent response.
#[derive(Debug, Clone)]
pub struct CodecOutput {
    /// The response text with the `<collab_state>` block removed, if present.
    pub clean_text: String,
    pub state_patch: Option<StatePatch>,
    pub has_state: bool,
    /// Set when a block was found but couldn't be parsed as a JSON object.
    /// The turn still proceeds with `clean_text` as-is in that case.
    pub parse_error: Option<String>,
}
