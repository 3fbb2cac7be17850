use a2a_codec::{Phase, StatePatch};
use a2a_core::types::{ConversationId, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Concluded,
    Timeout,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Concluded => "concluded",
            ConversationStatus::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = crate::error::ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "concluded" => Ok(ConversationStatus::Concluded),
            "timeout" => Ok(ConversationStatus::Timeout),
            other => Err(crate::error::ConversationError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OwnerRelevance {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl std::str::FromStr for OwnerRelevance {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(OwnerRelevance::Low),
            "medium" => Ok(OwnerRelevance::Medium),
            "high" => Ok(OwnerRelevance::High),
            "unknown" => Ok(OwnerRelevance::Unknown),
            _ => Err(()),
        }
    }
}

/// Adaptive pacing metadata last observed from either side of a conversation.
/// Mirrors the normalized shape `a2a-codec` produces.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollabState {
    pub phase: Option<String>,
    pub overlap_score: Option<f64>,
    pub turn_count: Option<u32>,
    #[serde(default)]
    pub active_threads: Vec<String>,
    #[serde(default)]
    pub candidate_collaborations: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    pub close_signal: Option<bool>,
    pub confidence: Option<f64>,
}

impl CollabState {
    /// Overlay a decoded `StatePatch` onto the stored state. Only fields the
    /// patch actually sets (or non-empty lists) overwrite the existing value
    /// — a turn that emits no `<collab_state>` block, or a partial one,
    /// never erases what an earlier turn already recorded.
    pub fn merge(mut self, patch: StatePatch) -> Self {
        if let Some(p) = patch.phase {
            self.phase = Some(phase_str(p).to_string());
        }
        if let Some(v) = patch.overlap_score {
            self.overlap_score = Some(v);
        }
        if let Some(v) = patch.turn_count {
            self.turn_count = Some(v);
        }
        if !patch.active_threads.is_empty() {
            self.active_threads = patch.active_threads;
        }
        if !patch.candidate_collaborations.is_empty() {
            self.candidate_collaborations = patch.candidate_collaborations;
        }
        if !patch.open_questions.is_empty() {
            self.open_questions = patch.open_questions;
        }
        if let Some(v) = patch.close_signal {
            self.close_signal = Some(v);
        }
        if let Some(v) = patch.confidence {
            self.confidence = Some(v);
        }
        self
    }
}

fn phase_str(p: Phase) -> &'static str {
    match p {
        Phase::Handshake => "handshake",
        Phase::Explore => "explore",
        Phase::DeepDive => "deep_dive",
        Phase::Synthesize => "synthesize",
        Phase::Close => "close",
    }
}

/// Fields produced by a summarizer at conclusion time. Any subset may be
/// absent — a summarizer failure still lets the conversation conclude, it
/// just leaves these null (see `ConversationStore::conclude`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub summary: Option<String>,
    pub owner_summary: Option<String>,
    pub owner_relevance: Option<OwnerRelevance>,
    pub owner_goals_touched: Vec<String>,
    pub owner_action_items: Vec<String>,
    pub caller_action_items: Vec<String>,
    pub joint_action_items: Vec<String>,
    pub collaboration_opportunity: Option<String>,
    pub follow_up: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub contact_id: String,
    pub contact_name: Option<String>,
    pub token_id: String,
    pub direction: Direction,
    pub status: ConversationStatus,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub summary: Summary,
    pub collab_state: CollabState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(crate::error::ConversationError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: ConversationId,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub role: Role,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub compressed: bool,
}

/// Parameters for starting (or idempotently resuming) a conversation.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub conversation_id: Option<ConversationId>,
    pub contact_id: String,
    pub contact_name: Option<String>,
    pub token_id: String,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct StartResult {
    pub conversation: Conversation,
    pub resumed: bool,
}
