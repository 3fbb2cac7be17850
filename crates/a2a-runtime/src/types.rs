use serde::{Deserialize, Serialize};

use a2a_core::types::NotifyLevel;

/// One turn of conversation history, as handed to the agent brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: String,
    pub content: String,
}

/// Caller-facing facts the adapter needs to address a response, but never
/// enough to reconstruct the token itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerInfo {
    pub caller_name: String,
    pub owner_name: String,
    pub allowed_topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTurnRequest {
    pub conversation_id: String,
    pub system_prompt: String,
    pub message: String,
    pub caller: CallerInfo,
    pub context: Vec<TurnMessage>,
    pub trace_id: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub conversation_id: String,
    pub system_prompt: String,
    pub messages: Vec<TurnMessage>,
    pub caller: CallerInfo,
    pub trace_id: String,
}

#[derive(Debug, Clone)]
pub struct NotifyRequest {
    pub level: NotifyLevel,
    pub token_name: String,
    pub caller_name: String,
    pub message: String,
    pub conversation_id: String,
    pub trace_id: String,
}

/// Shape returned by a summarizer backend, regardless of which mode produced
/// it. Callers (the Call Monitor, the inbound pipeline) translate this into
/// a conversation store's own summary type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryDraft {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub owner_summary: Option<String>,
    #[serde(default)]
    pub owner_relevance: Option<String>,
    #[serde(default)]
    pub owner_goals_touched: Vec<String>,
    #[serde(default)]
    pub owner_action_items: Vec<String>,
    #[serde(default)]
    pub caller_action_items: Vec<String>,
    #[serde(default)]
    pub joint_action_items: Vec<String>,
    #[serde(default)]
    pub collaboration_opportunity: Option<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
