use serde::{Deserialize, Serialize};

use a2a_core::types::ConversationId;

/// Tunables for one outbound driving run. Mirrors the gateway's
/// `GatewayConfig::max_timeout_secs`/`min_turns` pair, generalized to the
/// outbound side where the driver also bounds total turns.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub max_turns: u32,
    pub min_turns: u32,
    pub client_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_turns: 30,
            min_turns: 8,
            client_timeout_secs: 60,
        }
    }
}

/// Local identity the driver presents to the peer as the caller.
#[derive(Debug, Clone, Default)]
pub struct OutboundCaller {
    pub name: Option<String>,
    pub contact_id: Option<String>,
}

/// Why a driver run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PeerDeclinedToContinue,
    LocalCloseSignal,
    MaxTurnsReached,
    RemoteCallFailed,
}

#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub conversation_id: ConversationId,
    pub turns_run: u32,
    pub stop_reason: StopReason,
    /// Whether the peer's `/end` call (best-effort) reported success.
    pub peer_ended: bool,
}

// --- wire shapes mirroring the gateway's `/invoke` and `/end` JSON bodies ---

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireCaller {
    pub name: Option<String>,
    pub contact_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InvokeWireRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub caller: Option<WireCaller>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InvokeWireReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub can_continue: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EndWireRequest {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct EndWireReply {
    #[serde(default)]
    pub success: bool,
}
