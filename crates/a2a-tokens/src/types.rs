use a2a_core::types::{Disclosure, NotifyLevel, Tier, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling call budget and wall-clock rate limits attached to a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: Some(6),
            per_hour: Some(60),
            per_day: Some(300),
        }
    }
}

/// In-memory wall-clock usage counters for one token. Reset whenever the
/// current UTC minute/hour/day no longer matches the stored boundary —
/// never a rolling window.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateWindows {
    pub minute_bucket: Option<String>,
    pub minute_count: u32,
    pub hour_bucket: Option<String>,
    pub hour_count: u32,
    pub day_bucket: Option<String>,
    pub day_count: u32,
}

/// A capability-scoped bearer credential.
///
/// The wire token itself is never stored — only [`Token::secret_hash`], a
/// SHA-256 digest. `id` is the owner-visible handle used in listings and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub secret_hash: String,
    pub name: String,
    pub owner: String,
    pub tier: Tier,
    pub allowed_topics: Vec<String>,
    pub allowed_goals: Vec<String>,
    pub disclosure: Disclosure,
    pub notify: NotifyLevel,
    pub max_calls: Option<u64>,
    pub calls_made: u64,
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub windows: RateWindows,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub linked_contact_id: Option<String>,
}

/// Caller-supplied parameters for [`crate::store::TokenStore::create`].
/// Fields left `None` fall back to the tier's defaults.
#[derive(Debug, Clone, Default)]
pub struct TokenSpec {
    pub name: String,
    pub owner: String,
    pub tier: Tier,
    pub allowed_topics: Option<Vec<String>>,
    pub allowed_goals: Option<Vec<String>>,
    pub disclosure: Option<Disclosure>,
    pub notify: Option<NotifyLevel>,
    pub max_calls: Option<u64>,
    pub rate_limits: Option<RateLimits>,
    pub expires_at: Option<DateTime<Utc>>,
    pub linked_contact_id: Option<String>,
}

impl TokenSpec {
    /// Tier-dependent defaults, mirroring how a fresh user profile on a
    /// lower trust tier gets a narrower default capability set.
    fn tier_defaults(tier: Tier) -> (Vec<String>, Vec<String>, Disclosure) {
        match tier {
            Tier::Public => (vec![], vec![], Disclosure::Public),
            Tier::Friends => (
                vec!["general".to_string(), "scheduling".to_string()],
                vec!["coordinate".to_string()],
                Disclosure::Public,
            ),
            Tier::Family => (
                vec![
                    "general".to_string(),
                    "scheduling".to_string(),
                    "personal".to_string(),
                ],
                vec!["coordinate".to_string(), "share_context".to_string()],
                Disclosure::Minimal,
            ),
            Tier::Custom => (vec![], vec![], Disclosure::Public),
        }
    }

    pub(crate) fn resolve(self) -> (Vec<String>, Vec<String>, Disclosure, NotifyLevel, RateLimits) {
        let (default_topics, default_goals, default_disclosure) = Self::tier_defaults(self.tier);
        (
            self.allowed_topics.unwrap_or(default_topics),
            self.allowed_goals.unwrap_or(default_goals),
            self.disclosure.unwrap_or(default_disclosure),
            self.notify.unwrap_or_default(),
            self.rate_limits.unwrap_or_default(),
        )
    }
}

/// Outcome of [`crate::store::TokenStore::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    NotFound,
    Revoked,
    Expired,
    CallBudgetExceeded,
    RateLimited { window: &'static str },
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationFailure::NotFound => "token not found or no longer valid",
            ValidationFailure::Revoked => "token has been revoked",
            ValidationFailure::Expired => "token has expired",
            ValidationFailure::CallBudgetExceeded => "token has used its allotted calls",
            ValidationFailure::RateLimited { window } => match *window {
                "minute" => "rate limited: per-minute budget exceeded",
                "hour" => "rate limited: per-hour budget exceeded",
                _ => "rate limited: per-day budget exceeded",
            },
        };
        write!(f, "{s}")
    }
}

impl ValidationFailure {
    /// Stable error code surfaced in the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::NotFound => "token_invalid_or_expired",
            ValidationFailure::Revoked => "token_revoked",
            ValidationFailure::Expired => "token_expired",
            ValidationFailure::CallBudgetExceeded => "permission_denied",
            ValidationFailure::RateLimited { .. } => "rate_limited",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            ValidationFailure::NotFound => "request a fresh invite token from the owner",
            ValidationFailure::Revoked => "this token has been revoked by the owner",
            ValidationFailure::Expired => "this token has expired; request a new one",
            ValidationFailure::CallBudgetExceeded => "this token has used its allotted calls",
            ValidationFailure::RateLimited { window } => match *window {
                "minute" => "retry after the current minute rolls over",
                "hour" => "retry after the current hour rolls over",
                _ => "retry after the current day rolls over",
            },
        }
    }
}
