use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// One line of the structured, append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub component: String,
    pub event: String,
    pub message: String,
    pub trace_id: Option<String>,
    pub conversation_id: Option<String>,
    pub token_id: Option<String>,
    pub request_id: Option<String>,
    pub error_code: Option<String>,
    pub status_code: Option<u16>,
    pub hint: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl LogEvent {
    pub fn new(component: impl Into<String>, level: Level, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            level,
            component: component.into(),
            event: event.into(),
            message: message.into(),
            trace_id: None,
            conversation_id: None,
            token_id: None,
            request_id: None,
            error_code: None,
            status_code: None,
            hint: None,
            data: None,
        }
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Filters accepted by [`crate::store::LogStore::list`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub trace_id: Option<String>,
    pub conversation_id: Option<String>,
    pub token_id: Option<String>,
    pub error_code: Option<String>,
    pub component: Option<String>,
    pub level: Option<Level>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub by_level: std::collections::HashMap<String, u64>,
    pub by_component: std::collections::HashMap<String, u64>,
}
