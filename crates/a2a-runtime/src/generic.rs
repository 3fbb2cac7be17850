use std::time::Duration;

use crate::error::{Result, RuntimeError};
use crate::subprocess;
use crate::types::{NotifyRequest, RunTurnRequest, SummarizeRequest, SummaryDraft};

/// Invokes an operator-supplied command that reads a JSON payload on stdin
/// and writes either plain text or a JSON object with a `response`/`text`/
/// `message` field. The fallback path when no host tool is discoverable.
pub struct GenericBackend {
    agent_command: Option<String>,
    summary_command: Option<String>,
    notify_command: Option<String>,
}

impl GenericBackend {
    pub fn new(
        agent_command: Option<String>,
        summary_command: Option<String>,
        notify_command: Option<String>,
    ) -> Self {
        Self {
            agent_command,
            summary_command,
            notify_command,
        }
    }

    pub async fn run_turn(&self, req: &RunTurnRequest, timeout: Duration) -> Result<String> {
        let command = self.agent_command.as_deref().ok_or(RuntimeError::GenericUnconfigured)?;
        let payload = serde_json::json!({
            "conversation_id": req.conversation_id,
            "system_prompt": req.system_prompt,
            "message": req.message,
            "caller_name": req.caller.caller_name,
            "owner_name": req.caller.owner_name,
            "allowed_topics": req.caller.allowed_topics,
            "context": req.context,
            "trace_id": req.trace_id,
        });
        let stdout = subprocess::run_piped(command, &[], &payload.to_string(), timeout).await?;
        Ok(subprocess::extract_text(&stdout))
    }

    pub async fn summarize(&self, req: &SummarizeRequest, timeout: Duration) -> Result<SummaryDraft> {
        let command = self.summary_command.as_deref().ok_or(RuntimeError::GenericUnconfigured)?;
        let payload = serde_json::json!({
            "conversation_id": req.conversation_id,
            "system_prompt": req.system_prompt,
            "messages": req.messages,
            "caller_name": req.caller.caller_name,
            "owner_name": req.caller.owner_name,
            "trace_id": req.trace_id,
        });
        let stdout = subprocess::run_piped(command, &[], &payload.to_string(), timeout).await?;
        if let Ok(draft) = serde_json::from_str::<SummaryDraft>(&stdout) {
            if !draft.summary.trim().is_empty() {
                return Ok(draft);
            }
        }
        let text = subprocess::extract_text(&stdout);
        if text.trim().is_empty() {
            return Err(RuntimeError::Parse("empty summary output".to_string()));
        }
        Ok(SummaryDraft {
            summary: text,
            ..Default::default()
        })
    }

    pub async fn notify(&self, req: &NotifyRequest, timeout: Duration) -> Result<()> {
        let command = self.notify_command.as_deref().ok_or(RuntimeError::GenericUnconfigured)?;
        let payload = serde_json::json!({
            "token_name": req.token_name,
            "caller_name": req.caller_name,
            "message": req.message,
            "conversation_id": req.conversation_id,
            "trace_id": req.trace_id,
        });
        subprocess::run_piped(command, &[], &payload.to_string(), timeout).await?;
        Ok(())
    }
}
