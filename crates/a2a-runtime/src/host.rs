use std::time::Duration;

use crate::error::{Result, RuntimeError};
use crate::subprocess;
use crate::types::{NotifyRequest, RunTurnRequest, SummarizeRequest, SummaryDraft};

/// Invokes the host-integrated CLI tool (e.g. `openclaw`) with the composed
/// prompt passed as a positional argument, per its `<tool> agent|summarize|notify`
/// subcommand convention. Unlike the generic backend, no JSON is piped over
/// stdin — the tool takes its input the way an interactive user would.
pub struct HostBackend {
    tool: String,
}

impl HostBackend {
    pub fn new(tool: String) -> Self {
        Self { tool }
    }

    pub async fn run_turn(&self, req: &RunTurnRequest, timeout: Duration) -> Result<String> {
        let prompt = compose_turn_prompt(req);
        let stdout = subprocess::run_with_args(&self.tool, &["agent".to_string(), prompt], timeout).await?;
        Ok(subprocess::extract_text(&stdout))
    }

    pub async fn summarize(&self, req: &SummarizeRequest, timeout: Duration) -> Result<SummaryDraft> {
        let transcript = compose_transcript(req);
        let stdout = subprocess::run_with_args(&self.tool, &["summarize".to_string(), transcript], timeout).await?;
        parse_summary(&stdout)
    }

    pub async fn notify(&self, req: &NotifyRequest, timeout: Duration) -> Result<()> {
        subprocess::run_with_args(&self.tool, &["notify".to_string(), req.message.clone()], timeout).await?;
        Ok(())
    }
}

fn compose_turn_prompt(req: &RunTurnRequest) -> String {
    let mut out = String::new();
    if !req.system_prompt.is_empty() {
        out.push_str(&req.system_prompt);
        out.push_str("\n\n");
    }
    if !req.context.is_empty() {
        out.push_str("[Previous turns]\n");
        for m in &req.context {
            out.push_str(&format!("{}: {}\n", m.role, m.content));
        }
        out.push_str("\n[Current message]\n");
    }
    out.push_str(&format!("{}: {}", req.caller.caller_name, req.message));
    out
}

fn compose_transcript(req: &SummarizeRequest) -> String {
    let mut out = String::new();
    if !req.system_prompt.is_empty() {
        out.push_str(&req.system_prompt);
        out.push_str("\n\n");
    }
    for m in &req.messages {
        out.push_str(&format!("{}: {}\n", m.role, m.content));
    }
    out
}

fn parse_summary(stdout: &str) -> Result<SummaryDraft> {
    if let Ok(draft) = serde_json::from_str::<SummaryDraft>(stdout) {
        if !draft.summary.trim().is_empty() {
            return Ok(draft);
        }
    }
    let text = subprocess::extract_text(stdout);
    if text.trim().is_empty() {
        return Err(RuntimeError::Parse("empty summary output".to_string()));
    }
    Ok(SummaryDraft {
        summary: text,
        ..Default::default()
    })
}
