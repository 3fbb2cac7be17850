use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use a2a_core::config::{RuntimeAdapterConfig, RuntimeMode};
use a2a_core::types::NotifyLevel;
use a2a_log::{Level as LogLevel, LogEvent, LogStore};

use crate::fallback;
use crate::generic::GenericBackend;
use crate::host::HostBackend;
use crate::subprocess;
use crate::types::{NotifyRequest, RunTurnRequest, SummarizeRequest, SummaryDraft};

/// Facade over whichever backend is configured. Construction probes
/// host-tool discoverability once and resolves `Auto` to a concrete mode;
/// `self.mode` is never `Auto` after `new()` returns.
///
/// `run_turn` and `summarize` never raise past this facade — the worst case
/// is a templated fallback response, per the adapter's contract.
pub struct RuntimeAdapter {
    mode: RuntimeMode,
    failover: bool,
    default_timeout: Duration,
    host: HostBackend,
    generic: GenericBackend,
    log: Option<Arc<LogStore>>,
}

impl RuntimeAdapter {
    pub async fn new(config: &RuntimeAdapterConfig) -> Self {
        Self::with_log(config, None).await
    }

    /// Same as [`Self::new`], but records `runtime_error`/
    /// `generic_agent_command_failed` events to `log` whenever a turn falls
    /// back to the deterministic templated response.
    pub async fn with_log(config: &RuntimeAdapterConfig, log: Option<Arc<LogStore>>) -> Self {
        let resolved = match config.mode {
            RuntimeMode::Auto => {
                if subprocess::is_discoverable(&config.host_tool).await {
                    RuntimeMode::HostIntegrated
                } else {
                    RuntimeMode::Generic
                }
            }
            other => other,
        };

        if config.mode == RuntimeMode::Auto {
            info!(host_tool = %config.host_tool, resolved_mode = ?resolved, "runtime adapter auto-selected mode");
        }

        Self {
            mode: resolved,
            failover: config.failover,
            default_timeout: Duration::from_secs(config.adapter_timeout_secs),
            host: HostBackend::new(config.host_tool.clone()),
            generic: GenericBackend::new(
                config.agent_command.clone(),
                config.summary_command.clone(),
                config.notify_command.clone(),
            ),
            log,
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    fn log_fallback(&self, conversation_id: &str, event: &str, message: String) {
        if let Some(log) = &self.log {
            log.write(
                LogEvent::new("a2a-runtime", LogLevel::Error, event, message).with_conversation(conversation_id),
            );
        }
    }

    fn effective_timeout(&self, requested_ms: u64) -> Duration {
        let cap = self.default_timeout.as_millis() as u64;
        Duration::from_millis(requested_ms.clamp(1, cap.max(1)))
    }

    /// Run one conversational turn. Always returns text — see module docs.
    pub async fn run_turn(&self, req: RunTurnRequest) -> String {
        let timeout = self.effective_timeout(req.timeout_ms);

        if matches!(self.mode, RuntimeMode::Mock) {
            return fallback::turn(&req.caller.caller_name, &req.caller.owner_name, &req.caller.allowed_topics, &req.message);
        }

        if matches!(self.mode, RuntimeMode::HostIntegrated) {
            match self.host.run_turn(&req, timeout).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!(conversation_id = %req.conversation_id, "host-integrated run_turn returned an empty response"),
                Err(e) => {
                    error!(conversation_id = %req.conversation_id, runtime_error = %e, "host-integrated run_turn failed");
                    if !self.failover {
                        self.log_fallback(
                            &req.conversation_id,
                            "runtime_error",
                            format!("host-integrated run_turn failed: {e}"),
                        );
                        return fallback::turn(&req.caller.caller_name, &req.caller.owner_name, &req.caller.allowed_topics, &req.message);
                    }
                }
            }
        }

        match self.generic.run_turn(&req, timeout).await {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => warn!(conversation_id = %req.conversation_id, "generic run_turn returned an empty response"),
            Err(e) => {
                error!(conversation_id = %req.conversation_id, runtime_error = %e, "generic run_turn failed, synthesizing fallback response");
                self.log_fallback(
                    &req.conversation_id,
                    "generic_agent_command_failed",
                    format!("generic run_turn failed: {e}"),
                );
            }
        }

        fallback::turn(&req.caller.caller_name, &req.caller.owner_name, &req.caller.allowed_topics, &req.message)
    }

    /// Summarize a conversation. Always returns a non-empty summary.
    pub async fn summarize(&self, req: SummarizeRequest) -> SummaryDraft {
        let timeout = self.default_timeout;
        let last_inbound = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if matches!(self.mode, RuntimeMode::Mock) {
            return SummaryDraft {
                summary: fallback::summary(&req.caller.caller_name, req.messages.len(), last_inbound),
                ..Default::default()
            };
        }

        if matches!(self.mode, RuntimeMode::HostIntegrated) {
            match self.host.summarize(&req, timeout).await {
                Ok(draft) => return draft,
                Err(e) => {
                    error!(conversation_id = %req.conversation_id, runtime_error = %e, "host-integrated summarize failed");
                    if !self.failover {
                        return SummaryDraft {
                            summary: fallback::summary(&req.caller.caller_name, req.messages.len(), last_inbound),
                            ..Default::default()
                        };
                    }
                }
            }
        }

        match self.generic.summarize(&req, timeout).await {
            Ok(draft) => draft,
            Err(e) => {
                error!(conversation_id = %req.conversation_id, runtime_error = %e, "generic summarize failed, synthesizing fallback summary");
                SummaryDraft {
                    summary: fallback::summary(&req.caller.caller_name, req.messages.len(), last_inbound),
                    ..Default::default()
                }
            }
        }
    }

    /// Fire-and-forget owner notification. A no-op when `level == None`.
    pub async fn notify(&self, req: NotifyRequest) {
        if matches!(req.level, NotifyLevel::None) || matches!(self.mode, RuntimeMode::Mock) {
            return;
        }
        let timeout = self.default_timeout;

        if matches!(self.mode, RuntimeMode::HostIntegrated) {
            match self.host.notify(&req, timeout).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(conversation_id = %req.conversation_id, runtime_error = %e, "host-integrated notify failed");
                    if !self.failover {
                        return;
                    }
                }
            }
        }

        if let Err(e) = self.generic.notify(&req, timeout).await {
            warn!(conversation_id = %req.conversation_id, runtime_error = %e, "generic notify failed, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallerInfo;

    fn caller() -> CallerInfo {
        CallerInfo {
            caller_name: "Alice".into(),
            owner_name: "Bob".into(),
            allowed_topics: vec!["scheduling".into()],
        }
    }

    #[tokio::test]
    async fn mock_mode_never_touches_a_subprocess() {
        let config = RuntimeAdapterConfig {
            mode: RuntimeMode::Mock,
            ..Default::default()
        };
        let adapter = RuntimeAdapter::new(&config).await;
        let text = adapter
            .run_turn(RunTurnRequest {
                conversation_id: "conv_1".into(),
                system_prompt: String::new(),
                message: "hi".into(),
                caller: caller(),
                context: vec![],
                trace_id: "t1".into(),
                timeout_ms: 1_000,
            })
            .await;
        assert!(text.contains("Alice"));
    }

    #[tokio::test]
    async fn generic_mode_without_a_configured_command_falls_back() {
        let config = RuntimeAdapterConfig {
            mode: RuntimeMode::Generic,
            agent_command: None,
            ..Default::default()
        };
        let adapter = RuntimeAdapter::new(&config).await;
        let text = adapter
            .run_turn(RunTurnRequest {
                conversation_id: "conv_1".into(),
                system_prompt: String::new(),
                message: "hi".into(),
                caller: caller(),
                context: vec![],
                trace_id: "t1".into(),
                timeout_ms: 1_000,
            })
            .await;
        assert!(text.contains("Alice"));
        assert!(text.contains("Bob"));
    }

    #[tokio::test]
    async fn a_fallback_turn_is_recorded_to_the_log_store() {
        let dir = tempfile::tempdir().unwrap();
        let log = std::sync::Arc::new(a2a_log::LogStore::open(dir.path().join("events.sqlite")).unwrap());
        let config = RuntimeAdapterConfig {
            mode: RuntimeMode::Generic,
            agent_command: None,
            ..Default::default()
        };
        let adapter = RuntimeAdapter::with_log(&config, Some(log.clone())).await;
        let text = adapter
            .run_turn(RunTurnRequest {
                conversation_id: "conv_1".into(),
                system_prompt: String::new(),
                message: "hi".into(),
                caller: caller(),
                context: vec![],
                trace_id: "t1".into(),
                timeout_ms: 1_000,
            })
            .await;
        assert!(text.contains("Alice"));

        let events = log
            .list(&a2a_log::LogFilter {
                conversation_id: Some("conv_1".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "generic_agent_command_failed");
    }

    #[tokio::test]
    async fn host_integrated_with_nonexistent_tool_fails_over_to_fallback() {
        let config = RuntimeAdapterConfig {
            mode: RuntimeMode::HostIntegrated,
            host_tool: "definitely-not-a-real-binary-xyz".into(),
            failover: true,
            agent_command: None,
            ..Default::default()
        };
        let adapter = RuntimeAdapter::new(&config).await;
        let text = adapter
            .run_turn(RunTurnRequest {
                conversation_id: "conv_1".into(),
                system_prompt: String::new(),
                message: "hi".into(),
                caller: caller(),
                context: vec![],
                trace_id: "t1".into(),
                timeout_ms: 1_000,
            })
            .await;
        assert!(text.contains("Alice"));
    }
}
