use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use a2a_codec::{decode, CodecOutput};
use a2a_conversations::{ConversationStore, Message, Role, StartSpec, Summary};
use a2a_core::types::{Direction, TraceId};
use a2a_runtime::{CallerInfo, RunTurnRequest, RuntimeAdapter, SummarizeRequest, SummaryDraft, TurnMessage};

use crate::error::{DriverError, Result};
use crate::invite::Invite;
use crate::types::{
    DriverConfig, DriverOutcome, EndWireReply, EndWireRequest, InvokeWireReply, InvokeWireRequest,
    OutboundCaller, StopReason, WireCaller,
};

/// Drives an adaptive multi-turn conversation against a remote peer's
/// `/invoke`/`/end` surface — the mirror image of the inbound pipeline, run
/// from the calling side.
///
/// Holds one shared `reqwest::Client`, built once at construction rather
/// than per request.
pub struct Driver {
    client: reqwest::Client,
    runtime: Arc<RuntimeAdapter>,
    conversations: Arc<ConversationStore>,
    config: DriverConfig,
}

impl Driver {
    pub fn new(runtime: Arc<RuntimeAdapter>, conversations: Arc<ConversationStore>, config: DriverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.client_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            runtime,
            conversations,
            config,
        })
    }

    /// Drive up to `config.max_turns` turns against `invite`, starting with
    /// `opening_message`. `system_prompt` seeds every local turn generation.
    pub async fn run(
        &self,
        invite: &Invite,
        caller: OutboundCaller,
        owner_name: String,
        allowed_topics: Vec<String>,
        opening_message: String,
        system_prompt: String,
    ) -> Result<DriverOutcome> {
        let trace_id = TraceId::new().to_string();

        let local = self.conversations.start(StartSpec {
            conversation_id: None,
            contact_id: caller.contact_id.clone().unwrap_or_else(|| invite.host.clone()),
            contact_name: caller.name.clone(),
            token_id: format!("outbound:{}", invite.host),
            direction: Direction::Outbound,
        })?;
        let conv_id = local.conversation.id.clone();

        let mut peer_conversation_id: Option<String> = None;
        let mut message = opening_message;
        let mut turns_run: u32 = 0;
        let stop_reason;

        loop {
            self.conversations
                .append_message(&conv_id, Direction::Outbound, Role::User, &message, None)?;

            let invoke_req = InvokeWireRequest {
                message: message.clone(),
                conversation_id: peer_conversation_id.clone(),
                caller: Some(WireCaller {
                    name: caller.name.clone(),
                    contact_id: caller.contact_id.clone(),
                }),
                timeout_seconds: Some(self.config.client_timeout_secs),
            };

            let peer_reply = match self.send_invoke(invite, &invoke_req).await {
                Ok(reply) if reply.success => reply,
                Ok(reply) => {
                    warn!(conversation_id = %conv_id, error = ?reply.error, "peer rejected invoke, stopping driver");
                    stop_reason = StopReason::RemoteCallFailed;
                    break;
                }
                Err(e) => {
                    warn!(conversation_id = %conv_id, error = %e, "outbound invoke failed, stopping driver");
                    stop_reason = StopReason::RemoteCallFailed;
                    break;
                }
            };

            if peer_conversation_id.is_none() {
                peer_conversation_id = peer_reply.conversation_id.clone();
            }
            let peer_text = peer_reply.response.unwrap_or_default();
            self.conversations
                .append_message(&conv_id, Direction::Inbound, Role::Assistant, &peer_text, None)?;
            turns_run += 1;

            let peer_can_continue = peer_reply.can_continue.unwrap_or(true);
            if !peer_can_continue {
                stop_reason = StopReason::PeerDeclinedToContinue;
                break;
            }
            if turns_run >= self.config.max_turns {
                stop_reason = StopReason::MaxTurnsReached;
                break;
            }

            let local_reply = self
                .runtime
                .run_turn(RunTurnRequest {
                    conversation_id: conv_id.to_string(),
                    system_prompt: system_prompt.clone(),
                    message: peer_text,
                    caller: CallerInfo {
                        caller_name: caller.name.clone().unwrap_or_else(|| "peer".to_string()),
                        owner_name: owner_name.clone(),
                        allowed_topics: allowed_topics.clone(),
                    },
                    context: vec![],
                    trace_id: trace_id.clone(),
                    timeout_ms: self.config.client_timeout_secs * 1000,
                })
                .await;

            let CodecOutput {
                clean_text,
                state_patch,
                has_state,
                parse_error,
            } = decode(&local_reply);
            if let Some(err) = &parse_error {
                warn!(conversation_id = %conv_id, parse_error = %err, "collab_state block present but malformed");
            }

            let mut local_close = false;
            if has_state {
                let patch = state_patch.unwrap_or_default();
                let current = self
                    .conversations
                    .get(&conv_id, Some(0))?
                    .map(|(conv, _)| conv.collab_state)
                    .unwrap_or_default();
                let merged = current.merge(patch);
                local_close =
                    merged.close_signal == Some(true) && merged.turn_count.unwrap_or(0) >= self.config.min_turns;
                self.conversations.save_collab_state(&conv_id, &merged)?;
            }

            if local_close {
                stop_reason = StopReason::LocalCloseSignal;
                break;
            }

            message = clean_text;
        }

        let peer_ended = match &peer_conversation_id {
            Some(peer_conv_id) => self.send_end(invite, peer_conv_id).await,
            None => false,
        };

        let runtime = self.runtime.clone();
        let owner_name_for_summary = owner_name;
        let allowed_topics_for_summary = allowed_topics;
        let caller_name_for_summary = caller.name.unwrap_or_else(|| "peer".to_string());
        let conv_id_for_summary = conv_id.to_string();
        let trace_for_summary = trace_id;

        let summarizer = move |messages: Vec<Message>| {
            let runtime = runtime.clone();
            let owner_name = owner_name_for_summary.clone();
            let allowed_topics = allowed_topics_for_summary.clone();
            let caller_name = caller_name_for_summary.clone();
            let conversation_id = conv_id_for_summary.clone();
            let trace_id = trace_for_summary.clone();
            async move {
                let draft = runtime
                    .summarize(SummarizeRequest {
                        conversation_id,
                        system_prompt: String::new(),
                        messages: messages
                            .iter()
                            .map(|m| TurnMessage {
                                role: m.role.as_str().to_string(),
                                content: m.content.clone(),
                            })
                            .collect(),
                        caller: CallerInfo {
                            caller_name,
                            owner_name,
                            allowed_topics,
                        },
                        trace_id,
                    })
                    .await;
                draft_to_summary(draft)
            }
        };

        self.conversations.conclude(&conv_id, summarizer).await?;

        Ok(DriverOutcome {
            conversation_id: conv_id,
            turns_run,
            stop_reason,
            peer_ended,
        })
    }

    async fn send_invoke(&self, invite: &Invite, req: &InvokeWireRequest) -> Result<InvokeWireReply> {
        let resp = self
            .client
            .post(invite.invoke_url())
            .bearer_auth(invite.bearer())
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(DriverError::PeerRejected(resp.status().as_u16()));
        }
        let reply: InvokeWireReply = resp.json().await?;
        Ok(reply)
    }

    /// Best-effort: a failed `/end` never blocks the local conclusion.
    async fn send_end(&self, invite: &Invite, peer_conversation_id: &str) -> bool {
        let req = EndWireRequest {
            conversation_id: peer_conversation_id.to_string(),
        };
        let result = self
            .client
            .post(invite.end_url())
            .bearer_auth(invite.bearer())
            .json(&req)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<EndWireReply>().await.map(|r| r.success).unwrap_or(false)
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "peer /end returned non-success, concluding locally anyway");
                false
            }
            Err(e) => {
                warn!(error = %e, "peer /end unreachable, concluding locally anyway");
                false
            }
        }
    }
}

fn draft_to_summary(draft: SummaryDraft) -> Summary {
    Summary {
        summary: if draft.summary.trim().is_empty() {
            None
        } else {
            Some(draft.summary)
        },
        owner_summary: draft.owner_summary,
        owner_relevance: draft.owner_relevance.and_then(|s| s.parse().ok()),
        owner_goals_touched: draft.owner_goals_touched,
        owner_action_items: draft.owner_action_items,
        caller_action_items: draft.caller_action_items,
        joint_action_items: draft.joint_action_items,
        collaboration_opportunity: draft.collaboration_opportunity,
        follow_up: draft.follow_up,
        notes: draft.notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_core::config::{RuntimeAdapterConfig, RuntimeMode};
    use rusqlite::Connection;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store() -> Arc<ConversationStore> {
        let conn = Connection::open_in_memory().unwrap();
        a2a_conversations::db::init_db(&conn).unwrap();
        Arc::new(ConversationStore::new(conn))
    }

    fn invite_for(server: &MockServer) -> Invite {
        let host_port = server.uri().strip_prefix("http://").unwrap().to_string();
        Invite::parse(&format!("a2a://{host_port}/fed_test")).unwrap()
    }

    async fn mock_adapter() -> Arc<RuntimeAdapter> {
        Arc::new(
            RuntimeAdapter::new(&RuntimeAdapterConfig {
                mode: RuntimeMode::Mock,
                ..Default::default()
            })
            .await,
        )
    }

    #[tokio::test]
    async fn stops_when_peer_declines_to_continue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/a2a/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "conversation_id": "conv_peer_1",
                "response": "Thanks, all set.",
                "can_continue": false,
                "tokens_remaining": 10
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/a2a/end"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "status": "concluded"})))
            .mount(&server)
            .await;

        let invite = invite_for(&server);

        let driver = Driver::new(mock_adapter().await, store(), DriverConfig::default()).unwrap();
        let outcome = driver
            .run(
                &invite,
                OutboundCaller {
                    name: Some("Alice".to_string()),
                    contact_id: None,
                },
                "Bob".to_string(),
                vec!["scheduling".to_string()],
                "Hi, want to coordinate on the offsite?".to_string(),
                "You are Bob's outbound emissary.".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.turns_run, 1);
        assert_eq!(outcome.stop_reason, StopReason::PeerDeclinedToContinue);
        assert!(outcome.peer_ended);
    }

    #[tokio::test]
    async fn stops_after_max_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/a2a/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "conversation_id": "conv_peer_2",
                "response": "Sure, tell me more.",
                "can_continue": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/a2a/end"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "status": "concluded"})))
            .mount(&server)
            .await;

        let invite = invite_for(&server);

        let mut config = DriverConfig::default();
        config.max_turns = 2;
        let driver = Driver::new(mock_adapter().await, store(), config).unwrap();
        let outcome = driver
            .run(
                &invite,
                OutboundCaller::default(),
                "Bob".to_string(),
                vec![],
                "Opening line".to_string(),
                "system prompt".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.turns_run, 2);
        assert_eq!(outcome.stop_reason, StopReason::MaxTurnsReached);
    }

    #[tokio::test]
    async fn a_failed_invoke_stops_gracefully_without_raising() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/a2a/invoke"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let invite = invite_for(&server);

        let driver = Driver::new(mock_adapter().await, store(), DriverConfig::default()).unwrap();
        let outcome = driver
            .run(
                &invite,
                OutboundCaller::default(),
                "Bob".to_string(),
                vec![],
                "Opening line".to_string(),
                "system prompt".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.turns_run, 0);
        assert_eq!(outcome.stop_reason, StopReason::RemoteCallFailed);
        assert!(!outcome.peer_ended);
    }
}
