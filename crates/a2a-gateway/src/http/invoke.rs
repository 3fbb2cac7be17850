//! `POST /api/a2a/invoke` — bearer-authenticated conversational turn.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use a2a_codec::CodecOutput;
use a2a_conversations::{Role, StartSpec, Summary};
use a2a_core::types::{ConversationId, Direction, NotifyLevel, RequestId};
use a2a_runtime::{CallerInfo, NotifyRequest, RunTurnRequest, SummaryDraft, TurnMessage};

use crate::app::AppState;
use crate::error::{ErrorContext, GatewayError};
use crate::http::{extract_bearer, trace_id_from_headers};

#[derive(Deserialize)]
pub struct InvokeCaller {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
}

#[derive(Deserialize)]
pub struct InvokeContextMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct InvokeRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub caller: Option<InvokeCaller>,
    #[serde(default)]
    pub context: Vec<InvokeContextMessage>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Serialize)]
pub struct InvokeReply {
    pub success: bool,
    pub trace_id: String,
    pub request_id: String,
    pub conversation_id: String,
    pub response: String,
    pub can_continue: bool,
    pub tokens_remaining: Option<u64>,
}

pub async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> Response {
    let trace_id = trace_id_from_headers(&headers);
    let request_id = RequestId::new().to_string();
    let ctx = ErrorContext {
        trace_id: trace_id.clone(),
        request_id: request_id.clone(),
    };

    match handle(&state, &headers, req, &ctx).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error_code = err.code(), trace_id = %ctx.trace_id, "invoke rejected");
            state.log.write(
                a2a_log::LogEvent::new("gateway", a2a_log::Level::Warn, "invoke_rejected", err.to_string())
                    .with_trace(ctx.trace_id.clone())
                    .with_request(ctx.request_id.clone())
                    .with_error_code(err.code())
                    .with_status(err.status().as_u16()),
            );
            err.into_response(&ctx)
        }
    }
}

async fn handle(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    req: InvokeRequest,
    ctx: &ErrorContext,
) -> Result<Response, GatewayError> {
    let Some(bearer) = extract_bearer(headers) else {
        return Err(GatewayError::MissingToken);
    };

    let token = state
        .tokens
        .validate(bearer)
        .map_err(|e| GatewayError::Internal(e.to_string()))?
        .map_err(GatewayError::TokenInvalid)?;

    if req.message.trim().is_empty() {
        return Err(GatewayError::MissingMessage);
    }

    let contact_id = req
        .caller
        .as_ref()
        .and_then(|c| c.contact_id.clone())
        .unwrap_or_else(|| token.id.to_string());
    let contact_name = req
        .caller
        .as_ref()
        .and_then(|c| c.name.clone())
        .or_else(|| Some(token.name.clone()));

    let start = state
        .conversations
        .start(StartSpec {
            conversation_id: req.conversation_id.as_deref().map(|s| ConversationId::from(s)),
            contact_id,
            contact_name: contact_name.clone(),
            token_id: token.id.to_string(),
            direction: Direction::Inbound,
        })
        .map_err(|e| match e {
            a2a_conversations::ConversationError::TokenMismatch { .. } => GatewayError::PermissionDenied(
                "conversation belongs to a different token".to_string(),
            ),
            other => GatewayError::Internal(other.to_string()),
        })?;
    let conv_id = start.conversation.id.clone();

    // Per-conversation guard: append -> invoke runtime -> append -> meter
    // must not interleave with another /invoke call on the same conversation.
    let guard = state.conversations.guard(&conv_id);
    let _permit = guard.lock().await;

    let prior = state
        .conversations
        .get_messages(&conv_id, Some(20))
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    let context: Vec<TurnMessage> = prior
        .iter()
        .map(|m| TurnMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .chain(req.context.iter().map(|m| TurnMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }))
        .collect();

    state
        .conversations
        .append_message(&conv_id, Direction::Inbound, Role::User, &req.message, None)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    state.monitor.track(
        &conv_id,
        a2a_monitor::TrackedCaller {
            token_id: token.id.to_string(),
            caller_name: contact_name.clone().unwrap_or_else(|| "caller".to_string()),
            owner_name: token.owner.clone(),
            allowed_topics: token.allowed_topics.clone(),
            notify_level: token.notify,
        },
    );

    let max_timeout = state.config.gateway.max_timeout_secs;
    let requested_secs = req.timeout_seconds.unwrap_or(max_timeout).min(max_timeout).max(1);
    let system_prompt = format!(
        "You are {}'s A2A assistant speaking with {}. Allowed topics: {}. When the conversation \
         naturally concludes, append a <collab_state> JSON block describing phase, turn_count, and close_signal.",
        token.owner,
        contact_name.as_deref().unwrap_or("the caller"),
        if token.allowed_topics.is_empty() {
            "general".to_string()
        } else {
            token.allowed_topics.join(", ")
        },
    );

    let raw_response = state
        .runtime
        .run_turn(RunTurnRequest {
            conversation_id: conv_id.to_string(),
            system_prompt,
            message: req.message.clone(),
            caller: CallerInfo {
                caller_name: contact_name.clone().unwrap_or_else(|| "caller".to_string()),
                owner_name: token.owner.clone(),
                allowed_topics: token.allowed_topics.clone(),
            },
            context,
            trace_id: ctx.trace_id.clone(),
            timeout_ms: requested_secs * 1000,
        })
        .await;

    let CodecOutput {
        clean_text,
        state_patch,
        has_state,
        parse_error,
    } = a2a_codec::decode(&raw_response);

    if let Some(err) = &parse_error {
        warn!(conversation_id = %conv_id, parse_error = %err, "collab_state block present but malformed");
    }

    state
        .conversations
        .append_message(&conv_id, Direction::Outbound, Role::Assistant, &clean_text, None)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let min_turns = state.config.gateway.min_turns;
    let merged_state = if has_state {
        let patch = state_patch.unwrap_or_default();
        let current = state
            .conversations
            .get(&conv_id, Some(0))
            .map_err(|e| GatewayError::Internal(e.to_string()))?
            .map(|(conv, _)| conv.collab_state)
            .unwrap_or_default();
        let merged = current.merge(patch);
        state
            .conversations
            .save_collab_state(&conv_id, &merged)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        Some(merged)
    } else {
        None
    };

    let can_continue = !merged_state
        .as_ref()
        .map(|s| s.close_signal == Some(true) && s.turn_count.unwrap_or(0) >= min_turns)
        .unwrap_or(false);

    let metered = state
        .tokens
        .meter(&token.id)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    let tokens_remaining = metered.max_calls.map(|max| max.saturating_sub(metered.calls_made));

    if matches!(token.notify, NotifyLevel::All) {
        let runtime = state.runtime.clone();
        let notify_req = NotifyRequest {
            level: token.notify,
            token_name: token.name.clone(),
            caller_name: contact_name.clone().unwrap_or_else(|| "caller".to_string()),
            message: format!("New message from {}.", contact_name.as_deref().unwrap_or("a caller")),
            conversation_id: conv_id.to_string(),
            trace_id: ctx.trace_id.clone(),
        };
        tokio::spawn(async move {
            runtime.notify(notify_req).await;
        });
    }

    state.log.write(
        a2a_log::LogEvent::new("gateway", a2a_log::Level::Info, "invoke_completed", "turn handled")
            .with_trace(ctx.trace_id.clone())
            .with_request(ctx.request_id.clone())
            .with_conversation(conv_id.to_string())
            .with_token(token.id.to_string())
            .with_status(200),
    );

    let reply = InvokeReply {
        success: true,
        trace_id: ctx.trace_id.clone(),
        request_id: ctx.request_id.clone(),
        conversation_id: conv_id.to_string(),
        response: clean_text,
        can_continue,
        tokens_remaining,
    };
    let mut response = Json(reply).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&ctx.trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support;

    #[tokio::test]
    async fn missing_bearer_token_is_rejected() {
        let fixture = test_support::build().await;
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/invoke")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn a_valid_call_starts_a_conversation_and_responds() {
        let fixture = test_support::build().await;
        let wire_token = fixture.wire_token.clone();
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/invoke")
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {wire_token}"))
            .body(Body::from(r#"{"message": "Hello there"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert!(body["conversation_id"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn an_empty_message_is_rejected() {
        let fixture = test_support::build().await;
        let wire_token = fixture.wire_token.clone();
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/invoke")
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {wire_token}"))
            .body(Body::from(r#"{"message": "   "}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

/// Shared with `http::end` — translates a runtime-produced draft into the
/// conversation store's own summary shape.
pub(crate) fn draft_to_summary(draft: SummaryDraft) -> Summary {
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
