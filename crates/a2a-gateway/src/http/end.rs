//! `POST /api/a2a/end` — bearer-authenticated, idempotent conversation close.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use a2a_core::types::{ConversationId, RequestId};
use a2a_runtime::{CallerInfo, SummarizeRequest, TurnMessage};

use crate::app::AppState;
use crate::error::{ErrorContext, GatewayError};
use crate::http::{extract_bearer, trace_id_from_headers};

#[derive(Deserialize)]
pub struct EndRequest {
    pub conversation_id: String,
}

#[derive(Serialize)]
pub struct EndReply {
    pub success: bool,
    pub trace_id: String,
    pub request_id: String,
    pub conversation_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub async fn end_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<EndRequest>,
) -> Response {
    let trace_id = trace_id_from_headers(&headers);
    let request_id = RequestId::new().to_string();
    let ctx = ErrorContext {
        trace_id: trace_id.clone(),
        request_id: request_id.clone(),
    };

    match handle(&state, &headers, &req, &ctx).await {
        Ok(response) => response,
        Err(err) => err.into_response(&ctx),
    }
}

async fn handle(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    req: &EndRequest,
    ctx: &ErrorContext,
) -> Result<Response, GatewayError> {
    use axum::response::IntoResponse;

    let Some(bearer) = extract_bearer(headers) else {
        return Err(GatewayError::MissingToken);
    };
    if req.conversation_id.trim().is_empty() {
        return Err(GatewayError::MissingConversationId);
    }

    let token = state
        .tokens
        .validate(bearer)
        .map_err(|e| GatewayError::Internal(e.to_string()))?
        .map_err(GatewayError::TokenInvalid)?;

    let conv_id: ConversationId = req.conversation_id.as_str().into();
    let existing = state
        .conversations
        .get(&conv_id, None)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    let Some((conv, _messages)) = existing else {
        return Err(GatewayError::PermissionDenied(
            "conversation not found for this token".to_string(),
        ));
    };
    if conv.token_id != token.id.as_str() {
        return Err(GatewayError::PermissionDenied(
            "conversation belongs to a different token".to_string(),
        ));
    }

    let runtime = state.runtime.clone();
    let owner_name = token.owner.clone();
    let caller_name = conv.contact_name.clone().unwrap_or_else(|| conv.contact_id.clone());
    let allowed_topics = token.allowed_topics.clone();
    let trace_for_summary = ctx.trace_id.clone();
    let conv_id_for_summary = conv_id.to_string();

    let summarizer = move |messages: Vec<a2a_conversations::Message>| {
        let runtime = runtime.clone();
        let caller_name = caller_name.clone();
        let owner_name = owner_name.clone();
        let allowed_topics = allowed_topics.clone();
        let trace_id = trace_for_summary.clone();
        let conversation_id = conv_id_for_summary.clone();
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
            crate::http::invoke::draft_to_summary(draft)
        }
    };

    let concluded = state
        .conversations
        .conclude(&conv_id, summarizer)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    state.monitor.untrack(&conv_id);

    let reply = EndReply {
        success: true,
        trace_id: ctx.trace_id.clone(),
        request_id: ctx.request_id.clone(),
        conversation_id: concluded.id.to_string(),
        status: concluded.status.as_str(),
        summary: concluded.summary.summary.clone(),
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
    async fn ending_an_unknown_conversation_is_rejected() {
        let fixture = test_support::build().await;
        let wire_token = fixture.wire_token.clone();
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/end")
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {wire_token}"))
            .body(Body::from(r#"{"conversation_id": "conv_does_not_exist"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ending_an_active_conversation_concludes_it() {
        let fixture = test_support::build().await;
        let wire_token = fixture.wire_token.clone();
        let app = crate::app::build_router(fixture.state);

        let invoke_request = Request::builder()
            .uri("/api/a2a/invoke")
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {wire_token}"))
            .body(Body::from(r#"{"message": "Hello there"}"#))
            .unwrap();
        let invoke_response = app.clone().oneshot(invoke_request).await.unwrap();
        let bytes = to_bytes(invoke_response.into_body(), usize::MAX).await.unwrap();
        let invoke_body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let conversation_id = invoke_body["conversation_id"].as_str().unwrap().to_string();

        let end_request = Request::builder()
            .uri("/api/a2a/end")
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {wire_token}"))
            .body(Body::from(serde_json::json!({ "conversation_id": conversation_id }).to_string()))
            .unwrap();
        let end_response = app.oneshot(end_request).await.unwrap();
        assert_eq!(end_response.status(), StatusCode::OK);

        let bytes = to_bytes(end_response.into_body(), usize::MAX).await.unwrap();
        let end_body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(end_body["success"], true);
        assert_eq!(end_body["status"], "concluded");
    }
}
