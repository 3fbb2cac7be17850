//! `GET /api/a2a/status` — unauthenticated capability probe.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use a2a_core::config::PROTOCOL_VERSION;
use a2a_tokens::types::RateLimits;

use crate::app::AppState;

#[derive(Serialize)]
pub struct StatusReply {
    pub a2a: bool,
    pub version: u32,
    pub build: &'static str,
    pub capabilities: Vec<&'static str>,
    pub rate_limits: RateLimits,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let _ = &state;
    Json(StatusReply {
        a2a: true,
        version: PROTOCOL_VERSION,
        build: env!("A2A_GIT_SHA"),
        capabilities: vec!["invoke", "end", "collab_state"],
        rate_limits: RateLimits::default(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support;

    #[tokio::test]
    async fn status_reports_the_protocol_version() {
        let fixture = test_support::build().await;
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/status")
            .method("GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["a2a"], true);
        assert_eq!(body["version"], a2a_core::config::PROTOCOL_VERSION);
    }
}
