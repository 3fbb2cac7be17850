//! `GET /api/a2a/ping` — unauthenticated liveness probe.

use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct PingReply {
    pub pong: bool,
    pub timestamp: chrono::DateTime<Utc>,
}

pub async fn ping_handler() -> impl IntoResponse {
    Json(PingReply {
        pong: true,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support;

    #[tokio::test]
    async fn ping_requires_no_auth_and_returns_pong() {
        let fixture = test_support::build().await;
        let app = crate::app::build_router(fixture.state);

        let request = Request::builder()
            .uri("/api/a2a/ping")
            .method("GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
