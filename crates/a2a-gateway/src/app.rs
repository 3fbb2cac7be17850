use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use a2a_conversations::ConversationStore;
use a2a_core::config::RuntimeConfig;
use a2a_log::LogStore;
use a2a_monitor::CallMonitor;
use a2a_runtime::RuntimeAdapter;
use a2a_tokens::TokenStore;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: RuntimeConfig,
    pub tokens: Arc<TokenStore>,
    pub conversations: Arc<ConversationStore>,
    pub log: Arc<LogStore>,
    pub runtime: Arc<RuntimeAdapter>,
    pub monitor: Arc<CallMonitor>,
}

/// Assemble the full Axum router. The a2a wire surface is nested under
/// `/api/a2a` so a host process can mount other routes alongside it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let a2a_routes = Router::new()
        .route("/ping", get(crate::http::ping::ping_handler))
        .route("/status", get(crate::http::status::status_handler))
        .route("/invoke", post(crate::http::invoke::invoke_handler))
        .route("/end", post(crate::http::end::end_handler));

    Router::new()
        .nest("/api/a2a", a2a_routes)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
