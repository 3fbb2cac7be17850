#![cfg(test)]

//! Shared fixture for handler tests: an `AppState` wired the same way
//! `main.rs` wires it, but over a temp-dir token store, an in-memory
//! conversation store, and the mock runtime adapter.

use std::sync::Arc;

use a2a_core::config::{RuntimeAdapterConfig, RuntimeConfig, RuntimeMode};
use a2a_core::types::Tier;
use a2a_monitor::CallMonitor;
use a2a_runtime::RuntimeAdapter;
use a2a_tokens::types::TokenSpec;
use a2a_tokens::TokenStore;
use tempfile::TempDir;

use crate::app::AppState;

pub(crate) struct Fixture {
    pub state: Arc<AppState>,
    pub wire_token: String,
    _tokens_dir: TempDir,
    _log_dir: TempDir,
}

pub(crate) async fn build() -> Fixture {
    let tokens_dir = tempfile::tempdir().unwrap();
    let tokens = TokenStore::open(tokens_dir.path().join("tokens.json")).unwrap();
    let (wire_token, _token) = tokens
        .create(TokenSpec {
            name: "Test Caller".to_string(),
            owner: "Bob".to_string(),
            tier: Tier::Friends,
            allowed_topics: None,
            allowed_goals: None,
            disclosure: None,
            notify: None,
            max_calls: None,
            rate_limits: None,
            expires_at: None,
            linked_contact_id: None,
        })
        .unwrap();

    let conn = rusqlite::Connection::open_in_memory().unwrap();
    a2a_conversations::db::init_db(&conn).unwrap();
    let conversations = Arc::new(a2a_conversations::ConversationStore::new(conn));

    let log_dir = tempfile::tempdir().unwrap();
    let log = Arc::new(a2a_log::LogStore::open(log_dir.path().join("events.sqlite")).unwrap());

    let runtime = Arc::new(
        RuntimeAdapter::new(&RuntimeAdapterConfig {
            mode: RuntimeMode::Mock,
            ..Default::default()
        })
        .await,
    );
    let monitor = Arc::new(CallMonitor::new(conversations.clone(), runtime.clone(), Default::default()));

    let state = Arc::new(AppState {
        config: RuntimeConfig::default(),
        tokens: Arc::new(tokens),
        conversations,
        log,
        runtime,
        monitor,
    });

    Fixture {
        state,
        wire_token,
        _tokens_dir: tokens_dir,
        _log_dir: log_dir,
    }
}
