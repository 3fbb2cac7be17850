use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{error, info, warn};

use a2a_conversations::{ConversationStore, Message as ConvMessage, Summary};
use a2a_core::config::MonitorConfig;
use a2a_core::types::ConversationId;
use a2a_runtime::{CallerInfo, NotifyRequest, RuntimeAdapter, SummarizeRequest, SummaryDraft, TurnMessage};

use crate::types::{ConcludeReason, TrackedCall, TrackedCaller};

/// Tracks active conversations in memory and concludes the ones that have
/// gone idle or run too long. `ConversationStore` remains the source of
/// truth for "is this still active" — the in-memory table only exists so a
/// tick doesn't need a database round trip to decide what to check.
pub struct CallMonitor {
    config: MonitorConfig,
    store: Arc<ConversationStore>,
    runtime: Arc<RuntimeAdapter>,
    tracked: DashMap<String, TrackedCall>,
}

impl CallMonitor {
    pub fn new(store: Arc<ConversationStore>, runtime: Arc<RuntimeAdapter>, config: MonitorConfig) -> Self {
        Self {
            config,
            store,
            runtime,
            tracked: DashMap::new(),
        }
    }

    /// Record (or refresh) activity for a conversation. Called by the inbound
    /// pipeline on every successful turn.
    pub fn track(&self, conversation_id: &ConversationId, caller: TrackedCaller) {
        let now = Utc::now();
        self.tracked
            .entry(conversation_id.to_string())
            .and_modify(|c| c.last_activity = now)
            .or_insert(TrackedCall {
                caller,
                started_at: now,
                last_activity: now,
            });
    }

    /// Stop tracking a conversation that concluded through the normal
    /// pipeline (peer ended it, `/end` was called) rather than through this
    /// monitor's own tick.
    pub fn untrack(&self, conversation_id: &ConversationId) {
        self.tracked.remove(&conversation_id.to_string());
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Re-populate the tracked table from conversations the store still
    /// considers active — covers a process restart losing the in-memory
    /// table while conversations remain open in the database.
    pub fn reconcile_on_startup(&self) {
        let active = match self.store.active() {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to load active conversations for monitor reconciliation");
                return;
            }
        };
        for conv in active {
            self.tracked.entry(conv.id.to_string()).or_insert_with(|| TrackedCall {
                caller: TrackedCaller {
                    token_id: conv.token_id.clone(),
                    caller_name: conv.contact_name.clone().unwrap_or_else(|| conv.contact_id.clone()),
                    owner_name: String::new(),
                    allowed_topics: Vec::new(),
                    notify_level: a2a_core::types::NotifyLevel::Summary,
                },
                started_at: conv.started_at,
                last_activity: conv.last_message_at,
            });
        }
        if !self.tracked.is_empty() {
            info!(count = self.tracked.len(), "call monitor reconciled active conversations on startup");
        }
    }

    /// Main tick loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.config.tick_secs, "call monitor started");
        self.reconcile_on_startup();

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("call monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let idle_timeout = chrono::Duration::seconds(self.config.idle_timeout_secs as i64);
        let max_duration = chrono::Duration::seconds(self.config.max_duration_secs as i64);

        let due: Vec<(String, ConcludeReason, TrackedCaller)> = self
            .tracked
            .iter()
            .filter_map(|entry| {
                let duration = now - entry.started_at;
                let idle = now - entry.last_activity;
                if duration > max_duration {
                    Some((entry.key().clone(), ConcludeReason::MaxDuration, entry.caller.clone()))
                } else if idle > idle_timeout {
                    Some((entry.key().clone(), ConcludeReason::IdleTimeout, entry.caller.clone()))
                } else {
                    None
                }
            })
            .collect();

        for (conversation_id, reason, caller) in due {
            // Only drop a conversation from the tracked table once it is
            // actually concluded — a failed attempt stays tracked so the
            // next tick retries it instead of leaking it as untracked but
            // still active in the store.
            if self.conclude_one(&conversation_id, reason, caller).await {
                self.tracked.remove(&conversation_id);
            }
        }
    }

    /// Returns whether the conversation was concluded.
    async fn conclude_one(&self, conversation_id: &str, reason: ConcludeReason, caller: TrackedCaller) -> bool {
        let conv_id: ConversationId = conversation_id.into();
        let runtime = Arc::clone(&self.runtime);
        let summarize_caller = caller.clone();
        let summarize_conv_id = conversation_id.to_string();

        let summarizer = move |messages: Vec<ConvMessage>| {
            let runtime = Arc::clone(&runtime);
            let caller = summarize_caller;
            let conv_id = summarize_conv_id;
            async move {
                let draft = runtime
                    .summarize(SummarizeRequest {
                        conversation_id: conv_id.clone(),
                        system_prompt: String::new(),
                        messages: messages
                            .iter()
                            .map(|m| TurnMessage {
                                role: m.role.as_str().to_string(),
                                content: m.content.clone(),
                            })
                            .collect(),
                        caller: CallerInfo {
                            caller_name: caller.caller_name.clone(),
                            owner_name: caller.owner_name.clone(),
                            allowed_topics: caller.allowed_topics.clone(),
                        },
                        trace_id: conv_id,
                    })
                    .await;
                draft_to_summary(draft)
            }
        };

        let result = match reason {
            ConcludeReason::MaxDuration => self.store.conclude(&conv_id, summarizer).await,
            ConcludeReason::IdleTimeout => self.store.timeout(&conv_id, summarizer).await,
        };

        match result {
            Ok(conv) => {
                info!(conversation_id = %conv.id, reason = reason.as_str(), "call monitor concluded conversation");
                let runtime = Arc::clone(&self.runtime);
                let notify_req = NotifyRequest {
                    level: caller.notify_level,
                    token_name: caller.token_id.clone(),
                    caller_name: caller.caller_name.clone(),
                    message: format!(
                        "Conversation with {} ended ({}).",
                        caller.caller_name,
                        reason.as_str()
                    ),
                    conversation_id: conv.id.to_string(),
                    trace_id: conv.id.to_string(),
                };
                tokio::spawn(async move {
                    runtime.notify(notify_req).await;
                });
                true
            }
            Err(e) => {
                warn!(conversation_id = %conv_id, error = %e, "call monitor failed to conclude conversation, will retry next tick");
                false
            }
        }
    }
}

fn draft_to_summary(draft: SummaryDraft) -> Summary {
    Summary {
        summary: if draft.summary.trim().is_empty() { None } else { Some(draft.summary) },
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

    fn caller() -> TrackedCaller {
        TrackedCaller {
            token_id: "tok_1".into(),
            caller_name: "Alice".into(),
            owner_name: "Bob".into(),
            allowed_topics: vec![],
            notify_level: a2a_core::types::NotifyLevel::Summary,
        }
    }

    async fn monitor_with(store: Arc<ConversationStore>) -> CallMonitor {
        let config = MonitorConfig {
            tick_secs: 1,
            idle_timeout_secs: 60,
            max_duration_secs: 300,
        };
        let runtime_config = a2a_core::config::RuntimeAdapterConfig {
            mode: a2a_core::config::RuntimeMode::Mock,
            ..Default::default()
        };
        let runtime = Arc::new(RuntimeAdapter::new(&runtime_config).await);
        CallMonitor::new(store, runtime, config)
    }

    #[tokio::test]
    async fn track_then_untrack_clears_the_table() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        a2a_conversations::db::init_db(&conn).unwrap();
        let store = Arc::new(ConversationStore::new(conn));
        let monitor = monitor_with(store).await;
        let id: ConversationId = "conv_test".into();
        monitor.track(&id, caller());
        assert_eq!(monitor.tracked_count(), 1);
        monitor.untrack(&id);
        assert_eq!(monitor.tracked_count(), 0);
    }

    #[tokio::test]
    async fn a_failed_conclude_stays_tracked_for_the_next_tick() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        a2a_conversations::db::init_db(&conn).unwrap();
        let store = Arc::new(ConversationStore::new(conn));
        let monitor = monitor_with(store).await;

        // A conversation the store has never heard of: `conclude` returns
        // `NotFound`, so this tick must leave it tracked rather than drop it
        // as if it had concluded.
        let id: ConversationId = "conv_missing".into();
        monitor.tracked.insert(
            id.to_string(),
            TrackedCall {
                caller: caller(),
                started_at: Utc::now() - chrono::Duration::seconds(3600),
                last_activity: Utc::now() - chrono::Duration::seconds(3600),
            },
        );

        monitor.tick().await;

        assert_eq!(monitor.tracked_count(), 1);
    }
}
