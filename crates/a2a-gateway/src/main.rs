use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod error;
mod http;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "a2a_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > A2A_CONFIG env > ~/.a2a/a2a.toml
    let config_path = std::env::var("A2A_CONFIG").ok();
    let config = a2a_core::config::RuntimeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        a2a_core::config::RuntimeConfig::default()
    });

    let tokens = Arc::new(a2a_tokens::TokenStore::open(&config.database.tokens_path)?);

    let conn = rusqlite::Connection::open(&config.database.conversations_path)?;
    a2a_conversations::db::init_db(&conn)?;
    let conversations = Arc::new(a2a_conversations::ConversationStore::new(conn));

    let log = Arc::new(a2a_log::LogStore::open(&config.database.log_path)?);

    let runtime = Arc::new(a2a_runtime::RuntimeAdapter::with_log(&config.runtime, Some(log.clone())).await);
    let monitor = Arc::new(a2a_monitor::CallMonitor::new(
        conversations.clone(),
        runtime.clone(),
        config.monitor.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            monitor.run(shutdown_rx).await;
        });
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState {
        config,
        tokens,
        conversations,
        log,
        runtime,
        monitor,
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("a2a gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Resolves once the process receives Ctrl+C (or, on Unix, SIGTERM) so
/// `axum::serve`'s graceful shutdown — and in turn the call monitor's own
/// `watch`-driven shutdown below it — actually fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
