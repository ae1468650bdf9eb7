//! flagkeep API Server Entry Point
//!
//! Bootstraps logging and configuration, migrates the schema, and starts
//! the Axum HTTP server.

use std::sync::Arc;

use flagkeep_api::telemetry::{init_tracing, TelemetryConfig};
use flagkeep_api::{
    create_router, ApiError, ApiResult, AppConfig, AppState, FlagService, Migrator,
    PgFlagRepository,
};
use flagkeep_storage::{ExpiringCache, FlagStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry = TelemetryConfig::from_lookup(&|key: &str| std::env::var(key).ok());
    init_tracing(&telemetry)?;

    let config = AppConfig::from_env()?;

    let pool = config.db.create_pool()?;
    let steps = Migrator::new(pool.clone())
        .run(config.migration.action)
        .await?;
    tracing::info!(applied = steps.len(), "Schema migrations complete");

    let cache = Arc::new(ExpiringCache::new(config.cache.cache_config()));
    let repo = Arc::new(PgFlagRepository::new(pool));
    let store = FlagStore::new(repo, cache);
    let service = FlagService::new(store, config.service.clone());
    tracing::info!(
        update_policy = %config.service.update_policy,
        cache_capacity = config.cache.capacity.get(),
        cache_ttl_secs = config.cache.ttl.as_secs(),
        "Flag service ready"
    );

    let app = create_router(AppState::new(service, config.server.request_timeout));

    let addr = config.server.bind_addr()?;
    tracing::info!(%addr, "Starting flagkeep API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = drain_tx.send(());
    });
    let mut server = tokio::spawn(async move { serve.await });

    // Once the signal fires, in-flight requests get at most this long.
    let shutdown_timeout = config.server.shutdown_timeout;

    tokio::select! {
        result = &mut server => {
            return join_result(result);
        }
        _ = drain_rx => {
            tracing::info!(timeout_secs = shutdown_timeout.as_secs(), "Draining in-flight requests");
        }
    }

    match tokio::time::timeout(shutdown_timeout, &mut server).await {
        Ok(result) => join_result(result),
        Err(_) => {
            tracing::warn!("Shutdown timeout elapsed; aborting remaining connections");
            server.abort();
            Ok(())
        }
    }
}

fn join_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> ApiResult<()> {
    match result {
        Ok(Ok(())) => {
            tracing::info!("Server stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(ApiError::internal_error(format!("Server error: {}", e))),
        Err(e) => Err(ApiError::internal_error(format!("Server task failed: {}", e))),
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
