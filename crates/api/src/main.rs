use autoblog_api::app::{build_app, services::build_services};
use autoblog_api::config::ServerConfig;
use autoblog_observability::LogConfig;

#[tokio::main]
async fn main() {
    autoblog_observability::init(&LogConfig::from_env());

    let config = ServerConfig::from_env();
    tracing::info!(
        max_concurrency = config.engine.max_concurrency,
        retention_days = config.engine.retention_days,
        "starting autoblog job engine"
    );

    let services = build_services(&config);
    let app = build_app(services.orchestrator.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {addr}"),
        Err(e) => tracing::warn!(error = %e, "listening on unknown address"),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    services.shutdown().await;
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
