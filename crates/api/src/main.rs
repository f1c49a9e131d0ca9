use anyhow::Context;

use umrahops_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging first so configuration warnings are not lost; a bad LOG_FORMAT
    // is still reported by `from_env`.
    let log_format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or_default();
    umrahops_observability::init(log_format);
    let config = AppConfig::from_env()?;

    let app = umrahops_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    app.services.shutdown_workers();
    Ok(())
}
