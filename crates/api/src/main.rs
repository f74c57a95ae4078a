use anyhow::Context;

use docembed_api::app;
use docembed_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docembed_observability::init();

    let config = AppConfig::from_env()?;
    let services = app::build_services(&config).await?;

    // Optional in-process trigger alongside the external cron.
    let runner = config
        .dispatch_interval
        .map(|interval| services.dispatcher().clone().spawn_interval(interval));

    let router = app::build_app(&config, services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    if let Some(runner) = runner {
        let stats = runner.shutdown().await;
        tracing::info!(
            cycles = stats.cycles,
            processed = stats.jobs_processed,
            failed = stats.jobs_failed,
            "dispatch runner totals"
        );
    }
    Ok(())
}
