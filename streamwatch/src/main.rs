use std::time::Duration;

use streamwatch::config::AppConfig;
use streamwatch::services::ServiceContainer;
use streamwatch::{database, logging, utils};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Initialize logging; keep the guard alive until exit
    let (logging_config, _log_guard) = logging::init_logging(config.log_dir.as_deref())?;

    utils::http_client::install_rustls_provider();

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool.clone(), &config)?;
    logging_config.start_retention_cleanup(container.cancellation_token());

    info!("streamwatch {} started", env!("CARGO_PKG_VERSION"));

    let run = container.run();
    tokio::pin!(run);

    let finished = tokio::select! {
        report = &mut run => Some(report),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            container.shutdown();
            None
        }
    };

    let report = match finished {
        Some(report) => report,
        None => {
            let limit = config.shutdown_timeout + Duration::from_secs(5);
            match tokio::time::timeout(limit, &mut run).await {
                Ok(report) => report,
                Err(_) => {
                    error!("Scheduler did not stop within {:?}", limit);
                    pool.close().await;
                    return Ok(());
                }
            }
        }
    };

    info!(
        "Stopped {} host workers ({} graceful)",
        report.total_workers, report.graceful_stops
    );
    pool.close().await;

    Ok(())
}
