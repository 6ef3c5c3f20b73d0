use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use termvault::domain::{Clock, SystemClock};
use termvault::{
    api, config::Config, db::init_db, MaturityProcessor, PartialProfitRefresher, Repository,
    Scheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    if config.seed_default_plans {
        let seeded = repo
            .seed_default_plans()
            .await
            .context("Failed to seed default plans")?;
        if seeded > 0 {
            tracing::info!(plans = seeded, "Seeded default plan catalog");
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Scheduler::new(
        MaturityProcessor::new(repo.clone(), clock.clone(), config.settlement_retry_max),
        PartialProfitRefresher::new(repo.clone(), clock.clone(), config.profit_refresh_epsilon),
        config.maturity_interval,
        config.profit_refresh_interval,
    );
    if config.scheduler_enabled {
        scheduler.start();
    } else {
        tracing::warn!("Scheduler disabled; positions mature only on manual trigger");
    }

    let app = api::create_router(api::AppState::new(repo, clock, &config));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
