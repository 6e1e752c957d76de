use anyhow::Result;
use clap::Parser;
use odds_ingest::api::OddsApiClient;
use odds_ingest::config::Config;
use odds_ingest::messaging::NatsPublisher;
use odds_ingest::orchestrator::Orchestrator;
use odds_ingest::scheduler::CycleDriver;
use odds_ingest::store::{PgOddsStore, StoreConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Odds ingestion worker: polls the vendor on a fixed interval and fans
/// results out to PostgreSQL and NATS.
#[derive(Debug, Parser)]
#[command(name = "worker")]
struct Args {
    /// Run a single ingestion cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Odds ingest worker starting (sport: {}, interval: {:?})",
        config.sport_key, config.cycle_interval
    );

    let source = OddsApiClient::new(
        config.odds_api_key.clone(),
        config.sport_key.clone(),
        config.regions.clone(),
    );
    let store = PgOddsStore::connect(&StoreConfig::new(
        config.database_url.clone(),
        config.database_password.clone(),
    ))?;
    let publisher = Arc::new(NatsPublisher::new(config.nats_url.clone()));

    let orchestrator = Orchestrator::new(source, store, Arc::clone(&publisher));

    if args.once {
        let outcome = orchestrator.run_cycle().await;
        publisher.disconnect().await;
        let outcome = outcome?;
        info!("Single cycle finished: {:?}", outcome);
        return Ok(());
    }

    let mut driver = CycleDriver::new(orchestrator, config.cycle_interval);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received termination signal, starting graceful shutdown...");
        let _ = shutdown_tx.send(()).await;
    });

    // Blocks until shutdown, then drains the in-flight cycle.
    driver.run(shutdown_rx).await;

    // Bus teardown happens last, after the cycle drain.
    publisher.disconnect().await;

    info!("Graceful shutdown completed");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };

        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
