//! Risk Advisor Simulator - what-if scheduling service
//!
//! Captures a snapshot of the cluster at startup and serves two APIs:
//!
//! - the scheduler-facing API on `SCHEDULER_ADDR`, where an unmodified
//!   scheduler runs against the synthetic cluster
//! - the advisory API on `ADVISE_ADDR`
//!
//! # HTTP Endpoints (advisory)
//!
//! - `GET /health` - Health check
//! - `GET /advise` - Alive check
//! - `POST /advise` - Simulate scheduling of a set of pods
//! - `POST /capacity` - Count how many copies of a pod template fit

use risk_advisor_simulator::init::{initialize, setup_failed};
use risk_advisor_simulator::{KubeSnapshotSource, SimulatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,risk_advisor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Risk Advisor Simulator");

    let config = SimulatorConfig::from_env();
    tracing::info!(
        advise_addr = %config.advise_addr,
        scheduler_addr = %config.scheduler_addr,
        apiserver_url = config.apiserver_url.as_deref().unwrap_or("<ambient>"),
        run_timeout_seconds = config.run_timeout_seconds,
        "Loaded simulator configuration"
    );

    let app = match KubeSnapshotSource::new(&config).await {
        Ok(source) => initialize(&config, &source).await,
        Err(e) => setup_failed(&e),
    };

    tracing::info!(listen_addr = %config.advise_addr, "Starting advisory HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.advise_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
