//! Startup wiring.
//!
//! Setup failures do not stop the process: the advisory API is replaced with
//! one that reports the failure on every request.

use std::sync::Arc;

use axum::Router;
use risk_advisor_state::ClusterState;
use tracing::{error, info};

use crate::advise;
use crate::config::SimulatorConfig;
use crate::simulator::Simulator;
use crate::snapshot::SnapshotSource;
use crate::{Result, SimulationError};

/// Capture the snapshot, start the scheduler-facing API, and build the
/// advisory router. Falls back to a failing router on any setup error.
pub async fn initialize(config: &SimulatorConfig, source: &dyn SnapshotSource) -> Router {
    match setup(config, source).await {
        Ok(simulator) => advise::router(simulator, config.max_body_bytes),
        Err(e) => setup_failed(&e),
    }
}

/// Capture the snapshot and start a simulator over it.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be fetched or the scheduler-facing
/// address cannot be bound.
pub async fn setup(config: &SimulatorConfig, source: &dyn SnapshotSource) -> Result<Arc<Simulator>> {
    let snapshot = source.fetch().await?;
    let state = Arc::new(ClusterState::from_snapshot(snapshot));
    info!(
        pods = state.pod_count(),
        nodes = state.get_nodes().len(),
        resource_version = state.resource_version(),
        "Loaded cluster state"
    );

    let simulator = Arc::new(Simulator::new(state, config.clone()));
    simulator.listen().await?;
    Ok(simulator)
}

/// The router served after a setup failure.
pub fn setup_failed(error: &SimulationError) -> Router {
    error!(error = %error, "Simulator setup failed, advisory requests will fail");
    let message = match error {
        SimulationError::Setup(_) | SimulationError::Kube(_) => {
            format!("failed to fetch cluster state ({error})")
        }
        _ => format!("failed to start simulator ({error})"),
    };
    advise::failing_router(message)
}
