//! Synthetic Kubernetes control plane for what-if scheduling.
//!
//! This crate lets an unmodified scheduler binary place hypothetical pods
//! against a snapshot of a real cluster, without touching that cluster:
//!
//! - [`Brain`]: admits pods, applies bindings, forwards pod events
//! - [`scheduler_handler`]: the API-server routes the scheduler talks to
//! - [`Simulator`]: seeds a run and correlates the scheduler's verdicts
//! - [`advise`]: the operator-facing `/advise` and `/capacity` endpoints
//!
//! # Architecture
//!
//! ```text
//!   operator ──POST /advise──▶ Simulator ──seed──▶ ClusterState
//!                                  ▲                   ▲
//!                          events, errors              │ lists, bindings
//!                                  │                   │
//!                            SchedulerHandler ◀──HTTP── scheduler
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use risk_advisor_core::SimulationRequest;
//! use risk_advisor_simulator::{Simulator, SimulatorConfig};
//! use risk_advisor_state::{ClusterState, Snapshot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = Arc::new(ClusterState::from_snapshot(Snapshot::default()));
//! let simulator = Simulator::new(state, SimulatorConfig::default());
//!
//! // Point the scheduler at this address, then submit pods.
//! let addr = simulator.listen().await?;
//! println!("scheduler API on {addr}");
//!
//! let request: SimulationRequest =
//!     serde_json::from_str(r#"{"toCreate": [{"metadata": {"name": "web"}}]}"#)?;
//! for result in simulator.run(request).await? {
//!     println!("{:?}: {:?}", result.pod_name, result.result);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod advise;
pub mod brain;
pub mod config;
pub mod error;
pub mod gate;
pub mod init;
pub mod scheduler_handler;
pub mod simulator;
pub mod snapshot;

pub use brain::{Brain, EventOutcome, SchedulingEvent};
pub use config::SimulatorConfig;
pub use error::{Result, SimulationError};
pub use gate::FirstServeGate;
pub use init::initialize;
pub use simulator::{RunPhase, Simulator};
pub use snapshot::{KubeSnapshotSource, SnapshotSource};

#[cfg(any(test, feature = "test-utils"))]
pub use snapshot::mock::{FailingSnapshotSource, StaticSnapshotSource};
