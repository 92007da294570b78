//! Simulation runs and the capacity probe.
//!
//! A run seeds the synthetic cluster with the submitted pods, lets the
//! external scheduler act on them through the scheduler-facing API, and
//! correlates the scheduler's pod events back to the submitted names:
//!
//! ```text
//! Idle -> Seeding -> Listening -> Correlating -> Completed
//!                                             \-> Aborted
//! ```
//!
//! Any error a handler reports during a run aborts it. Runs are serialized;
//! the pods a run adds or removes are put back when it ends.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use k8s_openapi::api::core::v1::Pod;
use risk_advisor_core::{
    generate_pod_name, probe_pod_name, CapacityResult, SchedulingResult, SimulationRequest,
    FAILED_SCHEDULING,
};
use risk_advisor_state::ClusterState;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::brain::{Brain, SchedulingEvent};
use crate::config::SimulatorConfig;
use crate::gate::FirstServeGate;
use crate::scheduler_handler::{self, ErrorReporter, HandlerState};
use crate::{Result, SimulationError};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// No run in progress.
    #[default]
    Idle,
    /// Submitted pods are being admitted.
    Seeding,
    /// The scheduler-facing API is being brought up.
    Listening,
    /// Waiting for the scheduler's verdicts.
    Correlating,
    /// The last run returned results.
    Completed,
    /// The last run ended with an error.
    Aborted,
}

/// Receiving ends of the handler-to-run hand-off.
struct RunChannels {
    events: mpsc::Receiver<SchedulingEvent>,
    errors: mpsc::Receiver<SimulationError>,
}

impl RunChannels {
    /// Discard anything left over from traffic between runs.
    fn drain(&mut self) {
        let mut stale = 0usize;
        while let Ok(event) = self.events.try_recv() {
            debug!(pod = %event.involved_object_name, reason = %event.reason, "Discarding stale event");
            stale += 1;
        }
        while let Ok(err) = self.errors.try_recv() {
            debug!(error = %err, "Discarding stale error");
            stale += 1;
        }
        if stale > 0 {
            info!(stale, "Drained stale scheduler traffic");
        }
    }

    /// Wait for the next event, failing fast on a reported error.
    async fn next_event(&mut self) -> Result<SchedulingEvent> {
        tokio::select! {
            biased;
            Some(err) = self.errors.recv() => Err(err),
            Some(event) = self.events.recv() => Ok(event),
            else => Err(SimulationError::ChannelClosed("scheduling events")),
        }
    }
}

/// Changes a run made to the cluster, undone when it is dropped.
struct RunScope {
    state: Arc<ClusterState>,
    seeded: Vec<String>,
    removed: Vec<Pod>,
}

impl RunScope {
    fn new(state: Arc<ClusterState>) -> Self {
        Self {
            state,
            seeded: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        for name in self.seeded.drain(..) {
            self.state.remove_pod(&name);
        }
        for pod in self.removed.drain(..) {
            self.state.add_pod(pod);
        }
    }
}

/// Runs simulations against a synthetic cluster.
pub struct Simulator {
    brain: Arc<Brain>,
    config: SimulatorConfig,
    gate: FirstServeGate,
    error_tx: mpsc::Sender<SimulationError>,
    channels: Mutex<RunChannels>,
    listener: OnceCell<SocketAddr>,
    phase: parking_lot::Mutex<RunPhase>,
}

impl Simulator {
    /// Create a simulator over `state`.
    ///
    /// The scheduler-facing API is not bound until [`Simulator::listen`] or the
    /// first run.
    #[must_use]
    pub fn new(state: Arc<ClusterState>, config: SimulatorConfig) -> Self {
        let (event_tx, events) = mpsc::channel(1);
        let (error_tx, errors) = mpsc::channel(1);
        let brain = Arc::new(Brain::new(state, event_tx, config.event_forward_timeout()));

        Self {
            brain,
            config,
            gate: FirstServeGate::new(),
            error_tx,
            channels: Mutex::new(RunChannels { events, errors }),
            listener: OnceCell::new(),
            phase: parking_lot::Mutex::new(RunPhase::Idle),
        }
    }

    /// The brain serving the scheduler-facing API.
    #[must_use]
    pub fn brain(&self) -> &Arc<Brain> {
        &self.brain
    }

    /// Phase of the current or most recent run.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock()
    }

    /// The scheduler-facing router, wired to this simulator's channels.
    #[must_use]
    pub fn scheduler_router(&self) -> Router {
        scheduler_handler::router(HandlerState::new(
            Arc::clone(&self.brain),
            ErrorReporter::new(self.error_tx.clone(), self.config.event_forward_timeout()),
            self.gate.clone(),
            &self.config,
        ))
    }

    /// Bind and serve the scheduler-facing API, once.
    ///
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn listen(&self) -> Result<SocketAddr> {
        self.listener
            .get_or_try_init(|| async {
                let listener = TcpListener::bind(&self.config.scheduler_addr).await?;
                let addr = listener.local_addr()?;
                let app = self.scheduler_router();
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!(error = %e, "Scheduler-facing API stopped");
                    }
                });
                info!(addr = %addr, "Scheduler-facing API listening");
                Ok::<_, SimulationError>(addr)
            })
            .await
            .copied()
    }

    /// Run one simulation and return one result per submitted pod.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for duplicate or already-present pod names,
    /// `Timeout` when the run exceeds its budget, or whatever error a
    /// scheduler request reported while the run was correlating.
    pub async fn run(&self, request: SimulationRequest) -> Result<Vec<SchedulingResult>> {
        let mut channels = self.channels.lock().await;
        self.set_phase(RunPhase::Idle);
        channels.drain();

        let mut scope = RunScope::new(Arc::clone(self.brain.state()));
        let outcome = bounded(
            self.config.run_timeout(),
            "simulation run",
            self.execute(&mut channels, &mut scope, request),
        )
        .await;
        drop(scope);

        self.finish(&outcome);
        if let Ok(results) = &outcome {
            info!(results = results.len(), "Simulation run completed");
        }
        outcome
    }

    async fn execute(
        &self,
        channels: &mut RunChannels,
        scope: &mut RunScope,
        request: SimulationRequest,
    ) -> Result<Vec<SchedulingResult>> {
        let pods = name_pods(request.to_create)?;

        self.set_phase(RunPhase::Seeding);
        let state = self.brain.state();
        for pod in &request.to_delete {
            let Some(name) = pod.metadata.name.as_deref() else {
                continue;
            };
            match state.remove_pod(name) {
                Some(removed) => scope.removed.push(removed),
                None => warn!(pod = %name, "Pod to delete is not in the cluster"),
            }
        }

        let mut pending = HashSet::with_capacity(pods.len());
        for (name, pod) in pods {
            if state.get_pod(&name).is_some() {
                return Err(SimulationError::InvalidRequest(format!(
                    "pod {name} already exists in the cluster"
                )));
            }
            self.brain.admit_pod(pod);
            scope.seeded.push(name.clone());
            pending.insert(name);
        }
        info!(
            pods = pending.len(),
            deleted = scope.removed.len(),
            "Seeded simulation run"
        );

        self.set_phase(RunPhase::Listening);
        self.listen().await?;

        self.set_phase(RunPhase::Correlating);
        let mut results = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let event = channels.next_event().await?;
            if pending.remove(&event.involved_object_name) {
                debug!(pod = %event.involved_object_name, reason = %event.reason, "Recorded verdict");
                results.push(SchedulingResult::verdict(
                    event.involved_object_name,
                    event.reason,
                    event.message,
                ));
            } else {
                debug!(
                    pod = %event.involved_object_name,
                    reason = %event.reason,
                    "Discarding event for pod outside this run"
                );
            }
        }

        Ok(results)
    }

    /// Count how many copies of `template` the scheduler places before the
    /// first `FailedScheduling`.
    ///
    /// Stops at the configured iteration limit with `limit_reached` set.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the probe exceeds its deadline, or whatever
    /// error a scheduler request reported while the probe ran.
    pub async fn probe_capacity(&self, template: Pod) -> Result<CapacityResult> {
        let mut channels = self.channels.lock().await;
        self.set_phase(RunPhase::Idle);
        channels.drain();

        let mut scope = RunScope::new(Arc::clone(self.brain.state()));
        let outcome = bounded(
            Some(self.config.capacity_deadline()),
            "capacity probe",
            self.probe(&mut channels, &mut scope, template),
        )
        .await;
        drop(scope);

        self.finish(&outcome);
        if let Ok(result) = &outcome {
            info!(
                capacity = result.capacity,
                limit_reached = result.limit_reached,
                "Capacity probe completed"
            );
        }
        outcome
    }

    async fn probe(
        &self,
        channels: &mut RunChannels,
        scope: &mut RunScope,
        template: Pod,
    ) -> Result<CapacityResult> {
        self.set_phase(RunPhase::Listening);
        self.listen().await?;

        let prefix = template.metadata.name.clone();
        let limit = self.config.capacity_max_iterations;
        let mut capacity = 0;

        while capacity < limit {
            let name = probe_pod_name(prefix.as_deref());
            let mut pod = template.clone();
            pod.metadata.name = Some(name.clone());
            pod.metadata.resource_version = None;

            self.set_phase(RunPhase::Seeding);
            self.brain.admit_pod(pod);
            scope.seeded.push(name.clone());

            self.set_phase(RunPhase::Correlating);
            let event = loop {
                let event = channels.next_event().await?;
                if event.involved_object_name == name {
                    break event;
                }
                debug!(pod = %event.involved_object_name, "Discarding event for pod outside this probe");
            };

            if event.reason == FAILED_SCHEDULING {
                debug!(pod = %name, message = %event.message, "Probe pod did not fit");
                return Ok(CapacityResult {
                    capacity,
                    limit_reached: false,
                });
            }
            capacity += 1;
        }

        warn!(limit, "Capacity probe stopped at its iteration limit");
        Ok(CapacityResult {
            capacity,
            limit_reached: true,
        })
    }

    fn finish<T>(&self, outcome: &Result<T>) {
        match outcome {
            Ok(_) => self.set_phase(RunPhase::Completed),
            Err(e) => {
                warn!(error = %e, "Simulation aborted");
                self.set_phase(RunPhase::Aborted);
            }
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!(from = ?*current, to = ?phase, "Run phase");
            *current = phase;
        }
    }
}

/// Run `work`, failing with `Timeout` once `limit` elapses.
async fn bounded<T>(
    limit: Option<Duration>,
    what: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| SimulationError::Timeout(format!("{what} did not finish within {limit:?}")))?,
        None => work.await,
    }
}

/// Give every pod a name and reject duplicates.
fn name_pods(pods: Vec<Pod>) -> Result<Vec<(String, Pod)>> {
    let mut seen = HashSet::with_capacity(pods.len());
    pods.into_iter()
        .map(|mut pod| {
            let name = match pod.metadata.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => generate_pod_name(),
            };
            if !seen.insert(name.clone()) {
                return Err(SimulationError::InvalidRequest(format!(
                    "duplicate pod name {name}"
                )));
            }
            pod.metadata.name = Some(name.clone());
            Ok((name, pod))
        })
        .collect()
}
