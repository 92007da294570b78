//! Simulator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the simulator process.
///
/// Built once at startup and handed by reference to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Listen address of the advisory API.
    pub advise_addr: String,
    /// Listen address of the scheduler-facing API.
    pub scheduler_addr: String,
    /// API server to snapshot. `None` uses in-cluster config or kubeconfig.
    pub apiserver_url: Option<String>,
    /// Wall-clock budget for fetching the initial snapshot.
    pub snapshot_timeout_seconds: u64,
    /// Budget for one simulation run. Zero disables the limit.
    pub run_timeout_seconds: u64,
    /// How long a handler waits to hand an event or error to the run loop.
    pub event_forward_timeout_ms: u64,
    /// How long an unassigned-pods list waits for the first nodes list.
    pub nodes_gate_timeout_ms: u64,
    /// How long a watch request is held before answering empty.
    pub watch_hold_ms: u64,
    /// Upper bound on pods the capacity probe places.
    pub capacity_max_iterations: u32,
    /// Wall-clock budget for one capacity probe.
    pub capacity_deadline_seconds: u64,
    /// Maximum advisory request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            advise_addr: "0.0.0.0:9998".to_string(),
            scheduler_addr: "0.0.0.0:9999".to_string(),
            apiserver_url: None,
            snapshot_timeout_seconds: 30,
            run_timeout_seconds: 120,
            event_forward_timeout_ms: 5_000,
            nodes_gate_timeout_ms: 5_000,
            watch_hold_ms: 2_000,
            capacity_max_iterations: 1_000,
            capacity_deadline_seconds: 300,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `ADVISE_ADDR`, `SCHEDULER_ADDR`: listen addresses
    /// - `APISERVER_URL`: API server to snapshot
    /// - `SNAPSHOT_TIMEOUT_SECONDS`, `RUN_TIMEOUT_SECONDS`,
    ///   `CAPACITY_DEADLINE_SECONDS`: wall-clock budgets
    /// - `EVENT_FORWARD_TIMEOUT_MS`, `NODES_GATE_TIMEOUT_MS`, `WATCH_HOLD_MS`:
    ///   handler timings
    /// - `CAPACITY_MAX_ITERATIONS`: capacity probe bound
    /// - `MAX_BODY_BYTES`: advisory body limit
    ///
    /// Values that fail to parse are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("ADVISE_ADDR") {
            config.advise_addr = val;
        }
        if let Some(val) = lookup("SCHEDULER_ADDR") {
            config.scheduler_addr = val;
        }
        if let Some(val) = lookup("APISERVER_URL").filter(|v| !v.is_empty()) {
            config.apiserver_url = Some(val);
        }

        let number = |key: &str| lookup(key).and_then(|val| val.parse::<u64>().ok());
        if let Some(n) = number("SNAPSHOT_TIMEOUT_SECONDS") {
            config.snapshot_timeout_seconds = n;
        }
        if let Some(n) = number("RUN_TIMEOUT_SECONDS") {
            config.run_timeout_seconds = n;
        }
        if let Some(n) = number("EVENT_FORWARD_TIMEOUT_MS") {
            config.event_forward_timeout_ms = n;
        }
        if let Some(n) = number("NODES_GATE_TIMEOUT_MS") {
            config.nodes_gate_timeout_ms = n;
        }
        if let Some(n) = number("WATCH_HOLD_MS") {
            config.watch_hold_ms = n;
        }
        if let Some(n) = number("CAPACITY_DEADLINE_SECONDS") {
            config.capacity_deadline_seconds = n;
        }
        if let Some(n) = lookup("CAPACITY_MAX_ITERATIONS").and_then(|val| val.parse().ok()) {
            config.capacity_max_iterations = n;
        }
        if let Some(n) = lookup("MAX_BODY_BYTES").and_then(|val| val.parse().ok()) {
            config.max_body_bytes = n;
        }

        config
    }

    /// Get the snapshot fetch budget as a `Duration`.
    #[must_use]
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_seconds)
    }

    /// Get the run budget, or `None` when runs are unbounded.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_seconds > 0).then(|| Duration::from_secs(self.run_timeout_seconds))
    }

    /// Get the event/error hand-off timeout as a `Duration`.
    #[must_use]
    pub fn event_forward_timeout(&self) -> Duration {
        Duration::from_millis(self.event_forward_timeout_ms)
    }

    /// Get the first-serve gate timeout as a `Duration`.
    #[must_use]
    pub fn nodes_gate_timeout(&self) -> Duration {
        Duration::from_millis(self.nodes_gate_timeout_ms)
    }

    /// Get the watch hold as a `Duration`.
    #[must_use]
    pub fn watch_hold(&self) -> Duration {
        Duration::from_millis(self.watch_hold_ms)
    }

    /// Get the capacity probe budget as a `Duration`.
    #[must_use]
    pub fn capacity_deadline(&self) -> Duration {
        Duration::from_secs(self.capacity_deadline_seconds)
    }
}
