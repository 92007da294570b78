//! Advisory request and response bodies.
//!
//! These are the JSON contracts of the operator-facing endpoints. Field names
//! follow the camelCase spelling the advisory clients already send.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

/// A simulation request: pods to submit and pods to pretend are gone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    /// Pods to admit into the synthetic cluster for this run.
    #[serde(default)]
    pub to_create: Vec<Pod>,
    /// Pods to remove from the synthetic cluster for the duration of the run.
    #[serde(default)]
    pub to_delete: Vec<Pod>,
}

/// The outcome of one submitted pod.
///
/// A verdict carries `result` and `message`; an internal failure carries
/// `errorMessage` instead. Empty fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingResult {
    /// Name of the pod this result belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    /// Event reason reported by the scheduler (e.g. `Scheduled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Event message reported by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Internal error that prevented a verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SchedulingResult {
    /// Build a verdict result. An empty message is omitted on the wire.
    #[must_use]
    pub fn verdict(
        pod_name: impl Into<String>,
        result: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            pod_name: Some(pod_name.into()),
            result: Some(result.into()),
            message: (!message.is_empty()).then_some(message),
            error_message: None,
        }
    }
}

/// Output of the capacity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityResult {
    /// Number of template copies the scheduler placed before the first failure.
    pub capacity: u32,
    /// Set when the probe stopped at its iteration limit instead of a failure,
    /// making `capacity` a lower bound.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub limit_reached: bool,
}

/// Error body returned by the advisory endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable description of the failure.
    pub error_message: String,
}

impl ErrorResponse {
    /// Create a new error body.
    #[must_use]
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
        }
    }
}
