//! Simulation logic behind the scheduler-facing API.
//!
//! The `Brain` admits pods into the synthetic cluster, applies the bindings
//! the scheduler posts, and forwards the scheduler's pod events to whichever
//! run is correlating them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod, PodCondition, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use risk_advisor_core::{generate_pod_name, WireList, WireStatus, DEFAULT_NAMESPACE};
use risk_advisor_state::{ClusterState, PodSelector, ResourceKind, StateError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Result;

/// A scheduler event, reduced to what correlation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingEvent {
    /// Kind of the object the event is about, e.g. `Pod`.
    pub involved_object_kind: String,
    /// Name of the object the event is about.
    pub involved_object_name: String,
    /// Short machine-readable outcome, e.g. `Scheduled`.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
}

/// What became of an event handed to [`Brain::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Delivered to the run loop.
    Forwarded,
    /// Not about a pod.
    Ignored,
    /// No run took it in time.
    Dropped,
}

/// Mediates between the scheduler-facing API and the cluster state.
#[derive(Debug)]
pub struct Brain {
    state: Arc<ClusterState>,
    events: mpsc::Sender<SchedulingEvent>,
    forward_timeout: Duration,
}

impl Brain {
    /// Create a brain over `state` that forwards pod events on `events`.
    #[must_use]
    pub fn new(
        state: Arc<ClusterState>,
        events: mpsc::Sender<SchedulingEvent>,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            state,
            events,
            forward_timeout,
        }
    }

    /// The cluster state this brain mutates.
    #[must_use]
    pub fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    /// Fill in the fields the API server would set on creation and store the pod.
    ///
    /// Returns the stored pod.
    pub fn admit_pod(&self, mut pod: Pod) -> Pod {
        let name = match pod.metadata.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => generate_pod_name(),
        };
        let namespace = match pod.metadata.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => DEFAULT_NAMESPACE.to_string(),
        };

        pod.metadata.self_link = Some(format!("/api/v1/namespaces/{namespace}/pods/{name}"));
        pod.metadata.name = Some(name);
        pod.metadata.namespace = Some(namespace);
        pod.metadata.uid = Some(Uuid::new_v4().to_string());
        pod.metadata.creation_timestamp = Some(Time(Utc::now()));

        // A new pod carries no observed status, whatever the template held.
        pod.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..PodStatus::default()
        });

        let stored = self.state.add_pod(pod);
        debug!(
            pod = stored.metadata.name.as_deref().unwrap_or_default(),
            resource_version = stored.metadata.resource_version.as_deref().unwrap_or_default(),
            "Admitted pod"
        );
        stored
    }

    /// Bind a pod to a node.
    ///
    /// Answers with the bare `Success` status the API server returns for a
    /// binding.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::NotFound` if the pod does not exist; nothing
    /// is modified in that case.
    pub fn apply_binding(&self, pod_name: &str, node_name: &str) -> Result<WireStatus> {
        let mut pod = self
            .state
            .get_pod(pod_name)
            .ok_or_else(|| StateError::PodNotFound(pod_name.to_string()))?;

        pod.spec.get_or_insert_with(PodSpec::default).node_name = Some(node_name.to_string());
        pod.status
            .get_or_insert_with(Default::default)
            .conditions
            .get_or_insert_with(Vec::new)
            .push(PodCondition {
                type_: "PodScheduled".to_string(),
                status: "True".to_string(),
                last_transition_time: Some(Time(Utc::now())),
                ..PodCondition::default()
            });

        self.state.update_pod(pod_name, pod)?;
        info!(pod = %pod_name, node = %node_name, "Bound pod");
        Ok(WireStatus::binding_success())
    }

    /// Forward a pod event to the correlating run.
    ///
    /// Events about other kinds are logged and discarded. The hand-off waits
    /// at most the forward timeout, so a handler never wedges when no run is
    /// listening.
    pub async fn handle_event(&self, event: SchedulingEvent) -> EventOutcome {
        if event.involved_object_kind != "Pod" {
            debug!(
                kind = %event.involved_object_kind,
                name = %event.involved_object_name,
                reason = %event.reason,
                "Ignoring event for non-pod object"
            );
            return EventOutcome::Ignored;
        }

        match self.events.send_timeout(event, self.forward_timeout).await {
            Ok(()) => EventOutcome::Forwarded,
            Err(SendTimeoutError::Timeout(event)) => {
                warn!(
                    pod = %event.involved_object_name,
                    reason = %event.reason,
                    "No run is correlating events, dropping event"
                );
                EventOutcome::Dropped
            }
            Err(SendTimeoutError::Closed(event)) => {
                warn!(
                    pod = %event.involved_object_name,
                    "Event channel closed, dropping event"
                );
                EventOutcome::Dropped
            }
        }
    }

    /// List the pods in `selector` as a `PodList`.
    #[must_use]
    pub fn list_pods(&self, selector: PodSelector) -> WireList<Pod> {
        let (pods, version) = self.state.list_pods(|pod| selector.matches(pod));
        WireList::new("PodList", "v1", "/api/v1/pods", version, pods)
    }

    /// List all nodes as a `NodeList`.
    #[must_use]
    pub fn list_nodes(&self) -> WireList<Node> {
        let (nodes, version) = self.state.list_nodes();
        WireList::new("NodeList", "v1", "/api/v1/nodes", version, nodes)
    }

    /// Get a single pod.
    #[must_use]
    pub fn get_pod(&self, name: &str) -> Option<Pod> {
        self.state.get_pod(name)
    }

    /// Captured list body for a passthrough resource.
    #[must_use]
    pub fn blob(&self, kind: ResourceKind) -> Vec<u8> {
        self.state.blob(kind)
    }
}
