//! The scheduler-facing HTTP surface.
//!
//! An unmodified scheduler is pointed at this router as if it were an API
//! server. Lists are answered from the synthetic cluster, watches are starved,
//! and bindings and events are fed to the [`Brain`].
//!
//! # Routes
//!
//! - `GET /api/v1/nodes` - Node list (opens the first-serve gate)
//! - `GET /api/v1/pods?fieldSelector=...` - Pod list by selector class
//! - `GET /api/v1/{persistentvolumeclaims,persistentvolumes,services,replicationcontrollers}`
//! - `GET /apis/extensions/v1beta1/replicasets`, `GET /apis/apps/v1/replicasets`
//! - `GET /api/v1/watch/*` - Held, then answered empty
//! - `GET /api/v1/namespaces/:ns/pods/:name` - Single pod
//! - `PATCH /api/v1/namespaces/:ns/pods/:name/status` - Acknowledged, no change
//! - `POST /api/v1/namespaces/:ns/events` - Event, answered 409
//! - `POST /apis/events.k8s.io/v1/namespaces/:ns/events` - Event, answered 409
//! - `POST /api/v1/namespaces/:ns/bindings` - Binding
//! - `POST /api/v1/namespaces/:ns/pods/:name[/binding]` - Binding

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use risk_advisor_core::WireStatus;
use risk_advisor_state::{PodSelector, ResourceKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::brain::{Brain, SchedulingEvent};
use crate::config::SimulatorConfig;
use crate::gate::FirstServeGate;
use crate::SimulationError;

// ============================================================================
// State
// ============================================================================

/// Delivers handler failures to the correlating run.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<SimulationError>,
    timeout: Duration,
}

impl ErrorReporter {
    /// Create a reporter that waits at most `timeout` per error.
    #[must_use]
    pub fn new(tx: mpsc::Sender<SimulationError>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }

    /// Hand an error to the run loop, or log and drop it if no run takes it.
    pub async fn report(&self, error: SimulationError) {
        warn!(error = %error, "Scheduler request failed");
        match self.tx.send_timeout(error, self.timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(error) | SendTimeoutError::Closed(error)) => {
                warn!(error = %error, "No run is listening for errors, dropping error");
            }
        }
    }
}

/// Shared state of the scheduler-facing router.
#[derive(Clone)]
pub struct HandlerState {
    brain: Arc<Brain>,
    errors: ErrorReporter,
    gate: FirstServeGate,
    watch_hold: Duration,
    gate_timeout: Duration,
}

impl HandlerState {
    /// Bundle the router's collaborators.
    #[must_use]
    pub fn new(
        brain: Arc<Brain>,
        errors: ErrorReporter,
        gate: FirstServeGate,
        config: &SimulatorConfig,
    ) -> Self {
        Self {
            brain,
            errors,
            gate,
            watch_hold: config.watch_hold(),
            gate_timeout: config.nodes_gate_timeout(),
        }
    }

    /// Serialize a wire object, reporting encoding failures to the run.
    async fn encode<T: Serialize>(&self, status: StatusCode, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => json_response(status, body),
            Err(e) => {
                self.errors
                    .report(SimulationError::Protocol(format!("encoding response: {e}")))
                    .await;
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Answer a watch with nothing after the hold, so informers fall back to lists.
    async fn starve_watch(&self, resource: &str) -> Response {
        debug!(resource = %resource, hold = ?self.watch_hold, "Holding watch");
        tokio::time::sleep(self.watch_hold).await;
        StatusCode::OK.into_response()
    }

    async fn protocol_failure(&self, status: StatusCode, reason: &str, message: String) -> Response {
        let body = WireStatus::failure(status.as_u16(), reason, message.clone());
        self.errors.report(SimulationError::Protocol(message)).await;
        (status, Json(body)).into_response()
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Body::from(body)).into_response()
}

// ============================================================================
// Wire bodies
// ============================================================================

/// Query parameters shared by list routes. Others are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    field_selector: Option<String>,
    watch: Option<String>,
}

impl ListQuery {
    fn is_watch(&self) -> bool {
        matches!(self.watch.as_deref(), Some("true" | "1"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ObjectRef {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

/// Accepts both `v1` events (`involvedObject`/`message`) and
/// `events.k8s.io/v1` events (`regarding`/`note`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EventBody {
    involved_object: Option<ObjectRef>,
    regarding: Option<ObjectRef>,
    reason: String,
    message: String,
    note: String,
}

impl From<EventBody> for SchedulingEvent {
    fn from(body: EventBody) -> Self {
        let object = body.involved_object.or(body.regarding).unwrap_or_default();
        Self {
            involved_object_kind: object.kind,
            involved_object_name: object.name,
            reason: body.reason,
            message: if body.message.is_empty() {
                body.note
            } else {
                body.message
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct BindingBody {
    #[serde(default)]
    metadata: ObjectRef,
    target: ObjectRef,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_nodes(State(state): State<HandlerState>, Query(query): Query<ListQuery>) -> Response {
    if query.is_watch() {
        return state.starve_watch("nodes").await;
    }
    let response = state.encode(StatusCode::OK, &state.brain.list_nodes()).await;
    if response.status().is_success() {
        state.gate.open();
    }
    response
}

async fn list_pods(State(state): State<HandlerState>, Query(query): Query<ListQuery>) -> Response {
    if query.is_watch() {
        return state.starve_watch("pods").await;
    }

    let raw = query.field_selector.as_deref().unwrap_or_default();
    let selector = PodSelector::from_field_selector(raw);
    if selector == PodSelector::All {
        debug!(field_selector = %raw, "Unrecognized pod field selector, listing all pods");
    }

    if selector == PodSelector::UnassignedNonTerminated
        && !state.gate.is_open()
        && !state.gate.wait(state.gate_timeout).await
    {
        warn!(
            timeout = ?state.gate_timeout,
            "Nodes not listed yet, serving pending pods anyway"
        );
    }

    state
        .encode(StatusCode::OK, &state.brain.list_pods(selector))
        .await
}

fn passthrough(kind: ResourceKind) -> MethodRouter<HandlerState> {
    get(
        move |State(state): State<HandlerState>, Query(query): Query<ListQuery>| async move {
            if query.is_watch() {
                return state.starve_watch(kind.path()).await;
            }
            json_response(StatusCode::OK, state.brain.blob(kind))
        },
    )
}

async fn watch(State(state): State<HandlerState>, Path(resource): Path<String>) -> Response {
    state.starve_watch(&resource).await
}

async fn get_pod(
    State(state): State<HandlerState>,
    Path((_namespace, name)): Path<(String, String)>,
) -> Response {
    match state.brain.get_pod(&name) {
        Some(pod) => state.encode(StatusCode::OK, &pod).await,
        None => (
            StatusCode::NOT_FOUND,
            Json(WireStatus::not_found("pods", &name)),
        )
            .into_response(),
    }
}

/// Status writes are acknowledged with the current pod; the synthetic
/// cluster only changes through bindings.
async fn patch_pod_status(
    State(state): State<HandlerState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    debug!(namespace = %namespace, pod = %name, "Acknowledging pod status update");
    get_pod(State(state), Path((namespace, name))).await
}

async fn post_event(State(state): State<HandlerState>, body: Bytes) -> Response {
    let event: EventBody = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return state
                .protocol_failure(
                    StatusCode::BAD_REQUEST,
                    "BadRequest",
                    format!("malformed event body: {e}"),
                )
                .await;
        }
    };

    state.brain.handle_event(event.into()).await;
    StatusCode::CONFLICT.into_response()
}

async fn bind_from_collection(
    State(state): State<HandlerState>,
    Path(_namespace): Path<String>,
    body: Bytes,
) -> Response {
    bind(&state, None, &body).await
}

async fn bind_pod(
    State(state): State<HandlerState>,
    Path((_namespace, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    bind(&state, Some(&name), &body).await
}

async fn bind(state: &HandlerState, path_name: Option<&str>, body: &[u8]) -> Response {
    let binding: BindingBody = match serde_json::from_slice(body) {
        Ok(binding) => binding,
        Err(e) => {
            return state
                .protocol_failure(
                    StatusCode::BAD_REQUEST,
                    "BadRequest",
                    format!("malformed binding body: {e}"),
                )
                .await;
        }
    };

    let pod_name = if binding.metadata.name.is_empty() {
        path_name.unwrap_or_default()
    } else {
        binding.metadata.name.as_str()
    };
    if pod_name.is_empty() || binding.target.name.is_empty() {
        return state
            .protocol_failure(
                StatusCode::BAD_REQUEST,
                "BadRequest",
                "binding is missing the pod or target node name".to_string(),
            )
            .await;
    }

    match state.brain.apply_binding(pod_name, &binding.target.name) {
        Ok(status) => state.encode(StatusCode::CREATED, &status).await,
        Err(SimulationError::NotFound(e)) => {
            let body = WireStatus::not_found("pods", pod_name);
            state
                .errors
                .report(SimulationError::Protocol(format!("binding for unknown pod: {e}")))
                .await;
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(e) => {
            let body = WireStatus::failure(500, "InternalError", e.to_string());
            state.errors.report(e).await;
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn unmatched(method: Method, uri: Uri) -> Response {
    warn!(method = %method, uri = %uri, "Unhandled scheduler request");
    let body = WireStatus::failure(
        404,
        "NotFound",
        format!("the server could not find the requested resource ({method} {})", uri.path()),
    );
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// ============================================================================
// Router
// ============================================================================

/// Build the scheduler-facing router.
pub fn router(state: HandlerState) -> Router {
    Router::new()
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/pods", get(list_pods))
        .route(
            ResourceKind::PersistentVolumeClaims.path(),
            passthrough(ResourceKind::PersistentVolumeClaims),
        )
        .route(
            ResourceKind::PersistentVolumes.path(),
            passthrough(ResourceKind::PersistentVolumes),
        )
        .route(ResourceKind::Services.path(), passthrough(ResourceKind::Services))
        .route(
            ResourceKind::ReplicationControllers.path(),
            passthrough(ResourceKind::ReplicationControllers),
        )
        .route(
            ResourceKind::ReplicaSets.path(),
            passthrough(ResourceKind::ReplicaSets),
        )
        .route("/apis/apps/v1/replicasets", passthrough(ResourceKind::ReplicaSets))
        .route("/api/v1/watch/*resource", get(watch))
        .route("/api/v1/namespaces/:ns/events", post(post_event))
        .route("/apis/events.k8s.io/v1/namespaces/:ns/events", post(post_event))
        .route("/api/v1/namespaces/:ns/bindings", post(bind_from_collection))
        .route(
            "/api/v1/namespaces/:ns/pods/:name",
            get(get_pod).post(bind_pod),
        )
        .route("/api/v1/namespaces/:ns/pods/:name/binding", post(bind_pod))
        .route(
            "/api/v1/namespaces/:ns/pods/:name/status",
            axum::routing::patch(patch_pod_status),
        )
        .fallback(unmatched)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
