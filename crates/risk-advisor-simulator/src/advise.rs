//! The operator-facing advisory API.
//!
//! # Routes
//!
//! - `POST /advise` - Run a simulation, answer `[SchedulingResult]`
//! - `GET /advise` - Alive check
//! - `POST /capacity` - Probe capacity for a pod template
//! - `GET /health` - Health check

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use k8s_openapi::api::core::v1::Pod;
use risk_advisor_core::{CapacityResult, ErrorResponse, SchedulingResult, SimulationRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::simulator::Simulator;
use crate::{Result, SimulationError};

const SERVICE: &str = "risk-advisor-simulator";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE,
    })
}

async fn alive() -> StatusCode {
    StatusCode::OK
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| SimulationError::InvalidRequest(format!("malformed request body: {e}")))
}

async fn advise(
    State(simulator): State<Arc<Simulator>>,
    body: Bytes,
) -> Result<Json<Vec<SchedulingResult>>> {
    let request: SimulationRequest = parse_body(&body)?;
    tracing::info!(
        to_create = request.to_create.len(),
        to_delete = request.to_delete.len(),
        "Received simulation request"
    );
    simulator.run(request).await.map(Json)
}

async fn capacity(
    State(simulator): State<Arc<Simulator>>,
    body: Bytes,
) -> Result<Json<CapacityResult>> {
    let template: Pod = parse_body(&body)?;
    tracing::info!(
        template = template.metadata.name.as_deref().unwrap_or_default(),
        "Received capacity probe request"
    );
    simulator.probe_capacity(template).await.map(Json)
}

/// Create the advisory router over a ready simulator.
pub fn router(simulator: Arc<Simulator>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/advise", get(alive).post(advise))
        .route("/capacity", post(capacity))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(simulator)
}

/// Create the router served when no simulator could be set up.
///
/// Every simulation endpoint answers 500 with `message`; the process stays up
/// so the failure is visible to callers.
pub fn failing_router(message: impl Into<String>) -> Router {
    let message: Arc<str> = Arc::from(message.into());

    let fail = {
        let message = Arc::clone(&message);
        move || {
            let message = Arc::clone(&message);
            async move {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message.as_ref())),
                )
                    .into_response()
            }
        }
    };
    let unhealthy = move || {
        let message = Arc::clone(&message);
        async move {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": SERVICE,
                    "error": message.as_ref(),
                })),
            )
                .into_response()
        }
    };

    Router::new()
        .route("/health", get(unhealthy))
        .route("/advise", get(alive).post(fail.clone()))
        .route("/capacity", post(fail))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use risk_advisor_state::{ClusterState, Snapshot};
    use tower::ServiceExt;

    use crate::config::SimulatorConfig;

    fn simulator() -> Arc<Simulator> {
        let state = ClusterState::from_snapshot(Snapshot {
            pods: vec![Pod {
                metadata: ObjectMeta {
                    name: Some("existing".to_string()),
                    ..ObjectMeta::default()
                },
                ..Pod::default()
            }],
            ..Snapshot::default()
        });
        Arc::new(Simulator::new(
            Arc::new(state),
            SimulatorConfig {
                scheduler_addr: "127.0.0.1:0".to_string(),
                ..SimulatorConfig::default()
            },
        ))
    }

    async fn call(router: Router, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_and_alive() {
        let app = router(simulator(), 1024);
        let (status, body) = call(app.clone(), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = call(app, Method::GET, "/advise", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_advise_returns_empty_list() {
        let app = router(simulator(), 1024);
        let (status, body) = call(app, Method::POST, "/advise", r#"{"toCreate": []}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = router(simulator(), 1024);
        let (status, body) = call(app, Method::POST, "/advise", "[1, 2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errorMessage"]
            .as_str()
            .unwrap()
            .starts_with("invalid request: malformed request body"));
    }

    #[tokio::test]
    async fn duplicate_names_are_bad_request() {
        let app = router(simulator(), 1024);
        let body = r#"{"toCreate": [{"metadata": {"name": "a"}}, {"metadata": {"name": "a"}}]}"#;
        let (status, body) = call(app, Method::POST, "/advise", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorMessage"], "invalid request: duplicate pod name a");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = router(simulator(), 16);
        let (status, _) = call(
            app,
            Method::POST,
            "/advise",
            r#"{"toCreate": [], "toDelete": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn failing_router_reports_cause() {
        let app = failing_router("failed to fetch cluster state (connection refused)");

        let (status, body) = call(app.clone(), Method::POST, "/advise", "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["errorMessage"],
            "failed to fetch cluster state (connection refused)"
        );

        let (status, _) = call(app.clone(), Method::POST, "/capacity", "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = call(app, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }
}
