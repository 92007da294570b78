//! Error types for the simulator crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use risk_advisor_core::ErrorResponse;
use risk_advisor_state::StateError;
use thiserror::Error;

/// Errors that can end a simulation run or prevent one from starting.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// The cluster snapshot or a client could not be set up.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The scheduler sent something we could not understand, or a wire
    /// response could not be built.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A lookup against the cluster state failed.
    #[error(transparent)]
    NotFound(#[from] StateError),

    /// The advisory request is unusable as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A run, probe or snapshot fetch exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An internal hand-off channel was torn down.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kubernetes client error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl SimulationError {
    /// Get the HTTP status code for this error at the advisory boundary.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Timeout(_) => 504,
            Self::Setup(_)
            | Self::Protocol(_)
            | Self::NotFound(_)
            | Self::ChannelClosed(_)
            | Self::Io(_)
            | Self::Kube(_) => 500,
        }
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "Advisory request failed");
        } else {
            tracing::info!(error = %self, "Advisory request rejected");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// A specialized Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimulationError>;
