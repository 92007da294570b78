//! Error types for the cluster state.

use thiserror::Error;

/// A result type using `StateError`.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur during cluster state operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No pod with the given name exists in the state.
    #[error("pod not found: {0}")]
    PodNotFound(String),
}
