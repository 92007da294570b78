//! Core types and utilities for risk-advisor.
//!
//! This crate provides the foundational types shared by the simulator crates:
//!
//! - **Advisory model**: the request/response bodies exchanged with operators
//! - **Wire envelopes**: the Kubernetes list and status shapes a scheduler expects
//! - **Names**: synthetic pod name generation
//!
//! # Example
//!
//! ```
//! use risk_advisor_core::{SchedulingResult, SimulationRequest};
//!
//! let request: SimulationRequest =
//!     serde_json::from_str(r#"{"toCreate": [{"metadata": {"name": "a"}}]}"#).unwrap();
//! assert_eq!(request.to_create.len(), 1);
//!
//! let result = SchedulingResult::verdict("a", "Scheduled", "");
//! assert_eq!(result.pod_name.as_deref(), Some("a"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod model;
pub mod names;
pub mod wire;

pub use model::{CapacityResult, ErrorResponse, SchedulingResult, SimulationRequest};
pub use names::{generate_pod_name, probe_pod_name};
pub use wire::{WireList, WireStatus};

/// Namespace assigned to admitted pods that do not carry one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Event reason a scheduler emits when a pod cannot be placed.
pub const FAILED_SCHEDULING: &str = "FailedScheduling";

/// Event reason a scheduler emits when a pod was placed.
pub const SCHEDULED: &str = "Scheduled";
