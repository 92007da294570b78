//! In-memory cluster state for risk-advisor.
//!
//! This crate holds the synthetic copy of a cluster that a simulation run
//! presents to the scheduler:
//!
//! - [`ClusterState`]: pods, nodes and the resource version counter
//! - [`PodSelector`]: the pod subsets a scheduler lists
//! - [`Snapshot`]: the one-time capture a state is seeded from
//!
//! # Example
//!
//! ```
//! use k8s_openapi::api::core::v1::Pod;
//! use risk_advisor_state::{ClusterState, PodSelector, Snapshot};
//!
//! let state = ClusterState::from_snapshot(Snapshot {
//!     resource_version: 10,
//!     ..Snapshot::default()
//! });
//!
//! let mut pod = Pod::default();
//! pod.metadata.name = Some("web".to_string());
//! state.add_pod(pod);
//!
//! assert_eq!(state.resource_version(), 11);
//! let pending = state.get_pods(|p| PodSelector::UnassignedNonTerminated.matches(p));
//! assert_eq!(pending.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cluster;
pub mod error;
pub mod filters;
pub mod snapshot;

pub use cluster::ClusterState;
pub use error::{Result, StateError};
pub use filters::{PodSelector, ASSIGNED_NON_TERMINATED, UNASSIGNED_NON_TERMINATED};
pub use snapshot::{ResourceBlobs, ResourceKind, Snapshot};
