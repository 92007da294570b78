//! The seed a `ClusterState` is built from.
//!
//! Pods and nodes are kept as typed objects because the simulation mutates
//! and filters them. Everything else the scheduler lists is only ever echoed
//! back, so it is stored as the raw JSON captured at startup.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use risk_advisor_core::WireList;

/// Read-only resources served verbatim to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `/api/v1/persistentvolumeclaims`
    PersistentVolumeClaims,
    /// `/api/v1/persistentvolumes`
    PersistentVolumes,
    /// `/api/v1/services`
    Services,
    /// `/api/v1/replicationcontrollers`
    ReplicationControllers,
    /// `/apis/extensions/v1beta1/replicasets`
    ReplicaSets,
}

impl ResourceKind {
    /// Every passthrough kind.
    pub const ALL: [Self; 5] = [
        Self::PersistentVolumeClaims,
        Self::PersistentVolumes,
        Self::Services,
        Self::ReplicationControllers,
        Self::ReplicaSets,
    ];

    /// Kind of the list object, e.g. `ServiceList`.
    #[must_use]
    pub const fn list_kind(self) -> &'static str {
        match self {
            Self::PersistentVolumeClaims => "PersistentVolumeClaimList",
            Self::PersistentVolumes => "PersistentVolumeList",
            Self::Services => "ServiceList",
            Self::ReplicationControllers => "ReplicationControllerList",
            Self::ReplicaSets => "ReplicaSetList",
        }
    }

    /// API group/version the scheduler lists this kind under.
    #[must_use]
    pub const fn api_version(self) -> &'static str {
        match self {
            Self::ReplicaSets => "extensions/v1beta1",
            _ => "v1",
        }
    }

    /// Collection path of this kind.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::PersistentVolumeClaims => "/api/v1/persistentvolumeclaims",
            Self::PersistentVolumes => "/api/v1/persistentvolumes",
            Self::Services => "/api/v1/services",
            Self::ReplicationControllers => "/api/v1/replicationcontrollers",
            Self::ReplicaSets => "/apis/extensions/v1beta1/replicasets",
        }
    }

    /// An empty list of this kind, used when nothing was captured.
    #[must_use]
    pub fn empty_list(self) -> Vec<u8> {
        let list: WireList<serde_json::Value> =
            WireList::new(self.list_kind(), self.api_version(), self.path(), 0, Vec::new());
        serde_json::to_vec(&list).unwrap_or_default()
    }
}

/// Raw JSON list bodies keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceBlobs {
    blobs: HashMap<ResourceKind, Vec<u8>>,
}

impl ResourceBlobs {
    /// Create an empty set; every kind serves an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the captured body for a kind.
    pub fn insert(&mut self, kind: ResourceKind, body: Vec<u8>) {
        self.blobs.insert(kind, body);
    }

    /// Builder form of [`ResourceBlobs::insert`].
    #[must_use]
    pub fn with(mut self, kind: ResourceKind, body: Vec<u8>) -> Self {
        self.insert(kind, body);
        self
    }

    /// The body for a kind, or an empty list of that kind.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> Vec<u8> {
        self.blobs
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.empty_list())
    }
}

/// A one-time capture of real cluster state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Non-terminated pods, assigned and unassigned.
    pub pods: Vec<Pod>,
    /// All nodes.
    pub nodes: Vec<Node>,
    /// Resource version of the capture; the state counter starts here.
    pub resource_version: u64,
    /// Passthrough resources.
    pub blobs: ResourceBlobs,
}
