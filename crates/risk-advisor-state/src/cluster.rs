//! The in-memory cluster snapshot.
//!
//! `ClusterState` is shared between the HTTP handler tasks and the run loop.
//! Reads take the shared lock, mutations take the exclusive lock, and no
//! method ever awaits while holding either.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use parking_lot::RwLock;

use crate::error::{Result, StateError};
use crate::snapshot::{ResourceBlobs, ResourceKind, Snapshot};

#[derive(Debug, Default)]
struct Inner {
    pods: HashMap<String, Pod>,
    nodes: HashMap<String, Node>,
    resource_version: u64,
}

impl Inner {
    /// Advance the counter and stamp the pod with the new value.
    fn stamp(&mut self, pod: &mut Pod) {
        self.resource_version += 1;
        pod.metadata.resource_version = Some(self.resource_version.to_string());
    }
}

/// Concurrency-safe store of pods and nodes with a monotonic version counter.
///
/// Every mutation advances the counter by one and stamps the written pod with
/// the new value, so no two mutations ever observe the same version.
#[derive(Debug, Default)]
pub struct ClusterState {
    inner: RwLock<Inner>,
    blobs: ResourceBlobs,
}

impl ClusterState {
    /// Create an empty state at version zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state from a captured snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let pods = snapshot
            .pods
            .into_iter()
            .map(|pod| (pod.metadata.name.clone().unwrap_or_default(), pod))
            .collect();
        let nodes = snapshot
            .nodes
            .into_iter()
            .map(|node| (node.metadata.name.clone().unwrap_or_default(), node))
            .collect();

        Self {
            inner: RwLock::new(Inner {
                pods,
                nodes,
                resource_version: snapshot.resource_version,
            }),
            blobs: snapshot.blobs,
        }
    }

    /// Insert or overwrite a pod by name. Returns the stored pod.
    pub fn add_pod(&self, mut pod: Pod) -> Pod {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let mut inner = self.inner.write();
        inner.stamp(&mut pod);
        inner.pods.insert(name, pod.clone());
        pod
    }

    /// Replace an existing pod. Returns the stored pod.
    ///
    /// # Errors
    ///
    /// Returns `StateError::PodNotFound` if no pod with `name` exists; the
    /// state is left untouched in that case.
    pub fn update_pod(&self, name: &str, mut pod: Pod) -> Result<Pod> {
        let mut inner = self.inner.write();
        if !inner.pods.contains_key(name) {
            return Err(StateError::PodNotFound(name.to_string()));
        }
        inner.stamp(&mut pod);
        inner.pods.insert(name.to_string(), pod.clone());
        Ok(pod)
    }

    /// Remove a pod, returning it if it existed.
    pub fn remove_pod(&self, name: &str) -> Option<Pod> {
        let mut inner = self.inner.write();
        let removed = inner.pods.remove(name);
        if removed.is_some() {
            inner.resource_version += 1;
        }
        removed
    }

    /// Get a pod by name.
    #[must_use]
    pub fn get_pod(&self, name: &str) -> Option<Pod> {
        self.inner.read().pods.get(name).cloned()
    }

    /// All pods matching `filter`, in no particular order.
    pub fn get_pods(&self, filter: impl Fn(&Pod) -> bool) -> Vec<Pod> {
        self.list_pods(filter).0
    }

    /// Matching pods together with the version they were read at.
    ///
    /// Both come from the same read lock, so the version describes exactly
    /// the returned set.
    pub fn list_pods(&self, filter: impl Fn(&Pod) -> bool) -> (Vec<Pod>, u64) {
        let inner = self.inner.read();
        let pods = inner.pods.values().filter(|pod| filter(pod)).cloned().collect();
        (pods, inner.resource_version)
    }

    /// All nodes, in no particular order.
    #[must_use]
    pub fn get_nodes(&self) -> Vec<Node> {
        self.list_nodes().0
    }

    /// All nodes together with the version they were read at.
    #[must_use]
    pub fn list_nodes(&self) -> (Vec<Node>, u64) {
        let inner = self.inner.read();
        (inner.nodes.values().cloned().collect(), inner.resource_version)
    }

    /// Current value of the version counter.
    #[must_use]
    pub fn resource_version(&self) -> u64 {
        self.inner.read().resource_version
    }

    /// Number of pods held.
    #[must_use]
    pub fn pod_count(&self) -> usize {
        self.inner.read().pods.len()
    }

    /// Captured body for a passthrough resource.
    #[must_use]
    pub fn blob(&self, kind: ResourceKind) -> Vec<u8> {
        self.blobs.get(kind)
    }
}
