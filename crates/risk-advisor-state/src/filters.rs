//! Pod selector classes.
//!
//! A scheduler only ever asks for two subsets of pods: the ones it still has
//! to place and the ones already occupying nodes. Anything else falls back to
//! the full list.

use k8s_openapi::api::core::v1::Pod;

/// Field selector the scheduler uses for pods already bound to a node.
pub const ASSIGNED_NON_TERMINATED: &str =
    "spec.nodeName!=,status.phase!=Failed,status.phase!=Succeeded";

/// Field selector the scheduler uses for pods waiting to be placed.
pub const UNASSIGNED_NON_TERMINATED: &str =
    "spec.nodeName=,status.phase!=Failed,status.phase!=Succeeded";

/// The subsets of pods a list request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodSelector {
    /// Pods without a node that have not terminated.
    UnassignedNonTerminated,
    /// Pods bound to a node that have not terminated.
    AssignedNonTerminated,
    /// Every pod.
    All,
}

impl PodSelector {
    /// Classify a raw `fieldSelector` query value.
    ///
    /// The `!=` form is checked first since `spec.nodeName=` is a substring of it.
    #[must_use]
    pub fn from_field_selector(selector: &str) -> Self {
        if selector.contains("spec.nodeName!=") {
            Self::AssignedNonTerminated
        } else if selector.contains("spec.nodeName=") {
            Self::UnassignedNonTerminated
        } else {
            Self::All
        }
    }

    /// Check whether a pod belongs to this subset.
    #[must_use]
    pub fn matches(self, pod: &Pod) -> bool {
        match self {
            Self::UnassignedNonTerminated => node_name(pod).is_none() && !is_terminated(pod),
            Self::AssignedNonTerminated => node_name(pod).is_some() && !is_terminated(pod),
            Self::All => true,
        }
    }
}

/// The node a pod is bound to, if any.
#[must_use]
pub fn node_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .filter(|name| !name.is_empty())
}

/// The pod's phase string, if set.
#[must_use]
pub fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

/// Whether the pod reached `Succeeded` or `Failed`.
#[must_use]
pub fn is_terminated(pod: &Pod) -> bool {
    matches!(phase(pod), Some("Succeeded" | "Failed"))
}
