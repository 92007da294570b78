//! Kubernetes wire envelopes.
//!
//! A scheduler decodes every list response with its own client deserializer,
//! so the envelopes here reproduce the `Kind`/`APIVersion`/`ListMeta` shape of
//! the real API server, with `resourceVersion` as a decimal string.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::{Deserialize, Serialize};

/// A typed list response (`PodList`, `NodeList`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireList<T> {
    /// List kind, e.g. `PodList`.
    pub kind: String,
    /// Group/version of the listed resource, e.g. `v1`.
    pub api_version: String,
    /// List metadata carrying `selfLink` and `resourceVersion`.
    pub metadata: ListMeta,
    /// The listed objects.
    pub items: Vec<T>,
}

impl<T> WireList<T> {
    /// Build a list envelope.
    pub fn new(
        kind: impl Into<String>,
        api_version: impl Into<String>,
        self_link: impl Into<String>,
        resource_version: u64,
        items: Vec<T>,
    ) -> Self {
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            metadata: ListMeta {
                self_link: Some(self_link.into()),
                resource_version: Some(resource_version.to_string()),
                ..ListMeta::default()
            },
            items,
        }
    }
}

/// A `meta/v1` `Status` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireStatus {
    /// Always `Status`.
    pub kind: String,
    /// Always `v1`.
    pub api_version: String,
    /// `Success` or `Failure`.
    pub status: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable reason, e.g. `NotFound`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// HTTP status code mirrored into the body.
    pub code: u16,
}

impl WireStatus {
    fn new(status: &str, code: u16) -> Self {
        Self {
            kind: "Status".to_string(),
            api_version: "v1".to_string(),
            status: status.to_string(),
            message: None,
            reason: None,
            code,
        }
    }

    /// The acknowledgement returned for a successful binding.
    ///
    /// The API server does not echo the binding back; it answers with a bare
    /// `Success` status.
    #[must_use]
    pub fn binding_success() -> Self {
        Self::new("Success", 201)
    }

    /// A `Failure` status with the given code, reason and message.
    #[must_use]
    pub fn failure(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            message: Some(message.into()),
            ..Self::new("Failure", code)
        }
    }

    /// A `NotFound` failure for the named object.
    #[must_use]
    pub fn not_found(resource: &str, name: &str) -> Self {
        Self::failure(404, "NotFound", format!("{resource} \"{name}\" not found"))
    }
}
