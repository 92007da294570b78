//! Synthetic pod names.
//!
//! Pods submitted without a name, and the copies the capacity probe makes of
//! its template, get short random names that are valid DNS-1123 labels.

use uuid::Uuid;

/// Length of the random suffix appended to generated names.
const SUFFIX_LEN: usize = 10;

/// Prefix used when a probe template has no name of its own.
const PROBE_PREFIX: &str = "capacity-probe";

/// Generate a short random pod name.
#[must_use]
pub fn generate_pod_name() -> String {
    format!("pod-{}", random_suffix())
}

/// Name for a copy of a capacity-probe template.
///
/// Uses the template's own name as the prefix when it has one.
#[must_use]
pub fn probe_pod_name(template_name: Option<&str>) -> String {
    let prefix = template_name
        .filter(|name| !name.is_empty())
        .unwrap_or(PROBE_PREFIX);
    format!("{prefix}-{}", random_suffix())
}

fn random_suffix() -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(SUFFIX_LEN);
    suffix
}
