//! Capturing the initial cluster snapshot.
//!
//! The simulator reads a real cluster exactly once at startup. Everything the
//! scheduler will later list is captured here: nodes and non-terminated pods
//! as typed objects, the remaining resources as ready-to-serve list bodies.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{
    Node, PersistentVolume, PersistentVolumeClaim, Pod, ReplicationController, Service,
};
use kube::api::{Api, ListParams, ObjectList};
use kube::Client;
use risk_advisor_core::WireList;
use risk_advisor_state::{
    ResourceBlobs, ResourceKind, Snapshot, ASSIGNED_NON_TERMINATED, UNASSIGNED_NON_TERMINATED,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::SimulatorConfig;
use crate::{Result, SimulationError};

/// Interval between attempts of a failing list call.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// A source of the initial cluster state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Capture the cluster state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be captured.
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Captures the snapshot from a Kubernetes API server.
pub struct KubeSnapshotSource {
    client: Client,
    timeout: Duration,
}

impl KubeSnapshotSource {
    /// Connect to the configured API server, or the ambient cluster when none
    /// is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or no client can be built.
    pub async fn new(config: &SimulatorConfig) -> Result<Self> {
        let client = match &config.apiserver_url {
            Some(url) => {
                let uri = url
                    .parse()
                    .map_err(|e| SimulationError::Setup(format!("invalid API server URL {url}: {e}")))?;
                Client::try_from(kube::Config::new(uri))?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::with_client(client, config.snapshot_timeout()))
    }

    /// Create a source over a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn list_typed<K>(
        &self,
        what: &str,
        fields: Option<&str>,
        deadline: Instant,
    ) -> Result<ObjectList<K>>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let mut params = ListParams::default().match_any();
        if let Some(fields) = fields {
            params = params.fields(fields);
        }
        retry_until(what, deadline, || api.list(&params)).await
    }

    async fn list_blob<K>(&self, kind: ResourceKind, deadline: Instant) -> Result<Vec<u8>>
    where
        K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let list = self.list_typed::<K>(kind.list_kind(), None, deadline).await?;
        encode_blob(kind, list)
    }
}

#[async_trait]
impl SnapshotSource for KubeSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let deadline = Instant::now() + self.timeout;

        let nodes = self.list_typed::<Node>("nodes", None, deadline).await?;
        let assigned = self
            .list_typed::<Pod>("assigned pods", Some(ASSIGNED_NON_TERMINATED), deadline)
            .await?;
        let unassigned = self
            .list_typed::<Pod>("unassigned pods", Some(UNASSIGNED_NON_TERMINATED), deadline)
            .await?;

        let blobs = ResourceBlobs::new()
            .with(
                ResourceKind::PersistentVolumeClaims,
                self.list_blob::<PersistentVolumeClaim>(ResourceKind::PersistentVolumeClaims, deadline)
                    .await?,
            )
            .with(
                ResourceKind::PersistentVolumes,
                self.list_blob::<PersistentVolume>(ResourceKind::PersistentVolumes, deadline)
                    .await?,
            )
            .with(
                ResourceKind::Services,
                self.list_blob::<Service>(ResourceKind::Services, deadline).await?,
            )
            .with(
                ResourceKind::ReplicationControllers,
                self.list_blob::<ReplicationController>(ResourceKind::ReplicationControllers, deadline)
                    .await?,
            )
            .with(
                ResourceKind::ReplicaSets,
                self.list_blob::<ReplicaSet>(ResourceKind::ReplicaSets, deadline)
                    .await?,
            );

        let resource_version = parse_version(nodes.metadata.resource_version.as_deref());
        let pods: Vec<Pod> = assigned.items.into_iter().chain(unassigned.items).collect();
        info!(
            nodes = nodes.items.len(),
            pods = pods.len(),
            resource_version,
            "Captured cluster snapshot"
        );

        Ok(Snapshot {
            pods,
            nodes: nodes.items,
            resource_version,
            blobs,
        })
    }
}

/// Retry `call` every [`RETRY_INTERVAL`] until it succeeds or `deadline` passes.
async fn retry_until<T, F, Fut>(what: &str, deadline: Instant, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = kube::Result<T>>,
{
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if Instant::now() + RETRY_INTERVAL < deadline => {
                warn!(resource = %what, error = %e, "Listing failed, retrying");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(SimulationError::Setup(format!("listing {what}: {e}")));
            }
        }
    }
}

fn parse_version(raw: Option<&str>) -> u64 {
    match raw.map(str::parse::<u64>) {
        Some(Ok(version)) => version,
        _ => {
            warn!(resource_version = ?raw, "Non-numeric node list version, starting at 0");
            0
        }
    }
}

/// Re-wrap a captured list in the envelope the scheduler expects for `kind`.
fn encode_blob<K: Serialize + Clone>(kind: ResourceKind, list: ObjectList<K>) -> Result<Vec<u8>> {
    let version = list
        .metadata
        .resource_version
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    let wire = WireList::new(
        kind.list_kind(),
        kind.api_version(),
        kind.path(),
        version,
        list.items,
    );
    serde_json::to_vec(&wire)
        .map_err(|e| SimulationError::Setup(format!("encoding {}: {e}", kind.list_kind())))
}

/// In-memory snapshot sources for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;

    /// Serves a fixed snapshot.
    #[derive(Debug, Clone, Default)]
    pub struct StaticSnapshotSource {
        snapshot: Snapshot,
    }

    impl StaticSnapshotSource {
        /// Create a source that always returns `snapshot`.
        #[must_use]
        pub fn new(snapshot: Snapshot) -> Self {
            Self { snapshot }
        }
    }

    #[async_trait]
    impl SnapshotSource for StaticSnapshotSource {
        async fn fetch(&self) -> Result<Snapshot> {
            Ok(self.snapshot.clone())
        }
    }

    /// Always fails with a setup error.
    #[derive(Debug, Clone)]
    pub struct FailingSnapshotSource {
        reason: String,
    }

    impl FailingSnapshotSource {
        /// Create a source that fails with `reason`.
        #[must_use]
        pub fn new(reason: impl Into<String>) -> Self {
            Self {
                reason: reason.into(),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for FailingSnapshotSource {
        async fn fetch(&self) -> Result<Snapshot> {
            Err(SimulationError::Setup(self.reason.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn list(kind: &str, api_version: &str, version: &str, items: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "kind": kind,
            "apiVersion": api_version,
            "metadata": {"resourceVersion": version},
            "items": items,
        }))
    }

    fn source_for(server: &MockServer, timeout: Duration) -> KubeSnapshotSource {
        let config = kube::Config::new(server.uri().parse().unwrap());
        KubeSnapshotSource::with_client(Client::try_from(config).unwrap(), timeout)
    }

    async fn mount_empty_lists(server: &MockServer) {
        for (route, kind, api_version) in [
            ("/api/v1/persistentvolumeclaims", "PersistentVolumeClaimList", "v1"),
            ("/api/v1/persistentvolumes", "PersistentVolumeList", "v1"),
            ("/api/v1/replicationcontrollers", "ReplicationControllerList", "v1"),
            ("/apis/apps/v1/replicasets", "ReplicaSetList", "apps/v1"),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(list(kind, api_version, "90", json!([])))
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/api/v1/services"))
            .respond_with(list(
                "ServiceList",
                "v1",
                "90",
                json!([{"apiVersion": "v1", "kind": "Service", "metadata": {"name": "kube-dns", "namespace": "kube-system"}}]),
            ))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_captures_nodes_pods_and_blobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .respond_with(list(
                "NodeList",
                "v1",
                "1234",
                json!([{"apiVersion": "v1", "kind": "Node", "metadata": {"name": "node1"}}]),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("fieldSelector", ASSIGNED_NON_TERMINATED))
            .respond_with(list(
                "PodList",
                "v1",
                "1234",
                json!([{"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "running", "namespace": "default"}, "spec": {"nodeName": "node1", "containers": []}}]),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("fieldSelector", UNASSIGNED_NON_TERMINATED))
            .respond_with(list(
                "PodList",
                "v1",
                "1234",
                json!([{"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "waiting", "namespace": "default"}}]),
            ))
            .mount(&server)
            .await;
        mount_empty_lists(&server).await;

        let snapshot = source_for(&server, Duration::from_secs(5)).fetch().await.unwrap();

        assert_eq!(snapshot.resource_version, 1234);
        assert_eq!(snapshot.nodes.len(), 1);
        let mut names: Vec<_> = snapshot
            .pods
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, ["running", "waiting"]);

        let services: serde_json::Value =
            serde_json::from_slice(&snapshot.blobs.get(ResourceKind::Services)).unwrap();
        assert_eq!(services["kind"], "ServiceList");
        assert_eq!(services["metadata"]["selfLink"], "/api/v1/services");
        assert_eq!(services["metadata"]["resourceVersion"], "90");
        assert_eq!(services["items"][0]["metadata"]["name"], "kube-dns");

        let replica_sets: serde_json::Value =
            serde_json::from_slice(&snapshot.blobs.get(ResourceKind::ReplicaSets)).unwrap();
        assert_eq!(replica_sets["apiVersion"], "extensions/v1beta1");
    }

    #[tokio::test]
    async fn fetch_gives_up_at_the_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server, Duration::from_millis(200))
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::Setup(ref message) if message.contains("nodes")));
    }

    #[test]
    fn non_numeric_version_starts_at_zero() {
        assert_eq!(parse_version(Some("42")), 42);
        assert_eq!(parse_version(Some("abc")), 0);
        assert_eq!(parse_version(None), 0);
    }
}
