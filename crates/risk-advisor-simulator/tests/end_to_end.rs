//! End-to-end runs against a stub scheduler speaking HTTP.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use risk_advisor_core::{CapacityResult, SchedulingResult, SimulationRequest};
use risk_advisor_simulator::init::{initialize, setup};
use risk_advisor_simulator::{
    advise, FailingSnapshotSource, SimulationError, Simulator, SimulatorConfig,
    StaticSnapshotSource,
};
use risk_advisor_state::{ClusterState, Snapshot, UNASSIGNED_NON_TERMINATED};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

// ============================================================================
// Stub scheduler
// ============================================================================

/// What the stub does with a pending pod.
#[derive(Debug, Clone, Copy)]
enum Verdict {
    /// Bind to the node and report `Scheduled`.
    Bind(&'static str),
    /// Report `FailedScheduling` with the message, without binding.
    Fail(&'static str),
    /// Post a binding the API server cannot parse.
    Garbage,
}

/// Poll for pending pods and act on each one once, until `expected` pods
/// have been handled.
fn stub_scheduler<F>(addr: SocketAddr, expected: usize, decide: F) -> JoinHandle<Vec<String>>
where
    F: Fn(&str, usize) -> Verdict + Send + 'static,
{
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let base = format!("http://{addr}");

        let nodes: Value = client
            .get(format!("{base}/api/v1/nodes"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(nodes["kind"], "NodeList");

        let mut handled = Vec::new();
        let mut seen = HashSet::new();
        while handled.len() < expected {
            let pods: Value = client
                .get(format!("{base}/api/v1/pods"))
                .query(&[("fieldSelector", UNASSIGNED_NON_TERMINATED)])
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();

            let names: Vec<String> = pods["items"]
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|pod| pod["metadata"]["name"].as_str().map(str::to_string))
                .collect();

            for name in names {
                if handled.len() >= expected || !seen.insert(name.clone()) {
                    continue;
                }
                match decide(&name, handled.len()) {
                    Verdict::Bind(node) => {
                        let status = client
                            .post(format!("{base}/api/v1/namespaces/default/bindings"))
                            .json(&json!({
                                "kind": "Binding",
                                "apiVersion": "v1",
                                "metadata": {"name": name, "namespace": "default"},
                                "target": {"kind": "Node", "name": node},
                            }))
                            .send()
                            .await
                            .unwrap()
                            .status();
                        assert_eq!(status, reqwest::StatusCode::CREATED);
                        post_event(&client, &base, &name, "Scheduled", &format!("assigned to {node}")).await;
                    }
                    Verdict::Fail(message) => {
                        post_event(&client, &base, &name, "FailedScheduling", message).await;
                    }
                    Verdict::Garbage => {
                        let status = client
                            .post(format!("{base}/api/v1/namespaces/default/bindings"))
                            .body("{\"metadata\": ")
                            .send()
                            .await
                            .unwrap()
                            .status();
                        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                    }
                }
                handled.push(name);
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handled
    })
}

async fn post_event(client: &reqwest::Client, base: &str, pod: &str, reason: &str, message: &str) {
    let event_type = if reason == "Scheduled" { "Normal" } else { "Warning" };
    let status = client
        .post(format!("{base}/api/v1/namespaces/default/events"))
        .json(&json!({
            "kind": "Event",
            "apiVersion": "v1",
            "metadata": {"name": format!("{pod}.1"), "namespace": "default"},
            "involvedObject": {"kind": "Pod", "name": pod, "namespace": "default"},
            "reason": reason,
            "message": message,
            "type": event_type,
        }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::CONFLICT);
}

// ============================================================================
// Fixtures
// ============================================================================

fn named<T>(name: &str, build: impl FnOnce(ObjectMeta) -> T) -> T {
    build(ObjectMeta {
        name: Some(name.to_string()),
        ..ObjectMeta::default()
    })
}

fn pod(name: &str) -> Pod {
    named(name, |metadata| Pod {
        metadata,
        ..Pod::default()
    })
}

fn two_node_snapshot() -> Snapshot {
    Snapshot {
        nodes: vec![
            named("node1", |metadata| Node {
                metadata,
                ..Node::default()
            }),
            named("node2", |metadata| Node {
                metadata,
                ..Node::default()
            }),
        ],
        resource_version: 1_000,
        ..Snapshot::default()
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

async fn start(config: SimulatorConfig) -> (Arc<Simulator>, SocketAddr) {
    let state = ClusterState::from_snapshot(two_node_snapshot());
    let simulator = Arc::new(Simulator::new(
        Arc::new(state),
        SimulatorConfig {
            scheduler_addr: "127.0.0.1:0".to_string(),
            watch_hold_ms: 10,
            ..config
        },
    ));
    let addr = simulator.listen().await.unwrap();
    (simulator, addr)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn one_pod_fits_and_one_does_not() {
    let (simulator, addr) = start(SimulatorConfig::default()).await;
    let stub = stub_scheduler(addr, 2, |name, _| match name {
        "a" => Verdict::Bind("node1"),
        _ => Verdict::Fail("insufficient cpu"),
    });

    let mut results = simulator
        .run(SimulationRequest {
            to_create: vec![pod("a"), pod("b")],
            to_delete: Vec::new(),
        })
        .await
        .unwrap();
    results.sort_by(|x, y| x.pod_name.cmp(&y.pod_name));

    assert_eq!(
        results,
        vec![
            SchedulingResult::verdict("a", "Scheduled", "assigned to node1"),
            SchedulingResult::verdict("b", "FailedScheduling", "insufficient cpu"),
        ]
    );
    assert_eq!(stub.await.unwrap().len(), 2);
    assert!(simulator.brain().get_pod("a").is_none());
    assert!(simulator.brain().get_pod("b").is_none());
}

#[tokio::test]
async fn unnamed_pods_get_results_under_generated_names() {
    let (simulator, addr) = start(SimulatorConfig::default()).await;
    let stub = stub_scheduler(addr, 3, |_, _| Verdict::Bind("node2"));

    let results = simulator
        .run(SimulationRequest {
            to_create: vec![Pod::default(), Pod::default(), pod("named")],
            to_delete: Vec::new(),
        })
        .await
        .unwrap();

    let handled: HashSet<String> = stub.await.unwrap().into_iter().collect();
    let reported: HashSet<String> = results.iter().filter_map(|r| r.pod_name.clone()).collect();
    assert_eq!(results.len(), 3);
    assert_eq!(reported, handled);
    assert!(reported.contains("named"));
    assert!(results.iter().all(|r| r.result.as_deref() == Some("Scheduled")));
}

#[tokio::test]
async fn capacity_counts_placements_before_first_failure() {
    let (simulator, addr) = start(SimulatorConfig::default()).await;
    let stub = stub_scheduler(addr, 4, |_, index| {
        if index < 3 {
            Verdict::Bind("node1")
        } else {
            Verdict::Fail("insufficient memory")
        }
    });

    let result = simulator.probe_capacity(pod("web")).await.unwrap();

    assert_eq!(
        result,
        CapacityResult {
            capacity: 3,
            limit_reached: false
        }
    );
    let handled = stub.await.unwrap();
    assert!(handled.iter().all(|name| name.starts_with("web-")));
    assert_eq!(simulator.brain().state().pod_count(), 0);
}

#[tokio::test]
async fn capacity_stops_at_iteration_limit() {
    let (simulator, addr) = start(SimulatorConfig {
        capacity_max_iterations: 5,
        ..SimulatorConfig::default()
    })
    .await;
    let stub = stub_scheduler(addr, usize::MAX, |_, _| Verdict::Bind("node2"));

    let result = simulator.probe_capacity(Pod::default()).await.unwrap();
    stub.abort();

    assert_eq!(
        result,
        CapacityResult {
            capacity: 5,
            limit_reached: true
        }
    );
}

#[tokio::test]
async fn malformed_binding_aborts_the_run() {
    let (simulator, addr) = start(SimulatorConfig::default()).await;
    let stub = stub_scheduler(addr, 1, |_, _| Verdict::Garbage);

    let err = simulator
        .run(SimulationRequest {
            to_create: vec![pod("a")],
            to_delete: Vec::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SimulationError::Protocol(_)));
    assert_eq!(err.http_status_code(), 500);
    stub.await.unwrap();
    assert!(simulator.brain().get_pod("a").is_none());
}

#[tokio::test]
async fn runs_are_repeatable_on_one_simulator() {
    let (simulator, addr) = start(SimulatorConfig::default()).await;

    for round in 0..2 {
        let stub = stub_scheduler(addr, 1, |_, _| Verdict::Bind("node1"));
        let results = simulator
            .run(SimulationRequest {
                to_create: vec![pod("again")],
                to_delete: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1, "round {round}");
        stub.await.unwrap();
    }
    assert_eq!(simulator.brain().state().pod_count(), 0);
}

#[tokio::test]
async fn advisory_api_drives_a_run_over_http() {
    let config = SimulatorConfig {
        scheduler_addr: "127.0.0.1:0".to_string(),
        watch_hold_ms: 10,
        ..SimulatorConfig::default()
    };
    let source = StaticSnapshotSource::new(two_node_snapshot());
    let simulator = setup(&config, &source).await.unwrap();
    let scheduler_addr = simulator.listen().await.unwrap();
    let base = serve(advise::router(simulator, config.max_body_bytes)).await;

    let stub = stub_scheduler(scheduler_addr, 1, |_, _| Verdict::Bind("node2"));
    let response = reqwest::Client::new()
        .post(format!("{base}/advise"))
        .json(&json!({"toCreate": [{"metadata": {"name": "web"}}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let results: Vec<SchedulingResult> = response.json().await.unwrap();
    assert_eq!(
        results,
        vec![SchedulingResult::verdict("web", "Scheduled", "assigned to node2")]
    );
    stub.await.unwrap();
}

#[tokio::test]
async fn unreachable_cluster_is_reported_on_every_request() {
    let config = SimulatorConfig {
        scheduler_addr: "127.0.0.1:0".to_string(),
        ..SimulatorConfig::default()
    };
    let source = FailingSnapshotSource::new("listing nodes: connection refused");
    let base = serve(initialize(&config, &source).await).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/capacity"))
        .json(&json!({"metadata": {"name": "web"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["errorMessage"]
        .as_str()
        .unwrap()
        .starts_with("failed to fetch cluster state"));

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}
