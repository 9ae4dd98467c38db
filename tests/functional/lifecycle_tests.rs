//! Server startup, connection limits and lifecycle tests.
//!
//! The TLS tests run the real listener on a local port with the certificate
//! under `tests/fixtures/tls`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pvc_shrink_ray::crd::VolumeSnapshot;
use pvc_shrink_ray::webhooks::{LookupError, SnapshotLookup};
use pvc_shrink_ray::{HealthState, ServiceState, WebhookConfig, WebhookError, run_webhook_server};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use crate::common::fixtures::{InMemorySnapshots, PvcBuilder, pvc_review_json, snapshot};
use crate::common::tls::{connect, exchange, install_crypto_provider, post_mutate, read_until_closed, tls_config};

/// Never answers; signals once a lookup has started.
#[derive(Clone, Default)]
struct StuckLookup {
    started: Arc<Notify>,
}

impl SnapshotLookup for StuckLookup {
    async fn get(&self, _namespace: &str, _name: &str) -> Result<VolumeSnapshot, LookupError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

/// Run the webhook in the background until the returned sender fires.
fn spawn_server<L: SnapshotLookup + 'static>(
    config: WebhookConfig,
    lookup: L,
    health: Arc<HealthState>,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), WebhookError>>) {
    install_crypto_provider();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.await;
            "SIGTERM"
        };
        run_webhook_server(&config, lookup, health, shutdown).await
    });
    (stop_tx, server)
}

async fn wait_for_state(health: &HealthState, expected: ServiceState) {
    for _ in 0..500 {
        if health.state().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "never reached {expected}, stuck in {}",
        health.state().await
    );
}

fn labelled_review(uid: &str) -> String {
    let pvc = PvcBuilder::new("disk")
        .namespace("vms")
        .trigger_label()
        .snapshot_data_source("golden")
        .storage("21Gi")
        .build();
    pvc_review_json(uid, &pvc).to_string()
}

#[tokio::test]
async fn test_missing_tls_material_is_fatal() {
    let health = Arc::new(HealthState::new());
    let config = WebhookConfig {
        port: 0,
        cert_path: PathBuf::from("/nonexistent/tls.crt"),
        key_path: PathBuf::from("/nonexistent/tls.key"),
        ..Default::default()
    };
    let result = run_webhook_server(
        &config,
        InMemorySnapshots::default(),
        health.clone(),
        std::future::pending::<&'static str>(),
    )
    .await;

    assert!(matches!(result, Err(WebhookError::TlsConfig(_))), "{result:?}");
    // Never started serving
    assert_eq!(health.state().await, ServiceState::Starting);
    assert!(!health.is_ready().await);
}

#[tokio::test]
async fn test_lifecycle_only_moves_forward() {
    let health = HealthState::new();
    assert_eq!(health.state().await, ServiceState::Starting);

    // Skipping straight to draining is a forward move
    assert!(health.advance(ServiceState::Draining).await);
    assert!(!health.advance(ServiceState::Serving).await);
    assert!(!health.advance(ServiceState::Starting).await);
    assert!(health.advance(ServiceState::Stopped).await);
    assert!(!health.advance(ServiceState::Stopped).await);
    assert_eq!(health.state().await, ServiceState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serves_over_tls_then_drains_on_signal() {
    let health = Arc::new(HealthState::new());
    let config = tls_config(Duration::from_secs(5), Duration::from_secs(5));
    let port = config.port;
    let lookup = InMemorySnapshots::new(vec![snapshot("vms", "golden", Some("20Gi"))]);
    let (stop, server) = spawn_server(config, lookup, health.clone());

    wait_for_state(&health, ServiceState::Serving).await;
    assert!(health.is_ready().await);

    let mut stream = connect(port).await;
    let response = exchange(&mut stream, post_mutate(&labelled_review("tls-1")).as_bytes()).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"uid\":\"tls-1\""), "{response}");
    assert!(response.contains("\"allowed\":true"), "{response}");
    assert!(response.contains("\"patchType\":\"JSONPatch\""), "{response}");

    let mut stream = connect(port).await;
    let response = exchange(
        &mut stream,
        b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("OK"), "{response}");

    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("drain did not finish")
        .unwrap();
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(health.state().await, ServiceState::Stopped);
    assert!(!health.is_ready().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drain_closes_stuck_requests_after_grace_period() {
    let grace = Duration::from_millis(300);
    let health = Arc::new(HealthState::new());
    let config = tls_config(grace, Duration::from_secs(5));
    let port = config.port;
    let lookup = StuckLookup::default();
    let started = lookup.started.clone();
    let (stop, server) = spawn_server(config, lookup, health.clone());

    wait_for_state(&health, ServiceState::Serving).await;

    let client = tokio::spawn(async move {
        let mut stream = connect(port).await;
        exchange(&mut stream, post_mutate(&labelled_review("stuck")).as_bytes()).await
    });
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("request never reached the lookup");

    let signalled = Instant::now();
    stop.send(()).unwrap();
    wait_for_state(&health, ServiceState::Draining).await;

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("drain outlived its grace period")
        .unwrap();
    let elapsed = signalled.elapsed();

    assert!(result.is_ok(), "{result:?}");
    assert!(elapsed >= grace, "returned after {elapsed:?}");
    assert_eq!(health.state().await, ServiceState::Stopped);

    // The stuck request got no answer
    let response = tokio::time::timeout(Duration::from_secs(5), client)
        .await
        .expect("client still connected")
        .unwrap();
    assert!(!response.contains("HTTP/1.1 200"), "{response}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_request_headers_are_cut_off() {
    let request_timeout = Duration::from_millis(300);
    let health = Arc::new(HealthState::new());
    let config = tls_config(Duration::from_secs(1), request_timeout);
    let port = config.port;
    let (stop, server) = spawn_server(config, InMemorySnapshots::default(), health.clone());

    wait_for_state(&health, ServiceState::Serving).await;

    let mut stream = connect(port).await;
    stream
        .write_all(b"POST /mutate HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    let sent = Instant::now();
    let response = tokio::time::timeout(Duration::from_secs(5), read_until_closed(&mut stream))
        .await
        .expect("connection with incomplete headers was kept open");

    assert!(sent.elapsed() >= request_timeout);
    assert!(!response.contains("HTTP/1.1 200"), "{response}");

    stop.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok(), "{result:?}");
}
