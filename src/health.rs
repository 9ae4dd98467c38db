//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 while the webhook is serving)
//! - `/metrics` - Prometheus metrics endpoint

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::lifecycle::ServiceState;
use crate::webhooks::policies::ReviewOutcome;

/// Labels for admission review metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: ReviewOutcome,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission reviews by outcome
    pub admission_reviews_total: Family<OutcomeLabels, Counter>,
    /// Failed snapshot lookups
    pub snapshot_lookup_errors_total: Counter,
    /// Review duration histogram
    pub review_duration_seconds: Histogram,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_reviews_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "pvcshrinkray_admission_reviews",
            "Total number of admission reviews by outcome",
            admission_reviews_total.clone(),
        );

        let snapshot_lookup_errors_total = Counter::default();
        registry.register(
            "pvcshrinkray_snapshot_lookup_errors",
            "Total number of failed VolumeSnapshot lookups",
            snapshot_lookup_errors_total.clone(),
        );

        let review_duration_seconds = Histogram::new(exponential_buckets(0.0005, 2.0, 15));
        registry.register(
            "pvcshrinkray_review_duration_seconds",
            "Duration of admission review handling in seconds",
            review_duration_seconds.clone(),
        );

        Self {
            admission_reviews_total,
            snapshot_lookup_errors_total,
            review_duration_seconds,
            registry,
        }
    }

    /// Record a completed admission review
    pub fn record_review(&self, outcome: ReviewOutcome, duration_secs: f64) {
        self.admission_reviews_total
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
        if outcome == ReviewOutcome::LookupError {
            self.snapshot_lookup_errors_total.inc();
        }
        self.review_duration_seconds.observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Current lifecycle state
    state: RwLock<ServiceState>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts in `Starting`, not ready)
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ServiceState::Starting),
            metrics: Metrics::new(),
        }
    }

    /// Move to `next` if it is a forward transition. Returns whether it moved.
    pub async fn advance(&self, next: ServiceState) -> bool {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            warn!(from = %*state, to = %next, "Ignoring invalid lifecycle transition");
            return false;
        }
        info!(from = %*state, to = %next, "Lifecycle transition");
        *state = next;
        true
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    /// Check if the webhook is ready to serve
    pub async fn is_ready(&self) -> bool {
        self.state().await.is_serving()
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK while serving, 503 Service Unavailable otherwise.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on plain HTTP until `shutdown` resolves.
pub async fn run_health_server(
    state: Arc<HealthState>,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
