//! Admission webhook server.
//!
//! Provides HTTPS endpoints for the Kubernetes mutating admission webhook:
//! - `POST /mutate` - review PersistentVolumeClaim create requests
//! - `GET /healthz` - liveness on the TLS listener
//!
//! The webhook never denies. Transport-level problems (wrong method, content
//! type, unreadable body) are rejected with a 4xx and a plain-text reason
//! before any review takes place.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::{Bytes, to_bytes},
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::TokioTimer;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;
use crate::health::HealthState;
use crate::lifecycle::ServiceState;
use crate::webhooks::lookup::SnapshotLookup;
use crate::webhooks::policies::{ReviewOutcome, review_claim};
use crate::webhooks::review::IncomingReview;

/// Maximum accepted request body (1 MiB)
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Only media type accepted on `/mutate`
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Kind reviewed by this webhook (core group)
pub const SUPPORTED_KIND: &str = "PersistentVolumeClaim";

/// Shared state for webhook handlers
pub struct WebhookState<L> {
    /// Snapshot lookup collaborator
    pub lookup: L,
    /// Upper bound on reading a request body
    pub request_timeout: Duration,
    /// Optional health state for metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl<L: SnapshotLookup> WebhookState<L> {
    pub fn new(lookup: L, request_timeout: Duration, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            lookup,
            request_timeout,
            health_state,
        }
    }

    fn record(&self, outcome: ReviewOutcome, started: Instant) {
        if let Some(health) = &self.health_state {
            health
                .metrics
                .record_review(outcome, started.elapsed().as_secs_f64());
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router<L: SnapshotLookup + 'static>(state: Arc<WebhookState<L>>) -> Router {
    Router::new()
        .route("/mutate", any(mutate::<L>))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn mutate<L: SnapshotLookup>(
    State(state): State<Arc<WebhookState<L>>>,
    request: Request,
) -> Response {
    handle_mutate(&state, request).await
}

/// Handle one `/mutate` call.
///
/// Preconditions are checked in order, each short-circuiting: method,
/// content type, body (size, timeout, non-empty), envelope decoding, presence
/// of the inner request. Other kinds than PersistentVolumeClaim are allowed
/// unchanged. Every branch logs exactly one summary line.
pub async fn handle_mutate<L: SnapshotLookup>(state: &WebhookState<L>, request: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();

    if parts.method != Method::POST {
        error!(method = %parts.method, "Invalid request method");
        return reject(StatusCode::METHOD_NOT_ALLOWED, "invalid request method");
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        error!(content_type, "Invalid content type");
        return reject(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "invalid content type, expected application/json",
        );
    }

    let body = match read_body(body, state.request_timeout).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Could not read request body");
            return reject(StatusCode::BAD_REQUEST, "could not read request body");
        }
    };

    if body.is_empty() {
        error!("Empty request body");
        return reject(StatusCode::BAD_REQUEST, "empty request body");
    }

    let review = match IncomingReview::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Could not decode admission review");
            return reject(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    let request = &review.request;

    if !request.kind.group.is_empty() || request.kind.kind != SUPPORTED_KIND {
        warn!(
            uid = %request.uid,
            group = %request.kind.group,
            version = %request.kind.version,
            kind = %request.kind.kind,
            "Unsupported kind, allowing unchanged"
        );
        state.record(ReviewOutcome::SkippedKind, started);
        return respond(AdmissionResponse::from(request));
    }

    let verdict = review_claim(&review, &state.lookup).await;
    let (response, outcome) = verdict.into_response(request);

    match outcome {
        ReviewOutcome::Corrected => info!(
            uid = %request.uid,
            namespace = ?request.namespace,
            name = %request.name,
            "Admission request corrected"
        ),
        outcome if outcome.is_error() => error!(
            uid = %request.uid,
            namespace = ?request.namespace,
            name = %request.name,
            outcome = %outcome,
            message = %response.result.message,
            "Admission request allowed after error"
        ),
        _ => info!(
            uid = %request.uid,
            namespace = ?request.namespace,
            name = %request.name,
            "Admission request allowed"
        ),
    }
    state.record(outcome, started);

    respond(response)
}

#[derive(Debug, Error)]
enum BodyError {
    #[error("{0}")]
    Read(#[from] axum::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Read at most [`MAX_BODY_BYTES`] within `timeout`.
async fn read_body(body: axum::body::Body, timeout: Duration) -> Result<Bytes, BodyError> {
    match tokio::time::timeout(timeout, to_bytes(body, MAX_BODY_BYTES)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BodyError::Timeout(timeout)),
    }
}

fn reject(status: StatusCode, reason: &str) -> Response {
    (status, reason.to_string()).into_response()
}

/// Serialize the review envelope carrying `response`.
fn respond(response: AdmissionResponse) -> Response {
    let review: AdmissionReview<DynamicObject> = response.into_review();
    match serde_json::to_vec(&review) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Could not marshal response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener failed or exited without a shutdown request
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS until `shutdown` resolves.
///
/// Binds `0.0.0.0:<port>`, serves `/mutate` and `/healthz`, and tracks the
/// lifecycle in `health_state`. When `shutdown` resolves the server stops
/// accepting connections and in-flight requests get the configured grace
/// period; connections still open afterwards are closed.
///
/// Returns an error if TLS material cannot be loaded or if the listener
/// exits on its own. Both are fatal to the process.
pub async fn run_webhook_server<L, F>(
    config: &WebhookConfig,
    lookup: L,
    health_state: Arc<HealthState>,
    shutdown: F,
) -> Result<(), WebhookError>
where
    L: SnapshotLookup + 'static,
    F: Future<Output = &'static str>,
{
    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let state = Arc::new(WebhookState::new(
        lookup,
        config.request_timeout,
        Some(health_state.clone()),
    ));
    let app = create_webhook_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();

    {
        let handle = handle.clone();
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                info!(%addr, "Webhook server listening with TLS");
                health_state.advance(ServiceState::Serving).await;
            }
        });
    }

    let mut server = axum_server::bind_rustls(addr, tls).handle(handle.clone());
    // Header reads and idle keep-alive connections share the request timeout.
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(config.request_timeout)
        .keep_alive(true);
    server
        .http_builder()
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_interval(config.request_timeout)
        .keep_alive_timeout(config.request_timeout);
    let server = server.serve(app.into_make_service());
    tokio::pin!(server);

    let signal = tokio::select! {
        result = &mut server => {
            let reason = match result {
                Ok(()) => "listener exited without a shutdown request".to_string(),
                Err(e) => e.to_string(),
            };
            return Err(WebhookError::Server(reason));
        }
        signal = shutdown => signal,
    };

    info!(signal, "Received shutdown signal, draining in-flight requests");
    health_state.advance(ServiceState::Draining).await;

    handle.graceful_shutdown(Some(config.shutdown_grace_period));
    info!(
        grace_period_secs = config.shutdown_grace_period.as_secs(),
        connections = handle.connection_count(),
        "Waiting for in-flight requests to complete"
    );
    server
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    health_state.advance(ServiceState::Stopped).await;
    info!("Webhook server stopped");
    Ok(())
}
