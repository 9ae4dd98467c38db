//! Mutating admission webhook for PersistentVolumeClaims.
//!
//! - `server`: HTTP handling, transport validation and the TLS listener
//! - `policies`: the decision engine producing an always-allowed verdict
//! - `lookup`: VolumeSnapshot lookup collaborator
//! - `review`: envelope decoding that keeps the reviewed object as raw JSON

pub mod lookup;
pub mod policies;
mod review;
mod server;

pub use lookup::{KubeSnapshotLookup, LookupError, SnapshotLookup};
pub use policies::{PatchOperation, ReviewOutcome, Verdict, review_claim};
pub use review::{IncomingReview, ReviewDecodeError};
pub use server::{
    JSON_CONTENT_TYPE, MAX_BODY_BYTES, SUPPORTED_KIND, WebhookError, WebhookState,
    create_webhook_router, handle_mutate, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
