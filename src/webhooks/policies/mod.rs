//! Mutation policies for PersistentVolumeClaim admission requests.
//!
//! The webhook never denies. A review ends in a [`Verdict`] that is always
//! allowed and optionally carries JSON Patch operations:
//! - `snapshot_source`: resolve which VolumeSnapshot a claim restores from
//! - `restore_size`: cap the storage request at the snapshot's restore size

pub mod restore_size;
pub mod snapshot_source;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

pub use restore_size::review_claim;
pub use snapshot_source::{SnapshotRef, resolve_snapshot_ref};

/// Label set by CDI on claims whose size was inflated by a storage profile
pub const TRIGGER_LABEL: &str = "cdi.kubevirt.io/applyStorageProfile";

/// JSON pointer to the storage request of a PVC
pub const STORAGE_REQUEST_PATH: &str = "/spec/resources/requests/storage";

/// A single RFC 6902 operation as sent back to the API server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: String,
}

impl PatchOperation {
    /// Replace the value at `path`
    pub fn replace(path: &str, value: impl Into<String>) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.to_string(),
            value: value.into(),
        }
    }
}

/// How a review ended, used for the summary log line and metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReviewOutcome {
    /// A patch capping the storage request was returned
    Corrected,
    /// Allowed unchanged, nothing to correct
    Allowed,
    /// Request was for a kind this webhook does not handle
    SkippedKind,
    /// The claim object could not be decoded
    DecodeError,
    /// The snapshot could not be fetched
    LookupError,
    /// The patch could not be encoded into the response
    PatchError,
}

impl ReviewOutcome {
    /// Stable label value
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Corrected => "corrected",
            ReviewOutcome::Allowed => "allowed",
            ReviewOutcome::SkippedKind => "skipped_kind",
            ReviewOutcome::DecodeError => "decode_error",
            ReviewOutcome::LookupError => "lookup_error",
            ReviewOutcome::PatchError => "patch_error",
        }
    }

    /// Whether the review hit an internal error (and failed open)
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ReviewOutcome::DecodeError | ReviewOutcome::LookupError | ReviewOutcome::PatchError
        )
    }
}

impl std::fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of reviewing a claim. Always allowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// How the review ended
    pub outcome: ReviewOutcome,
    /// Diagnostic surfaced in the response status message
    pub message: Option<String>,
    /// Patch operations, empty when the claim is left unchanged
    pub patch: Vec<PatchOperation>,
}

impl Verdict {
    /// Allow unchanged
    pub fn allowed() -> Self {
        Self {
            outcome: ReviewOutcome::Allowed,
            message: None,
            patch: Vec::new(),
        }
    }

    /// Allow unchanged after an internal error
    pub fn failed_open(outcome: ReviewOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: Some(message.into()),
            patch: Vec::new(),
        }
    }

    /// Allow with a single corrective operation
    pub fn corrected(operation: PatchOperation) -> Self {
        Self {
            outcome: ReviewOutcome::Corrected,
            message: None,
            patch: vec![operation],
        }
    }

    /// Whether the verdict carries a patch
    pub fn has_patch(&self) -> bool {
        !self.patch.is_empty()
    }

    /// Build the admission response for `request`.
    ///
    /// The response uid is copied from the request. If the patch cannot be
    /// encoded the response is still allowed, without a patch, and the
    /// returned outcome is [`ReviewOutcome::PatchError`].
    pub fn into_response(
        self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> (AdmissionResponse, ReviewOutcome) {
        let mut response = AdmissionResponse::from(request);
        if let Some(message) = &self.message {
            response.result.message = message.clone();
        }
        if self.patch.is_empty() {
            return (response, self.outcome);
        }

        match encode_patch(&self.patch).and_then(|patch| {
            response
                .with_patch(patch)
                .map_err(|e| PatchEncodeError(e.to_string()))
        }) {
            Ok(response) => (response, self.outcome),
            Err(e) => {
                error!(uid = %request.uid, error = %e, "Could not encode patch");
                let mut response = AdmissionResponse::from(request);
                response.result.message = e.to_string();
                (response, ReviewOutcome::PatchError)
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("could not encode patch: {0}")]
struct PatchEncodeError(String);

fn encode_patch(operations: &[PatchOperation]) -> Result<json_patch::Patch, PatchEncodeError> {
    serde_json::to_value(operations)
        .and_then(serde_json::from_value)
        .map_err(|e| PatchEncodeError(e.to_string()))
}
