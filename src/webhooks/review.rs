//! Admission review decoding.
//!
//! The envelope and the reviewed object are decoded separately: only the
//! envelope has to be well formed for the webhook to answer. The object is
//! kept as the raw JSON the API server sent, so a claim that fails to decode
//! reaches the policy, which fails open.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use serde_json::Value;
use thiserror::Error;

/// Errors that make an admission review unanswerable
#[derive(Error, Debug)]
pub enum ReviewDecodeError {
    /// Body is not JSON or the envelope does not match `AdmissionReview`
    #[error("failed to unmarshal admission review: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope carries no `request`
    #[error("admission review request is missing")]
    MissingRequest,
}

/// An admission request whose object is still raw JSON.
#[derive(Clone, Debug)]
pub struct IncomingReview {
    /// Envelope fields (uid, kind, namespace, ...). `object` is always `None`.
    pub request: AdmissionRequest<DynamicObject>,
    /// `request.object` as sent, `Value::Null` when absent
    pub object: Value,
}

impl IncomingReview {
    /// Decode a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ReviewDecodeError> {
        Self::from_value(serde_json::from_slice(body)?)
    }

    /// Decode an already parsed review envelope.
    pub fn from_value(mut envelope: Value) -> Result<Self, ReviewDecodeError> {
        let object = match envelope.get_mut("request").and_then(Value::as_object_mut) {
            Some(request) => {
                // Unused on CREATE; must not fail the envelope either.
                request.remove("oldObject");
                request.remove("object").unwrap_or(Value::Null)
            }
            None => Value::Null,
        };

        let review: AdmissionReview<DynamicObject> = serde_json::from_value(envelope)?;
        let request = review
            .try_into()
            .map_err(|_| ReviewDecodeError::MissingRequest)?;
        Ok(Self { request, object })
    }
}
