//! Restore size policy.
//!
//! CDI storage profiles can inflate the storage request of a PVC restored from
//! a VolumeSnapshot beyond what some CSI drivers accept for a restore. Claims
//! carrying the trigger label are capped at the snapshot's `restoreSize`.
//!
//! Every early exit allows the claim unchanged. Lookup and decode failures
//! fail open; schema validation belongs to the API server.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{
    PatchOperation, ReviewOutcome, STORAGE_REQUEST_PATH, TRIGGER_LABEL, Verdict,
    resolve_snapshot_ref,
};
use crate::quantity::ParsedQuantity;
use crate::webhooks::lookup::SnapshotLookup;
use crate::webhooks::review::IncomingReview;

/// Review a PVC create request and decide whether to cap its storage request.
pub async fn review_claim<L: SnapshotLookup>(review: &IncomingReview, lookup: &L) -> Verdict {
    let request = &review.request;
    let uid = &request.uid;

    let pvc = match decode_claim(&review.object) {
        Ok(pvc) => pvc,
        Err(e) => {
            error!(uid = %uid, error = %e, "Could not decode PersistentVolumeClaim");
            return Verdict::failed_open(ReviewOutcome::DecodeError, e.to_string());
        }
    };

    let namespace = pvc
        .metadata
        .namespace
        .clone()
        .or_else(|| request.namespace.clone())
        .unwrap_or_default();
    let name = pvc
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| request.name.clone());
    debug!(uid = %uid, namespace = %namespace, name = %name, "Reviewing PVC");

    if !has_trigger_label(&pvc) {
        warn!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            label = TRIGGER_LABEL,
            "PVC does not carry the trigger label, skipping"
        );
        return Verdict::allowed();
    }

    let Some(snapshot_ref) = resolve_snapshot_ref(&pvc, &namespace) else {
        info!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            "PVC has no VolumeSnapshot data source, skipping"
        );
        return Verdict::allowed();
    };

    let snapshot = match lookup.get(&snapshot_ref.namespace, &snapshot_ref.name).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(
                uid = %uid,
                snapshot = %snapshot_ref,
                not_found = e.is_not_found(),
                error = %e,
                "Could not get VolumeSnapshot"
            );
            return Verdict::failed_open(ReviewOutcome::LookupError, e.to_string());
        }
    };

    let Some(restore_size) = snapshot.restore_size().and_then(|q| parse_or_warn(q, "restoreSize"))
    else {
        warn!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            snapshot = %snapshot_ref,
            "VolumeSnapshot has no usable restoreSize, skipping"
        );
        return Verdict::allowed();
    };

    let Some(requested) = storage_request(&pvc).and_then(|q| parse_or_warn(q, "storage request"))
    else {
        warn!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            "PVC has no usable storage request, skipping"
        );
        return Verdict::allowed();
    };

    if requested > restore_size {
        info!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            requested = %requested,
            restore_size = %restore_size,
            snapshot = %snapshot_ref,
            "Oversized PVC, correcting storage request to snapshot restoreSize"
        );
        return Verdict::corrected(PatchOperation::replace(
            STORAGE_REQUEST_PATH,
            restore_size.canonical(),
        ));
    }

    debug!(
        uid = %uid,
        namespace = %namespace,
        name = %name,
        requested = %requested,
        restore_size = %restore_size,
        "PVC storage request within restoreSize, skipping"
    );
    Verdict::allowed()
}

/// Decode the claim from the object exactly as the API server sent it.
fn decode_claim(object: &Value) -> Result<PersistentVolumeClaim, serde_json::Error> {
    if object.is_null() {
        return Err(<serde_json::Error as serde::de::Error>::custom(
            "request carries no object",
        ));
    }
    PersistentVolumeClaim::deserialize(object)
}

fn has_trigger_label(pvc: &PersistentVolumeClaim) -> bool {
    pvc.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(TRIGGER_LABEL))
        .is_some_and(|value| value == "true")
}

fn storage_request(pvc: &PersistentVolumeClaim) -> Option<&Quantity> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
}

fn parse_or_warn(quantity: &Quantity, field: &str) -> Option<ParsedQuantity> {
    ParsedQuantity::try_from(quantity)
        .inspect_err(|e| warn!(field, error = %e, "Could not parse quantity"))
        .ok()
}
