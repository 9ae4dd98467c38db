//! VolumeSnapshot resource from the CSI external-snapshotter.
//!
//! The CRD is owned by the snapshot controller, not by this webhook. Only the
//! fields needed to resolve a restore size are modelled; unknown fields are
//! ignored on deserialization.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the VolumeSnapshot resource.
pub const SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";

/// Kind name used in PVC data source references.
pub const SNAPSHOT_KIND: &str = "VolumeSnapshot";

/// VolumeSnapshot is a user's request for a point-in-time copy of a volume.
///
/// Example:
/// ```yaml
/// apiVersion: snapshot.storage.k8s.io/v1
/// kind: VolumeSnapshot
/// metadata:
///   name: my-snapshot
/// spec:
///   source:
///     persistentVolumeClaimName: my-pvc
/// status:
///   readyToUse: true
///   restoreSize: 20Gi
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshot",
    plural = "volumesnapshots",
    status = "VolumeSnapshotStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// Where the snapshot is taken from (a PVC) or which content it binds to.
    #[serde(default)]
    pub source: VolumeSnapshotSource,

    /// Name of the VolumeSnapshotClass requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Exactly one of the two fields is set by the user.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    /// PVC to snapshot (dynamic provisioning).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,

    /// Pre-existing VolumeSnapshotContent (static provisioning).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

/// Observed state of a VolumeSnapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    /// Bound VolumeSnapshotContent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_volume_snapshot_content_name: Option<String>,

    /// When the underlying storage system cut the snapshot (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,

    /// Whether the snapshot can be used to restore a volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// Minimum size of a volume restored from this snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<Quantity>,

    /// Last error encountered by the snapshot controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VolumeSnapshotError>,
}

/// Error reported on a VolumeSnapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotError {
    /// RFC 3339 timestamp of the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VolumeSnapshot {
    /// The restore size recorded by the snapshot controller, if any.
    pub fn restore_size(&self) -> Option<&Quantity> {
        self.status.as_ref()?.restore_size.as_ref()
    }
}
