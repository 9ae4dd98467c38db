//! Resolve the VolumeSnapshot a claim is restored from.
//!
//! A PVC can name its source in two places:
//! - `spec.dataSource`: same-namespace typed reference
//! - `spec.dataSourceRef`: typed reference that may point to another namespace
//!
//! Resolvers run in that order and the first match wins.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;

use crate::crd::{SNAPSHOT_GROUP, SNAPSHOT_KIND};

/// Namespaced name of a VolumeSnapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRef {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A resolver inspects one reference field of the claim.
type Resolver = fn(&PersistentVolumeClaim, &str) -> Option<SnapshotRef>;

/// Resolution order. `dataSource` takes precedence over `dataSourceRef`.
const RESOLVERS: [Resolver; 2] = [from_data_source, from_data_source_ref];

/// Find the snapshot referenced by `claim`.
///
/// `claim_namespace` is used whenever the reference does not carry its own
/// namespace. Returns `None` when no reference names a VolumeSnapshot.
pub fn resolve_snapshot_ref(
    claim: &PersistentVolumeClaim,
    claim_namespace: &str,
) -> Option<SnapshotRef> {
    RESOLVERS
        .iter()
        .find_map(|resolve| resolve(claim, claim_namespace))
}

fn is_volume_snapshot(kind: &str, api_group: Option<&str>) -> bool {
    kind == SNAPSHOT_KIND && api_group == Some(SNAPSHOT_GROUP)
}

fn from_data_source(claim: &PersistentVolumeClaim, claim_namespace: &str) -> Option<SnapshotRef> {
    let source = claim.spec.as_ref()?.data_source.as_ref()?;
    if !is_volume_snapshot(&source.kind, source.api_group.as_deref()) || source.name.is_empty() {
        return None;
    }
    Some(SnapshotRef {
        namespace: claim_namespace.to_string(),
        name: source.name.clone(),
    })
}

fn from_data_source_ref(
    claim: &PersistentVolumeClaim,
    claim_namespace: &str,
) -> Option<SnapshotRef> {
    let source = claim.spec.as_ref()?.data_source_ref.as_ref()?;
    if !is_volume_snapshot(&source.kind, source.api_group.as_deref()) || source.name.is_empty() {
        return None;
    }
    let namespace = source
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(claim_namespace);
    Some(SnapshotRef {
        namespace: namespace.to_string(),
        name: source.name.clone(),
    })
}
