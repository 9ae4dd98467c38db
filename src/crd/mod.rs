//! Custom resource types the webhook reads.
//!
//! - `VolumeSnapshot`: CSI external-snapshotter snapshot (`snapshot.storage.k8s.io/v1`)

mod volume_snapshot;

pub use volume_snapshot::*;
