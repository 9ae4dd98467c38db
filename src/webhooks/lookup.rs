//! Snapshot lookup collaborator.
//!
//! The decision engine only needs one read: fetch a VolumeSnapshot by
//! namespace and name. [`SnapshotLookup`] is the seam; [`KubeSnapshotLookup`]
//! is the production implementation backed by the API server. Dropping the
//! returned future abandons the request.

use std::future::Future;
use std::time::Duration;

use kube::{Api, Client};
use thiserror::Error;

use crate::crd::VolumeSnapshot;

/// Errors returned by a snapshot lookup
#[derive(Error, Debug)]
pub enum LookupError {
    /// Kubernetes API error (not found, forbidden, transport)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The lookup did not complete in time
    #[error("snapshot lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Snapshot does not exist
    #[error("VolumeSnapshot {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
}

impl LookupError {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            LookupError::NotFound { .. } => true,
            LookupError::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }
}

/// Read-only access to VolumeSnapshots. Must be safe for concurrent use.
pub trait SnapshotLookup: Send + Sync {
    /// Fetch the snapshot `namespace/name`.
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<VolumeSnapshot, LookupError>> + Send;
}

/// Looks up snapshots through the Kubernetes API
#[derive(Clone)]
pub struct KubeSnapshotLookup {
    client: Client,
    timeout: Duration,
}

impl KubeSnapshotLookup {
    /// Create a lookup that gives up after `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl SnapshotLookup for KubeSnapshotLookup {
    async fn get(&self, namespace: &str, name: &str) -> Result<VolumeSnapshot, LookupError> {
        let api: Api<VolumeSnapshot> = Api::namespaced(self.client.clone(), namespace);
        match tokio::time::timeout(self.timeout, api.get(name)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LookupError::Timeout(self.timeout)),
        }
    }
}
