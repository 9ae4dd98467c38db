//! pvc-shrink-ray library crate
//!
//! A mutating admission webhook that caps the storage request of
//! PersistentVolumeClaims restored from a VolumeSnapshot at the snapshot's
//! `restoreSize`. It exports the decision engine, the request handler, the
//! VolumeSnapshot resource type and the service lifecycle pieces.

pub mod config;
pub mod crd;
pub mod health;
pub mod lifecycle;
pub mod quantity;
pub mod webhooks;

pub use config::{Args, LogFormat, WebhookConfig};
pub use health::{HealthState, run_health_server};
pub use lifecycle::{ServiceState, shutdown_signal};
pub use webhooks::{KubeSnapshotLookup, WebhookError, run_webhook_server};
