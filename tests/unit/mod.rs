// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for the public API of pvc-shrink-ray.

#[path = "../common/mod.rs"]
mod common;

mod crd_tests {
    use kube::Resource;
    use pvc_shrink_ray::crd::{SNAPSHOT_GROUP, SNAPSHOT_KIND, VolumeSnapshot};
    use serde_json::json;

    #[test]
    fn test_volume_snapshot_resource_identity() {
        assert_eq!(VolumeSnapshot::group(&()), SNAPSHOT_GROUP);
        assert_eq!(VolumeSnapshot::kind(&()), SNAPSHOT_KIND);
        assert_eq!(VolumeSnapshot::version(&()), "v1");
        assert_eq!(VolumeSnapshot::plural(&()), "volumesnapshots");
    }

    #[test]
    fn test_volume_snapshot_from_api_server_json() {
        let snapshot: VolumeSnapshot = serde_json::from_value(json!({
            "apiVersion": "snapshot.storage.k8s.io/v1",
            "kind": "VolumeSnapshot",
            "metadata": {"name": "golden", "namespace": "images"},
            "spec": {
                "source": {"persistentVolumeClaimName": "base"},
                "volumeSnapshotClassName": "csi-rbd"
            },
            "status": {
                "boundVolumeSnapshotContentName": "snapcontent-1",
                "readyToUse": true,
                "restoreSize": "20Gi",
                "someFutureField": 1
            }
        }))
        .unwrap();

        assert_eq!(snapshot.restore_size().map(|q| q.0.as_str()), Some("20Gi"));
        assert_eq!(
            snapshot.spec.source.persistent_volume_claim_name.as_deref(),
            Some("base")
        );
    }

    #[test]
    fn test_volume_snapshot_without_status() {
        let snapshot: VolumeSnapshot = serde_json::from_value(json!({
            "apiVersion": "snapshot.storage.k8s.io/v1",
            "kind": "VolumeSnapshot",
            "metadata": {"name": "golden"},
            "spec": {"source": {"volumeSnapshotContentName": "pre"}}
        }))
        .unwrap();
        assert!(snapshot.restore_size().is_none());
    }
}

mod quantity_tests {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use pvc_shrink_ray::quantity::{ParsedQuantity, QuantityError};

    #[test]
    fn test_parse_errors() {
        assert_eq!(ParsedQuantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            ParsedQuantity::parse("Gi"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            ParsedQuantity::parse("10GB"),
            Err(QuantityError::UnknownSuffix(_))
        ));
    }

    #[test]
    fn test_from_k8s_quantity() {
        let q = ParsedQuantity::try_from(&Quantity("1536Mi".to_string())).unwrap();
        assert_eq!(q.canonical(), "1536Mi");
        assert_eq!(q, "1.5Gi".parse::<ParsedQuantity>().unwrap());
    }

    #[test]
    fn test_units_compare_exactly() {
        let gi: ParsedQuantity = "20Gi".parse().unwrap();
        let g: ParsedQuantity = "20G".parse().unwrap();
        let bytes: ParsedQuantity = "21474836481".parse().unwrap();
        assert!(g < gi);
        assert!(bytes > gi);
    }
}

mod snapshot_source_tests {
    use pvc_shrink_ray::webhooks::policies::{SnapshotRef, resolve_snapshot_ref};

    use crate::common::fixtures::PvcBuilder;

    #[test]
    fn test_resolves_data_source_in_claim_namespace() {
        let pvc = PvcBuilder::new("disk").snapshot_data_source("golden").build();
        let snapshot = resolve_snapshot_ref(&pvc, "vms").unwrap();
        assert_eq!(
            snapshot,
            SnapshotRef {
                namespace: "vms".to_string(),
                name: "golden".to_string()
            }
        );
        assert_eq!(snapshot.to_string(), "vms/golden");
    }

    #[test]
    fn test_data_source_ref_namespace_overrides_claim_namespace() {
        let pvc = PvcBuilder::new("disk")
            .snapshot_data_source_ref("golden", Some("images"))
            .build();
        assert_eq!(resolve_snapshot_ref(&pvc, "vms").unwrap().namespace, "images");

        let pvc = PvcBuilder::new("disk")
            .snapshot_data_source_ref("golden", Some(""))
            .build();
        assert_eq!(resolve_snapshot_ref(&pvc, "vms").unwrap().namespace, "vms");
    }

    #[test]
    fn test_ignores_non_snapshot_sources() {
        let pvc = PvcBuilder::new("disk")
            .data_source("VolumeSnapshot", Some("example.com"), "golden")
            .build();
        assert!(resolve_snapshot_ref(&pvc, "vms").is_none());

        let pvc = PvcBuilder::new("disk")
            .data_source("DataVolume", Some("cdi.kubevirt.io"), "dv")
            .build();
        assert!(resolve_snapshot_ref(&pvc, "vms").is_none());

        assert!(resolve_snapshot_ref(&PvcBuilder::new("disk").build(), "vms").is_none());
    }
}

mod verdict_tests {
    use pvc_shrink_ray::webhooks::policies::STORAGE_REQUEST_PATH;
    use pvc_shrink_ray::webhooks::{PatchOperation, ReviewOutcome, Verdict};

    use crate::common::fixtures::{PvcBuilder, pvc_review};

    #[test]
    fn test_response_echoes_uid_and_carries_patch() {
        let review = pvc_review("abc-123", &PvcBuilder::new("disk").build());
        let verdict = Verdict::corrected(PatchOperation::replace(STORAGE_REQUEST_PATH, "20Gi"));

        let (response, outcome) = verdict.into_response(&review.request);

        assert_eq!(outcome, ReviewOutcome::Corrected);
        assert_eq!(response.uid, "abc-123");
        assert!(response.allowed);
        let patch: Vec<PatchOperation> =
            serde_json::from_slice(response.patch.as_deref().unwrap()).unwrap();
        assert_eq!(patch, vec![PatchOperation::replace(STORAGE_REQUEST_PATH, "20Gi")]);
    }

    #[test]
    fn test_failed_open_response_is_allowed_with_message() {
        let review = pvc_review("abc-456", &PvcBuilder::new("disk").build());
        let verdict = Verdict::failed_open(ReviewOutcome::LookupError, "snapshot lookup timed out");

        let (response, outcome) = verdict.into_response(&review.request);

        assert_eq!(outcome, ReviewOutcome::LookupError);
        assert_eq!(response.uid, "abc-456");
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(response.result.message, "snapshot lookup timed out");
    }
}

mod config_tests {
    use std::time::Duration;

    use clap::Parser;
    use pvc_shrink_ray::{Args, WebhookConfig};

    #[test]
    fn test_default_config_matches_deployment() {
        let config = WebhookConfig::default();
        assert_eq!(config.port, 8443);
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.shutdown_grace_period, Duration::from_secs(30));
        assert_eq!(
            config.cert_path.to_str(),
            Some("/cert/server/certs/tls.crt")
        );
        assert_eq!(config.key_path.to_str(), Some("/cert/server/certs/tls.key"));
    }

    #[test]
    fn test_zero_request_timeout_is_rejected() {
        let args = Args::try_parse_from(["pvc-shrink-ray", "--request-timeout-secs", "0"]).unwrap();
        let err = WebhookConfig::try_from(&args).unwrap_err();
        assert_eq!(err.to_string(), "request timeout must be greater than zero");
    }
}
