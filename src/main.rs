//! pvc-shrink-ray - caps PVC storage requests at the restore size of their
//! source VolumeSnapshot.
//!
//! This is the main entry point that:
//! - Loads configuration from flags and environment
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Starts the health server and the TLS webhook server
//! - Drains in-flight requests on SIGTERM/SIGINT within a bounded grace period

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use pvc_shrink_ray::{
    Args, HealthState, KubeSnapshotLookup, LogFormat, WebhookConfig, run_health_server,
    run_webhook_server, shutdown_signal,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::from_default_env()
        .add_directive("pvc_shrink_ray=info".parse()?)
        .add_directive("kube=info".parse()?);
    match args.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!("Starting pvc-shrink-ray");

    let config = WebhookConfig::try_from(&args)?;
    info!(
        port = config.port,
        health_port = config.health_port,
        cert_path = %config.cert_path.display(),
        key_path = %config.key_path.display(),
        "Loaded configuration"
    );

    // Both kube and axum-server use rustls; pin the process-wide provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    // Create Kubernetes client (in-cluster service account or kubeconfig)
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness probes work during startup
    let (health_stop_tx, health_stop_rx) = oneshot::channel::<()>();
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            let stop = async move {
                let _ = health_stop_rx.await;
            };
            if let Err(e) = run_health_server(health_state, port, stop).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lookup = KubeSnapshotLookup::new(client, config.lookup_timeout);
    let result = run_webhook_server(&config, lookup, health_state, shutdown_signal()).await;

    if let Err(e) = result {
        error!(error = %e, "Webhook server failed");
        #[allow(clippy::exit)]
        std::process::exit(1);
    }

    let _ = health_stop_tx.send(());
    if let Err(e) = health_handle.await {
        error!("Health server task panicked: {}", e);
    }

    info!("pvc-shrink-ray stopped");
    Ok(())
}
