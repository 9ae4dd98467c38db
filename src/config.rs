//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its environment variable.
//! Values are loaded once at startup and never reloaded.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/cert/server/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/cert/server/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8443;
/// Default health/metrics server port
pub const HEALTH_PORT: u16 = 8080;

/// Grace period for in-flight admission reviews to complete during shutdown
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 30;
/// Upper bound on a single VolumeSnapshot lookup
pub const LOOKUP_TIMEOUT_SECS: u64 = 10;
/// Upper bound on reading a request body
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Mutating admission webhook that caps PVC storage requests at the
/// restore size of their source VolumeSnapshot.
#[derive(Parser, Debug, Clone)]
#[command(name = "pvc-shrink-ray", version, about)]
pub struct Args {
    /// HTTPS port for the admission webhook
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub port: u16,

    /// PEM certificate served by the webhook
    #[arg(long, env = "WEBHOOK_CERT_PATH", default_value = WEBHOOK_CERT_PATH)]
    pub cert_path: PathBuf,

    /// PEM private key for the certificate
    #[arg(long, env = "WEBHOOK_KEY_PATH", default_value = WEBHOOK_KEY_PATH)]
    pub key_path: PathBuf,

    /// Plain HTTP port for probes and metrics
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE_PERIOD_SECS", default_value_t = SHUTDOWN_GRACE_PERIOD_SECS)]
    pub shutdown_grace_period_secs: u64,

    /// Seconds before a VolumeSnapshot lookup is abandoned
    #[arg(long, env = "LOOKUP_TIMEOUT_SECS", default_value_t = LOOKUP_TIMEOUT_SECS)]
    pub lookup_timeout_secs: u64,

    /// Seconds allowed for reading request headers or body, and for idle keep-alive connections
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Invalid configuration values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A timeout was configured as zero
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    /// Webhook and health server would bind the same port
    #[error("webhook port and health port must differ (both {0})")]
    PortConflict(u16),
}

/// Validated webhook configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub health_port: u16,
    pub shutdown_grace_period: Duration,
    pub lookup_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: WEBHOOK_PORT,
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            health_port: HEALTH_PORT,
            shutdown_grace_period: Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
            lookup_timeout: Duration::from_secs(LOOKUP_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl TryFrom<&Args> for WebhookConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        if args.port == args.health_port {
            return Err(ConfigError::PortConflict(args.port));
        }
        if args.lookup_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("lookup timeout"));
        }
        if args.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("request timeout"));
        }
        // A zero grace period is allowed: connections are closed immediately.
        Ok(Self {
            port: args.port,
            cert_path: args.cert_path.clone(),
            key_path: args.key_path.clone(),
            health_port: args.health_port,
            shutdown_grace_period: Duration::from_secs(args.shutdown_grace_period_secs),
            lookup_timeout: Duration::from_secs(args.lookup_timeout_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
        })
    }
}
