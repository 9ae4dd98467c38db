//! Service lifecycle: `Starting -> Serving -> Draining -> Stopped`.
//!
//! Transitions only move forward. `Draining` is entered on SIGTERM/SIGINT;
//! an unexpected listener exit is fatal and handled by the caller.

use std::fmt;

use tokio::signal;

/// Lifecycle state of the webhook process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceState {
    /// Loading configuration and binding the listener
    #[default]
    Starting,
    /// Listener bound, accepting admission requests
    Serving,
    /// Shutdown requested, finishing in-flight requests
    Draining,
    /// Drain finished or grace period expired
    Stopped,
}

impl ServiceState {
    /// Whether moving from `self` to `next` is a valid transition.
    ///
    /// States are ordered, skipping ahead is allowed (a signal received while
    /// still starting goes straight to draining), going back is not.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        next > self
    }

    /// Whether this state accepts new requests
    pub fn is_serving(self) -> bool {
        self == ServiceState::Serving
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Starting => "Starting",
            ServiceState::Serving => "Serving",
            ServiceState::Draining => "Draining",
            ServiceState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Wait for a termination signal (SIGTERM or SIGINT) and return its name.
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
