//! OS signal wiring.
//!
//! A single background task waits for SIGTERM (or Ctrl-C) and fires the
//! client's cancellation token once. The token is the only state shared
//! between that task and the client loop.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn the listener. It exits after firing, or quietly once `token` is
/// cancelled by someone else.
pub fn spawn_signal_listener(token: CancellationToken, client_id: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = wait_for_signal() => {
                info!(
                    action = "shutdown",
                    result = "in_progress",
                    client_id,
                    "Termination signal received"
                );
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = ctrl_c() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler, listening for Ctrl-C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        // Without a handler there is nothing to wait for; never resolve.
        std::future::pending::<()>().await;
    }
}
