//! Termination signals that end the serving transport.
//!
//! Hosts stop the server with Ctrl-C (SIGINT) interactively and with SIGTERM
//! under a process manager. Both must let `main` reach the session teardown.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::warn;

use crate::errors::Result;

/// Listener for the signals that stop the server.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownSignal {
    /// Installs the handlers. Once installed, SIGTERM no longer kills the
    /// process outright; it is delivered to [`ShutdownSignal::recv`].
    pub fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next termination signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = interrupt() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }
        #[cfg(not(unix))]
        {
            interrupt().await;
            "SIGINT"
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
