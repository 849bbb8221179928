//! OS signal handling.
//!
//! # Responsibilities
//! - Turn the first SIGINT/SIGTERM into a stop of the run context
//! - Hand later interrupts back to the default OS action once revoked
//!
//! # Design Decisions
//! - Tokio's signal streams do the waiting; they never restore the default
//!   disposition, so on unix a `signal-hook` conditional-default action is
//!   registered next to them and armed on revocation
//! - The bridge revokes itself as soon as the first interrupt arrives, so a
//!   second Ctrl-C during a slow drain terminates the process at once

use std::io;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::RunContext;

/// Installed interrupt handling, tied to one [`RunContext`].
///
/// Revoked on [`SignalBridge::revoke`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct SignalBridge {
    listener: Option<JoinHandle<()>>,
    #[cfg(unix)]
    revoked: Arc<AtomicBool>,
}

impl SignalBridge {
    /// Install interrupt handling that stops `ctx` on the first SIGINT or SIGTERM.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn install(ctx: &RunContext) -> io::Result<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use tokio::signal::unix::{signal, SignalKind};

        let revoked = Arc::new(AtomicBool::new(false));
        for sig in [SIGINT, SIGTERM] {
            signal_hook::flag::register_conditional_default(sig, Arc::clone(&revoked))?;
        }

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let ctx = ctx.clone();
        let on_signal = Arc::clone(&revoked);
        let listener = tokio::spawn(async move {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            };
            tracing::info!(signal = name, "Shutdown signal received, draining");
            on_signal.store(true, Ordering::SeqCst);
            ctx.stop();
        });

        Ok(Self {
            listener: Some(listener),
            revoked,
        })
    }

    /// Install Ctrl+C handling that stops `ctx` on the first interrupt.
    #[cfg(not(unix))]
    pub fn install(ctx: &RunContext) -> io::Result<Self> {
        let ctx = ctx.clone();
        let listener = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received, draining");
                    ctx.stop();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        });

        Ok(Self {
            listener: Some(listener),
        })
    }

    /// Stop listening and restore the default action for later interrupts.
    ///
    /// Idempotent.
    pub fn revoke(&mut self) {
        #[cfg(unix)]
        self.revoked.store(true, Ordering::SeqCst);

        if let Some(listener) = self.listener.take() {
            listener.abort();
            tracing::debug!("Signal handling revoked");
        }
    }

    /// Whether later interrupts fall through to the default OS action.
    #[cfg(unix)]
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.revoke();
    }
}
