//! Shutdown signal handling.
//!
//! The server runs until the process is asked to stop. Whichever signal
//! arrives first is reported back so the shutdown log names it.

use std::fmt;
use tokio::signal;

/// The signal that ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Waits until the server is asked to shut down.
///
/// Players, the control feed and the proximity service keep running while
/// this future is pending; the caller tears them down once it resolves.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C only, reported as [`ShutdownSignal::Interrupt`]
///
/// # Returns
///
/// The signal that was received, or an I/O error if a signal listener could
/// not be installed.
pub async fn wait_for_shutdown() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let received = tokio::select! {
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = sigterm.recv() => ShutdownSignal::Terminate,
        };
        Ok(received)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}
