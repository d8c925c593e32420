//! Shutdown signal handling.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `token` on the first SIGTERM or SIGINT.
#[cfg(unix)]
pub(crate) fn install(token: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        token.cancel();
    });

    info!("OS signal handlers installed (SIGTERM, SIGINT)");
    Ok(())
}

/// Cancel `token` on Ctrl+C.
#[cfg(not(unix))]
pub(crate) fn install(token: CancellationToken) -> std::io::Result<()> {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received Ctrl+C");
            token.cancel();
        }
    });

    info!("OS signal handlers installed (Ctrl+C only)");
    Ok(())
}
