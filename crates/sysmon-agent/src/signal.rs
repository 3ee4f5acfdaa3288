use crate::orchestrator::ReporterHandle;
use tokio::task::JoinHandle;

/// Waits for SIGINT or SIGTERM and returns the signal name.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Forwards the first process shutdown signal to the reporter.
pub fn spawn_signal_watcher(handle: ReporterHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                tracing::info!(signal, "Received signal");
                handle.shutdown().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    })
}
