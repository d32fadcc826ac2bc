//! Process lifetimes
//!
//! [`ConsoleLifetime`] ties a host to OS termination signals: once the host
//! starts it listens for Ctrl+C / SIGTERM and requests a graceful stop.

use super::signals::ApplicationLifetime;
use super::traits::HostLifetime;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Host lifetime driven by console signals
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = HostBuilder::new();
/// builder.use_host_lifetime(ConsoleLifetime::new(builder.lifetime()));
/// ```
pub struct ConsoleLifetime {
    lifetime: ApplicationLifetime,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsoleLifetime {
    pub fn new(lifetime: ApplicationLifetime) -> Self {
        Self {
            lifetime,
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn listen(&self, task: JoinHandle<()>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

#[async_trait]
impl HostLifetime for ConsoleLifetime {
    async fn wait_for_start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        let lifetime = self.lifetime.clone();
        self.listen(tokio::spawn(async move {
            let started = lifetime.started();
            let stopping = lifetime.stopping();
            tokio::select! {
                _ = started.cancelled() => {
                    tracing::info!("Application started. Press Ctrl+C to shut down.");
                }
                _ = stopping.cancelled() => {}
            }
        }));

        let lifetime = self.lifetime.clone();
        self.listen(tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(signal) => {
                    tracing::info!("Received {} signal", signal);
                    lifetime.stop_application();
                }
                Err(e) => {
                    tracing::warn!("Failed to install shutdown signal handlers: {}", e);
                }
            }
        }));
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        let listeners = std::mem::take(
            &mut *self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for listener in listeners {
            listener.abort();
        }
        Ok(())
    }
}

/// Host lifetime that neither gates startup nor listens for signals
///
/// Suited to embedded hosts and tests where the caller owns shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifetime;

#[async_trait]
impl HostLifetime for NoopLifetime {
    async fn wait_for_start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Completes when a shutdown signal is received, naming it
///
/// Returns `Err` if the signal handlers cannot be installed.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_hosting::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "Ctrl+C"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Completes when a shutdown signal is received, naming it
///
/// Returns `Err` if the signal handler cannot be installed.
#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
}
