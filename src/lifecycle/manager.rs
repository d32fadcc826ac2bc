//! Hosted Service Manager
//!
//! Starts registered hosted services in order and stops them in reverse.

use super::error::{Cancelled, HostError, Result};
use super::options::BackgroundServiceExceptionBehavior;
use super::supervisor::{BackgroundServiceHandle, BackgroundSupervisor};
use super::traits::HostedService;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The ordered hosted-service list a host resolves from its container
#[derive(Clone, Default)]
pub struct HostedServices(Vec<Arc<dyn HostedService>>);

impl HostedServices {
    pub fn new(services: Vec<Arc<dyn HostedService>>) -> Self {
        Self(services)
    }

    pub fn push(&mut self, service: Arc<dyn HostedService>) {
        self.0.push(service);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Drives the ordered start and reverse-order stop of hosted services
///
/// # Example
///
/// ```rust,ignore
/// let manager = ServiceManager::new(services);
///
/// manager.start_all(&token, &supervisor).await?;
/// // ... application runs ...
/// let errors = manager.stop_all(&deadline).await;
/// ```
pub struct ServiceManager {
    services: Vec<Arc<dyn HostedService>>,
    behavior: BackgroundServiceExceptionBehavior,
}

impl ServiceManager {
    pub fn new(services: HostedServices, behavior: BackgroundServiceExceptionBehavior) -> Self {
        Self {
            services: services.0,
            behavior,
        }
    }

    /// Start every service in registration order.
    ///
    /// The first failure is returned immediately; later services are not
    /// started and earlier ones are left running. Long-running services are
    /// handed to `supervisor` as soon as their `start` returns.
    pub async fn start_all(
        &self,
        cancel: &CancellationToken,
        supervisor: &BackgroundSupervisor,
    ) -> Result<()> {
        tracing::info!("Starting hosted services...");

        for service in &self.services {
            let name = service.name();
            if cancel.is_cancelled() {
                tracing::warn!("Start cancelled before {}", name);
                return Err(HostError::cancelled(format!("start of {}", name)));
            }

            tracing::debug!("Starting: {}", name);
            service.start(cancel.clone()).await.map_err(|e| {
                tracing::error!("Hosted service {} failed to start: {:#}", name, e);
                if e.is::<Cancelled>() {
                    HostError::cancelled(format!("start of {}", name))
                } else {
                    HostError::service_start(name, e)
                }
            })?;

            if let Some(execution) = service.execution() {
                supervisor.supervise(BackgroundServiceHandle {
                    name: name.to_string(),
                    execution,
                    behavior: self.behavior,
                });
            }
            tracing::debug!("Started: {}", name);
        }

        tracing::info!(
            "Hosted services started ({} services)",
            self.services.len()
        );
        Ok(())
    }

    /// Stop every service in **reverse order**.
    ///
    /// Every service gets its turn even if earlier ones fail; failures are
    /// collected and returned. A service still running when `cancel` fires
    /// is abandoned with a cancellation error.
    pub async fn stop_all(&self, cancel: &CancellationToken) -> Vec<HostError> {
        tracing::info!("Stopping hosted services...");
        let mut errors = Vec::new();

        for service in self.services.iter().rev() {
            let name = service.name();
            tracing::debug!("Stopping: {}", name);

            let phase = format!("stop of {}", name);
            match bounded(cancel, &phase, service.stop(cancel.clone())).await {
                Ok(Ok(())) => tracing::debug!("Stopped: {}", name),
                Ok(Err(e)) => {
                    tracing::error!("Hosted service {} failed to stop: {:#}", name, e);
                    errors.push(HostError::service_stop(name, e));
                }
                Err(e) => {
                    tracing::warn!("Hosted service {} did not stop in time", name);
                    errors.push(e);
                }
            }
        }

        tracing::info!(
            "Hosted services stopped ({} services, {} failures)",
            self.services.len(),
            errors.len()
        );
        errors
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Runs `operation` until it completes or `cancel` fires.
///
/// A completed operation is polled first, so one that is already done wins
/// over an expired deadline. An operation that itself reports [`Cancelled`]
/// is converted into [`HostError::Cancelled`].
pub(crate) async fn bounded<F>(
    cancel: &CancellationToken,
    phase: &str,
    operation: F,
) -> std::result::Result<anyhow::Result<()>, HostError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    tokio::select! {
        biased;
        result = operation => match result {
            Err(e) if e.is::<Cancelled>() => Err(HostError::cancelled(phase)),
            other => Ok(other),
        },
        _ = cancel.cancelled() => Err(HostError::cancelled(phase)),
    }
}
