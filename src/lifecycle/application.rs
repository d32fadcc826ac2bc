//! Host
//!
//! Owns one application's run: ordered startup of hosted services, the
//! foreground loop, the bounded stop sequence and final disposal.

use super::builder::HostBuilder;
use super::environment::{FileProvider, HostEnvironment};
use super::error::{AggregateError, HostError, Result};
use super::foreground::{
    ApplicationConfigurer, ApplicationFactory, ApplicationSlot, ForegroundLoop, ReadyHook,
};
use super::manager::{HostedServices, ServiceManager, bounded};
use super::options::HostOptions;
use super::signals::{ApplicationLifetime, LifecyclePhase};
use super::state::{HostState, HostStatus, StateCell};
use super::supervisor::BackgroundSupervisor;
use super::traits::HostLifetime;
use crate::di::Container;
use crate::dispose::{Disposable, DisposalSequencer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

/// Outer bound on the stop a host performs on itself once its foreground
/// loop returns; disposal proceeds when it expires.
pub const SELF_STOP_DEADLINE: Duration = Duration::from_secs(60);

/// Application-object hooks consumed when the foreground loop is ready
#[derive(Default)]
pub(crate) struct Bootstrap {
    pub(crate) factory: Option<ApplicationFactory>,
    pub(crate) configurers: Vec<ApplicationConfigurer>,
}

/// Everything [`HostBuilder::build`] assembles
pub(crate) struct HostParts {
    pub(crate) services: Arc<Container>,
    pub(crate) options: Arc<HostOptions>,
    pub(crate) lifetime: ApplicationLifetime,
    pub(crate) host_lifetime: Arc<dyn HostLifetime>,
    pub(crate) foreground: Arc<dyn ForegroundLoop>,
    pub(crate) environment: Arc<HostEnvironment>,
    pub(crate) default_provider: Arc<dyn FileProvider>,
    pub(crate) bootstrap: Bootstrap,
}

/// A built application host
///
/// A host runs exactly once:
///
/// ```text
/// start():  wait_for_start gate → hosted services start (in order)
///           → foreground loop runs ... returns, fails, or stop is requested
///           → stop() → dispose()
/// stop():   stopping → hosted services stop (reverse order) → stopped
///           → application exit → host lifetime stop
/// ```
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_hosting::lifecycle::Host;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut builder = Host::builder();
///     builder
///         .add_hosted_service(DatabaseService::new())
///         .add_background_service(OutboxRelay::new())
///         .use_foreground(MainWindow::new());
///
///     let host = builder.build()?;
///     host.run().await?;
///     Ok(())
/// }
/// ```
pub struct Host {
    host_id: Uuid,
    services: Arc<Container>,
    options: Arc<HostOptions>,
    lifetime: ApplicationLifetime,
    host_lifetime: Arc<dyn HostLifetime>,
    foreground: Arc<dyn ForegroundLoop>,
    environment: Arc<HostEnvironment>,
    default_provider: Arc<dyn FileProvider>,
    bootstrap: Mutex<Option<Bootstrap>>,
    application: ApplicationSlot,
    state: StateCell,
    stop_requested: Arc<AtomicBool>,
    stop_sequence: OnceCell<()>,
    disposed: AtomicBool,
    hosted: OnceLock<ServiceManager>,
    supervisor: BackgroundSupervisor,
    teardown: CancellationToken,
    _teardown_guard: DropGuard,
}

impl Host {
    /// Create a new host builder
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub(crate) fn new(parts: HostParts) -> Self {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let supervisor =
            BackgroundSupervisor::new(parts.lifetime.clone(), Arc::clone(&stop_requested));
        let teardown = CancellationToken::new();

        Self {
            host_id: Uuid::new_v4(),
            services: parts.services,
            options: parts.options,
            lifetime: parts.lifetime,
            host_lifetime: parts.host_lifetime,
            foreground: parts.foreground,
            environment: parts.environment,
            default_provider: parts.default_provider,
            bootstrap: Mutex::new(Some(parts.bootstrap)),
            application: Arc::default(),
            state: StateCell::new(),
            stop_requested,
            stop_sequence: OnceCell::new(),
            disposed: AtomicBool::new(false),
            hosted: OnceLock::new(),
            supervisor,
            _teardown_guard: teardown.clone().drop_guard(),
            teardown,
        }
    }

    pub fn host_id(&self) -> Uuid {
        self.host_id
    }

    /// The resolved, read-only service container
    pub fn services(&self) -> &Arc<Container> {
        &self.services
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn lifetime(&self) -> &ApplicationLifetime {
        &self.lifetime
    }

    pub fn environment(&self) -> &Arc<HostEnvironment> {
        &self.environment
    }

    pub fn state(&self) -> HostState {
        self.state.get()
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            host_id: self.host_id,
            application_name: self.environment.application_name().to_string(),
            state: self.state(),
            started_at: self.lifetime.fired_at(LifecyclePhase::Started),
            stopping_at: self.lifetime.fired_at(LifecyclePhase::Stopping),
            stopped_at: self.lifetime.fired_at(LifecyclePhase::Stopped),
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("host", host_id = %self.host_id)
    }

    /// Start the host with a token that is never cancelled.
    pub async fn run(&self) -> Result<()> {
        self.start(CancellationToken::new()).await
    }

    /// Start the host and drive it until it has stopped and been disposed.
    ///
    /// Resolves once the foreground loop has returned (or a stop was
    /// requested through `cancel`, the application lifetime or a faulted
    /// background service) and the host has stopped and disposed itself.
    ///
    /// # Errors
    ///
    /// - [`HostError::AlreadyStarted`] on a second call.
    /// - [`HostError::ServiceStart`] if a service fails to start; services
    ///   already started are left running, call [`stop`](Self::stop) and
    ///   [`dispose`](Self::dispose) to clean up.
    /// - [`HostError::Cancelled`] if `cancel` fired before startup finished.
    ///   A shutdown that interrupts startup still stops and disposes the host.
    /// - [`HostError::Application`] if the foreground loop failed.
    /// - Otherwise the error of the stop sequence, if any.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.start_inner(cancel).instrument(self.span()).await
    }

    async fn start_inner(&self, cancel: CancellationToken) -> Result<()> {
        self.state
            .transition(&[HostState::Created], HostState::Starting)
            .map_err(|_| HostError::AlreadyStarted)?;
        tracing::info!("Hosting starting");

        let (combined, _) = forward_cancellation(&cancel, &self.lifetime, &self.teardown);

        let manager = self.hosted.get_or_init(|| {
            ServiceManager::new(
                self.resolve_hosted_services(),
                self.options.background_service_exception_behavior,
            )
        });

        match bounded(
            &combined,
            "host lifetime start",
            self.host_lifetime.wait_for_start(combined.clone()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Host lifetime failed before start: {:#}", e),
            Err(_) => tracing::debug!("Host lifetime start gate cancelled"),
        }

        let started = if combined.is_cancelled() {
            Err(HostError::cancelled("host start"))
        } else {
            manager
                .start_all(&combined, &self.supervisor)
                .await
                .and_then(|()| {
                    if combined.is_cancelled() {
                        Err(HostError::cancelled("host start"))
                    } else {
                        Ok(())
                    }
                })
        };

        if let Err(e) = started {
            if !combined.is_cancelled() {
                self.fault();
                return Err(e);
            }
            return self.abort_start(&cancel, e).await;
        }

        let _ = self
            .state
            .transition(&[HostState::Starting], HostState::Running);
        tracing::info!("Hosting started");

        let run = self.foreground.run(self.ready_hook());
        tokio::pin!(run);

        let exit = tokio::select! {
            biased;
            _ = combined.cancelled() => None,
            result = &mut run => Some(result),
        };
        let interrupted = exit.is_none();

        let application = match exit {
            Some(Ok(())) => {
                tracing::info!("Application exited");
                Ok(())
            }
            Some(Err(e)) => {
                tracing::error!("Unhandled failure in application: {:#}", e);
                Err(HostError::Application {
                    action: "run",
                    source: e,
                })
            }
            None => {
                tracing::info!("Shutdown requested while application was running");
                Ok(())
            }
        };

        // Keep polling an interrupted loop so it can observe the exit request.
        let (stopped, ()) = tokio::join!(self.stop_bounded(), async {
            if !interrupted {
                return;
            }
            match tokio::time::timeout(SELF_STOP_DEADLINE, &mut run).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Application failed while exiting: {:#}", e),
                Err(_) => tracing::warn!(
                    "Application did not exit within {:?}",
                    SELF_STOP_DEADLINE
                ),
            }
        });

        self.dispose_once().await;
        application.and(stopped)
    }

    /// Shutdown began while services were starting: stop and dispose as
    /// after a normal run.
    async fn abort_start(&self, cancel: &CancellationToken, interrupted: HostError) -> Result<()> {
        tracing::info!("Shutdown requested during startup: {}", interrupted);
        let stopped = self.stop_bounded().await;
        self.dispose_once().await;

        if cancel.is_cancelled() {
            if let Err(e) = stopped {
                tracing::warn!("Stop after cancelled startup failed: {}", e);
            }
            return Err(HostError::cancelled("host start"));
        }
        stopped
    }

    /// Stop started by the host itself, bounded by [`SELF_STOP_DEADLINE`].
    async fn stop_bounded(&self) -> Result<()> {
        let stop = self.stop_once(CancellationToken::new(), self.options.shutdown_timeout);
        match tokio::time::timeout(SELF_STOP_DEADLINE, stop).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "Host did not stop within {:?}; disposing anyway",
                    SELF_STOP_DEADLINE
                );
                Err(HostError::cancelled("host stop"))
            }
        }
    }

    fn fault(&self) {
        let _ = self
            .state
            .transition(&[HostState::Starting], HostState::Faulted);
    }

    fn resolve_hosted_services(&self) -> HostedServices {
        self.services
            .resolve::<HostedServices>()
            .map(|services| (*services).clone())
            .unwrap_or_default()
    }

    fn ready_hook(&self) -> ReadyHook {
        let bootstrap = self
            .bootstrap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        ReadyHook::new(
            Arc::clone(&self.services),
            self.lifetime.clone(),
            bootstrap.factory,
            bootstrap.configurers,
            Arc::clone(&self.application),
        )
    }

    /// Stop the host within [`HostOptions::shutdown_timeout`].
    pub async fn stop(&self, cancel: CancellationToken) -> Result<()> {
        self.stop_with_timeout(cancel, self.options.shutdown_timeout)
            .await
    }

    /// Stop the host within `timeout` or until `cancel` fires, whichever
    /// comes first.
    ///
    /// The sequence runs once per host. A caller that arrives while it is
    /// running waits for it and then returns `Ok(())`; only the caller that
    /// ran the sequence receives its errors.
    ///
    /// # Errors
    ///
    /// [`HostError::AggregateStop`] bundling every failure: hosted services
    /// that failed or did not stop in time, the application exit call and
    /// the host lifetime.
    pub async fn stop_with_timeout(
        &self,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Result<()> {
        self.stop_once(cancel, timeout).instrument(self.span()).await
    }

    async fn stop_once(&self, cancel: CancellationToken, timeout: Duration) -> Result<()> {
        let mut outcome = None;
        self.stop_sequence
            .get_or_init(|| async {
                outcome = Some(self.stop_inner(cancel, timeout).await);
            })
            .await;

        outcome.unwrap_or_else(|| {
            tracing::debug!("Stop already performed");
            Ok(())
        })
    }

    async fn stop_inner(&self, cancel: CancellationToken, timeout: Duration) -> Result<()> {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.state.transition(
            &[
                HostState::Created,
                HostState::Starting,
                HostState::Running,
                HostState::Faulted,
            ],
            HostState::Stopping,
        );
        tracing::info!("Hosting stopping");

        let deadline = cancel.child_token();
        let timer = {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                deadline.cancel();
            })
        };

        self.lifetime.notify_stopping();

        let mut errors = Vec::new();
        if let Some(manager) = self.hosted.get() {
            errors.extend(manager.stop_all(&deadline).await);
        }

        self.lifetime.notify_stopped();

        match bounded(
            &deadline,
            "application exit",
            self.foreground.request_exit(deadline.clone()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(HostError::Application {
                action: "exit",
                source: e,
            }),
            Err(e) => errors.push(e),
        }

        match bounded(
            &deadline,
            "host lifetime stop",
            self.host_lifetime.stop(deadline.clone()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(HostError::HostLifetime { source: e }),
            Err(e) => errors.push(e),
        }

        timer.abort();
        let _ = self
            .state
            .transition(&[HostState::Stopping], HostState::Stopped);

        if errors.is_empty() {
            tracing::info!("Hosting stopped");
            return Ok(());
        }

        for error in &errors {
            tracing::error!(error = error.as_label(), "{}", error);
        }
        tracing::error!("Hosting stopped with {} error(s)", errors.len());
        Err(HostError::AggregateStop(AggregateError::new(errors)))
    }

    /// Release the content-root provider(s), the application object and the
    /// service container, in that order.
    ///
    /// Runs at most once; later calls return immediately. Individual
    /// disposal failures are logged and never stop the sequence.
    pub async fn dispose(&self) {
        self.dispose_once().instrument(self.span()).await
    }

    async fn dispose_once(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Host already disposed");
            return;
        }

        self.supervisor.abort_all();
        self.teardown.cancel();

        let application = std::mem::take(
            &mut *self
                .application
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut sequence = DisposalSequencer::new();
        for (label, provider) in self.environment.provider_disposals(&self.default_provider) {
            sequence = sequence.then(label, provider);
        }
        let failures = sequence
            .then("application", application)
            .then(
                "service container",
                Disposable::from_async(Arc::clone(&self.services)),
            )
            .run()
            .await;

        self.state.set(HostState::Disposed);
        if failures == 0 {
            tracing::info!("Host disposed");
        } else {
            tracing::warn!("Host disposed with {} failure(s)", failures);
        }
    }
}

/// Routes a cancelled start token into `stopping`, so every shutdown trigger
/// is seen as a requested stop. Returns a child of `stopping` for the start
/// sequence, plus the forwarding task, which also ends at `teardown`.
fn forward_cancellation(
    cancel: &CancellationToken,
    lifetime: &ApplicationLifetime,
    teardown: &CancellationToken,
) -> (CancellationToken, Option<JoinHandle<()>>) {
    let stopping = lifetime.stopping();
    let combined = stopping.child_token();

    if cancel.is_cancelled() {
        lifetime.stop_application();
        return (combined, None);
    }

    let cancel = cancel.clone();
    let lifetime = lifetime.clone();
    let teardown = teardown.clone();
    let forwarder = tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => lifetime.stop_application(),
            _ = stopping.cancelled() => {}
            _ = teardown.cancelled() => {}
        }
    });
    (combined, Some(forwarder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_start_token_fires_stopping() {
        let lifetime = ApplicationLifetime::new();
        let cancel = CancellationToken::new();
        let (combined, forwarder) =
            forward_cancellation(&cancel, &lifetime, &CancellationToken::new());

        cancel.cancel();
        forwarder.unwrap().await.unwrap();
        assert!(lifetime.is_stopping());
        assert!(combined.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_token_fires_stopping_at_once() {
        let lifetime = ApplicationLifetime::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (combined, forwarder) =
            forward_cancellation(&cancel, &lifetime, &CancellationToken::new());
        assert!(forwarder.is_none());
        assert!(combined.is_cancelled());
    }

    #[tokio::test]
    async fn test_teardown_ends_forwarding() {
        let lifetime = ApplicationLifetime::new();
        let cancel = CancellationToken::new();
        let teardown = CancellationToken::new();
        let (combined, forwarder) = forward_cancellation(&cancel, &lifetime, &teardown);

        teardown.cancel();
        forwarder.unwrap().await.unwrap();

        cancel.cancel();
        assert!(!lifetime.is_stopping());
        assert!(!combined.is_cancelled());
    }
}
