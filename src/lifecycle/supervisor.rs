//! # Supervision of long-running hosted services
//!
//! Every hosted service that exposes an [`ExecutionHandle`] gets a watcher
//! task. The watcher waits for the execution's terminal outcome without
//! blocking startup, then applies the configured
//! [`BackgroundServiceExceptionBehavior`]:
//!
//! ```text
//! Completed                          → nothing
//! Cancelled, stop already requested  → nothing
//! Cancelled, stop not requested      → fault
//! Faulted                            → fault
//!
//! fault + Ignore   → logged, swallowed
//! fault + StopHost → logged, ApplicationLifetime::stop_application()
//! ```

use super::background::{ExecutionHandle, ExecutionOutcome};
use super::options::BackgroundServiceExceptionBehavior;
use super::signals::ApplicationLifetime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

/// A long-running service's execution paired with the policy applied to it
pub struct BackgroundServiceHandle {
    pub name: String,
    pub execution: ExecutionHandle,
    pub behavior: BackgroundServiceExceptionBehavior,
}

/// What a watcher decided once its execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionVerdict {
    /// Normal completion, or cancellation the host asked for
    Clean,
    /// A fault that was logged and otherwise ignored
    Ignored,
    /// A fault that requested the host to stop
    StopRequested,
}

/// Watches background executions on behalf of a host
pub struct BackgroundSupervisor {
    lifetime: ApplicationLifetime,
    stop_requested: Arc<AtomicBool>,
    watchers: Mutex<Vec<AbortHandle>>,
}

impl BackgroundSupervisor {
    /// `stop_requested` is the host's latch set when its stop sequence begins.
    pub fn new(lifetime: ApplicationLifetime, stop_requested: Arc<AtomicBool>) -> Self {
        Self {
            lifetime,
            stop_requested,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a watcher for `handle`; returns immediately.
    pub fn supervise(&self, handle: BackgroundServiceHandle) -> JoinHandle<SupervisionVerdict> {
        let lifetime = self.lifetime.clone();
        let stop_requested = Arc::clone(&self.stop_requested);

        let watcher = tokio::spawn(async move {
            let outcome = handle.execution.wait().await;
            // `stopping` fires before the host latches its own stop request.
            let requested = stop_requested.load(Ordering::Acquire) || lifetime.is_stopping();
            let verdict = judge(&outcome, requested, handle.behavior);
            report(&handle.name, &outcome, verdict, &lifetime);
            verdict
        });

        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watcher.abort_handle());
        watcher
    }

    /// Number of watchers spawned so far.
    pub fn supervised(&self) -> usize {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops watching; pending verdicts are dropped.
    pub fn abort_all(&self) {
        let watchers = std::mem::take(
            &mut *self
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for watcher in watchers {
            watcher.abort();
        }
    }
}

fn judge(
    outcome: &ExecutionOutcome,
    stop_requested: bool,
    behavior: BackgroundServiceExceptionBehavior,
) -> SupervisionVerdict {
    match outcome {
        ExecutionOutcome::Completed => SupervisionVerdict::Clean,
        ExecutionOutcome::Cancelled if stop_requested => SupervisionVerdict::Clean,
        ExecutionOutcome::Cancelled | ExecutionOutcome::Faulted(_) => match behavior {
            BackgroundServiceExceptionBehavior::Ignore => SupervisionVerdict::Ignored,
            BackgroundServiceExceptionBehavior::StopHost => SupervisionVerdict::StopRequested,
        },
    }
}

fn report(
    name: &str,
    outcome: &ExecutionOutcome,
    verdict: SupervisionVerdict,
    lifetime: &ApplicationLifetime,
) {
    let reason = match outcome {
        ExecutionOutcome::Faulted(message) => message.as_str(),
        _ => "cancelled unexpectedly",
    };

    match verdict {
        SupervisionVerdict::Clean => {
            tracing::debug!("Background service {} ended: {:?}", name, outcome);
        }
        SupervisionVerdict::Ignored => {
            tracing::error!("Background service {} failed: {}", name, reason);
        }
        SupervisionVerdict::StopRequested => {
            tracing::error!("Background service {} failed: {}", name, reason);
            tracing::error!(
                "Background service exception behavior is {}; stopping the host",
                BackgroundServiceExceptionBehavior::StopHost
            );
            lifetime.stop_application();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{Background, BackgroundService, Cancelled, HostedService};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Outcome(Option<&'static str>);

    #[async_trait]
    impl BackgroundService for Outcome {
        async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()> {
            match self.0 {
                Some("cancel") => Err(Cancelled.into()),
                Some(message) => Err(anyhow::anyhow!(message)),
                None => {
                    stopping.cancelled().await;
                    Err(Cancelled.into())
                }
            }
        }
    }

    async fn started(outcome: Outcome) -> Background<Outcome> {
        let service = Background::new(outcome);
        service.start(CancellationToken::new()).await.unwrap();
        service
    }

    fn handle(
        service: &Background<Outcome>,
        behavior: BackgroundServiceExceptionBehavior,
    ) -> BackgroundServiceHandle {
        BackgroundServiceHandle {
            name: "worker".to_string(),
            execution: service.execution().unwrap(),
            behavior,
        }
    }

    #[tokio::test]
    async fn test_fault_with_stop_host_requests_stop() {
        let lifetime = ApplicationLifetime::new();
        let supervisor = BackgroundSupervisor::new(lifetime.clone(), Arc::default());

        let service = started(Outcome(Some("boom"))).await;
        let verdict = supervisor
            .supervise(handle(&service, BackgroundServiceExceptionBehavior::StopHost))
            .await
            .unwrap();

        assert_eq!(verdict, SupervisionVerdict::StopRequested);
        assert!(lifetime.is_stopping());
    }

    #[tokio::test]
    async fn test_fault_with_ignore_never_stops() {
        let lifetime = ApplicationLifetime::new();
        let supervisor = BackgroundSupervisor::new(lifetime.clone(), Arc::default());

        let service = started(Outcome(Some("boom"))).await;
        let verdict = supervisor
            .supervise(handle(&service, BackgroundServiceExceptionBehavior::Ignore))
            .await
            .unwrap();

        assert_eq!(verdict, SupervisionVerdict::Ignored);
        assert!(!lifetime.is_stopping());
    }

    #[tokio::test]
    async fn test_unrequested_cancellation_is_a_fault() {
        let lifetime = ApplicationLifetime::new();
        let supervisor = BackgroundSupervisor::new(lifetime.clone(), Arc::default());

        let service = started(Outcome(Some("cancel"))).await;
        let verdict = supervisor
            .supervise(handle(&service, BackgroundServiceExceptionBehavior::StopHost))
            .await
            .unwrap();

        assert_eq!(verdict, SupervisionVerdict::StopRequested);
    }

    #[tokio::test]
    async fn test_cancellation_after_stop_request_is_clean() {
        let lifetime = ApplicationLifetime::new();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let supervisor = BackgroundSupervisor::new(lifetime.clone(), Arc::clone(&stop_requested));

        let service = started(Outcome(None)).await;
        let watcher =
            supervisor.supervise(handle(&service, BackgroundServiceExceptionBehavior::StopHost));
        assert_eq!(supervisor.supervised(), 1);

        stop_requested.store(true, Ordering::Release);
        service.stop(CancellationToken::new()).await.unwrap();

        assert_eq!(watcher.await.unwrap(), SupervisionVerdict::Clean);
        assert!(!lifetime.is_stopping());
    }

    #[tokio::test]
    async fn test_cancellation_after_stop_application_is_clean() {
        let lifetime = ApplicationLifetime::new();
        let supervisor = BackgroundSupervisor::new(lifetime.clone(), Arc::default());

        let service = Background::new(Outcome(None));
        service.start(lifetime.stopping()).await.unwrap();
        let watcher =
            supervisor.supervise(handle(&service, BackgroundServiceExceptionBehavior::StopHost));

        // Ctrl+C path: the hub fires before any host latch is set.
        lifetime.stop_application();

        assert_eq!(watcher.await.unwrap(), SupervisionVerdict::Clean);
        assert_eq!(
            service.execution().unwrap().outcome(),
            Some(ExecutionOutcome::Cancelled)
        );
    }

    #[test]
    fn test_judge_table() {
        use BackgroundServiceExceptionBehavior::{Ignore, StopHost};
        let fault = ExecutionOutcome::Faulted("x".into());

        let clean = SupervisionVerdict::Clean;

        assert_eq!(judge(&ExecutionOutcome::Completed, false, StopHost), clean);
        assert_eq!(judge(&ExecutionOutcome::Cancelled, true, StopHost), clean);
        assert_eq!(judge(&fault, true, StopHost), SupervisionVerdict::StopRequested);
        assert_eq!(judge(&fault, false, Ignore), SupervisionVerdict::Ignored);
    }
}
