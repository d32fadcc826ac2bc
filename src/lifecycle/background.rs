//! Running a [`BackgroundService`] as a hosted service
//!
//! `start` spawns `execute` and returns at once. A second task waits for
//! the spawned work and publishes its terminal [`ExecutionOutcome`] on a
//! `watch` channel, which both `stop` and the supervisor observe through an
//! [`ExecutionHandle`].

use super::error::Cancelled;
use super::traits::{BackgroundService, HostedService};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// How a long-running execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// `execute` returned `Ok(())`
    Completed,
    /// `execute` returned [`Cancelled`] or its task was aborted
    Cancelled,
    /// `execute` returned any other error, or panicked
    Faulted(String),
}

impl ExecutionOutcome {
    fn from_join(result: Result<anyhow::Result<()>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => Self::Completed,
            Ok(Err(e)) if e.is::<Cancelled>() => Self::Cancelled,
            Ok(Err(e)) => Self::Faulted(format!("{:#}", e)),
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(e) => Self::Faulted(format!("execution panicked: {}", e)),
        }
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

/// Observer for one long-running execution
#[derive(Clone)]
pub struct ExecutionHandle {
    outcome: watch::Receiver<Option<ExecutionOutcome>>,
}

impl ExecutionHandle {
    /// Outcome if the execution already ended.
    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Waits for the execution to end.
    pub async fn wait(&self) -> ExecutionOutcome {
        let mut outcome = self.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(ExecutionOutcome::Cancelled),
            // The reporter went away without a verdict: the runtime is shutting down.
            Err(_) => ExecutionOutcome::Cancelled,
        }
    }
}

struct Running {
    stopping: CancellationToken,
    execution: ExecutionHandle,
}

/// Adapter that hosts a [`BackgroundService`]
///
/// # Example
///
/// ```rust
/// use meshestra_hosting::lifecycle::{Background, BackgroundService, HostedService};
/// use meshestra_hosting::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct Ticker;
///
/// #[async_trait]
/// impl BackgroundService for Ticker {
///     async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()> {
///         stopping.cancelled().await;
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let ticker = Background::new(Ticker);
/// ticker.start(CancellationToken::new()).await?;
/// ticker.stop(CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Background<S> {
    service: Arc<S>,
    running: Mutex<Option<Running>>,
}

impl<S: BackgroundService> Background<S> {
    pub fn new(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    pub fn from_arc(service: Arc<S>) -> Self {
        Self {
            service,
            running: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: BackgroundService> HostedService for Background<S> {
    fn name(&self) -> &str {
        self.service.name()
    }

    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        // Linked to the start token so a host that begins stopping cancels the work.
        let stopping = cancel.child_token();
        let (report, outcome) = watch::channel(None);

        let service = Arc::clone(&self.service);
        let token = stopping.clone();
        let work = tokio::spawn(async move { service.execute(token).await });

        tokio::spawn(async move {
            let result = ExecutionOutcome::from_join(work.await);
            let _ = report.send(Some(result));
        });

        let previous = self.running().replace(Running {
            stopping,
            execution: ExecutionHandle { outcome },
        });
        if let Some(previous) = previous {
            previous.stopping.cancel();
        }
        Ok(())
    }

    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let Some((stopping, execution)) = self
            .running()
            .as_ref()
            .map(|running| (running.stopping.clone(), running.execution.clone()))
        else {
            // Never started.
            return Ok(());
        };

        stopping.cancel();
        tokio::select! {
            biased;
            _ = execution.wait() => Ok(()),
            _ = cancel.cancelled() => Err(Cancelled.into()),
        }
    }

    fn execution(&self) -> Option<ExecutionHandle> {
        self.running()
            .as_ref()
            .map(|running| running.execution.clone())
    }
}
