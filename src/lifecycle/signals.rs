//! Application lifetime signals
//!
//! Three one-shot, broadcast notifications mark the host's progress:
//! `started`, `stopping` and `stopped`. Each is a [`CancellationToken`] that,
//! once cancelled, stays cancelled, so a late subscriber is satisfied
//! immediately. Firing a phase twice is a no-op.

use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use strum_macros::Display;
use tokio_util::sync::CancellationToken;

/// A lifecycle phase announced by [`ApplicationLifetime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LifecyclePhase {
    Started,
    Stopping,
    Stopped,
}

struct PhaseSignal {
    token: CancellationToken,
    fired_at: OnceLock<DateTime<Utc>>,
}

impl PhaseSignal {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            fired_at: OnceLock::new(),
        }
    }

    fn fire(&self) -> bool {
        if self.fired_at.set(Utc::now()).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }
}

struct Signals {
    started: PhaseSignal,
    stopping: PhaseSignal,
    stopped: PhaseSignal,
}

/// Lifecycle signal hub shared by every component of a host
///
/// Cheap to clone; all clones observe the same signals.
///
/// # Example
///
/// ```rust
/// use meshestra_hosting::lifecycle::ApplicationLifetime;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lifetime = ApplicationLifetime::new();
/// let stopping = lifetime.stopping();
///
/// lifetime.stop_application();
/// stopping.cancelled().await;
/// assert!(lifetime.is_stopping());
/// # }
/// ```
#[derive(Clone)]
pub struct ApplicationLifetime {
    signals: Arc<Signals>,
}

impl Default for ApplicationLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationLifetime {
    pub fn new() -> Self {
        Self {
            signals: Arc::new(Signals {
                started: PhaseSignal::new(),
                stopping: PhaseSignal::new(),
                stopped: PhaseSignal::new(),
            }),
        }
    }

    fn signal(&self, phase: LifecyclePhase) -> &PhaseSignal {
        match phase {
            LifecyclePhase::Started => &self.signals.started,
            LifecyclePhase::Stopping => &self.signals.stopping,
            LifecyclePhase::Stopped => &self.signals.stopped,
        }
    }

    /// Token cancelled once the application has fully started
    pub fn started(&self) -> CancellationToken {
        self.signals.started.token.clone()
    }

    /// Token cancelled when a graceful shutdown begins
    pub fn stopping(&self) -> CancellationToken {
        self.signals.stopping.token.clone()
    }

    /// Token cancelled once every hosted service has stopped
    pub fn stopped(&self) -> CancellationToken {
        self.signals.stopped.token.clone()
    }

    /// Requests that the host shut down.
    ///
    /// Equivalent to announcing `stopping`; the host reacts by running its
    /// stop sequence.
    pub fn stop_application(&self) {
        if self.notify(LifecyclePhase::Stopping) {
            tracing::info!("Application stop requested");
        }
    }

    pub(crate) fn notify_started(&self) -> bool {
        self.notify(LifecyclePhase::Started)
    }

    pub(crate) fn notify_stopping(&self) -> bool {
        self.notify(LifecyclePhase::Stopping)
    }

    pub(crate) fn notify_stopped(&self) -> bool {
        self.notify(LifecyclePhase::Stopped)
    }

    fn notify(&self, phase: LifecyclePhase) -> bool {
        let fired = self.signal(phase).fire();
        if fired {
            tracing::debug!("Lifecycle phase fired: {}", phase);
        }
        fired
    }

    /// Waits until `phase` has fired; returns immediately if it already has.
    pub async fn wait(&self, phase: LifecyclePhase) {
        self.signal(phase).token.cancelled().await;
    }

    pub fn has_fired(&self, phase: LifecyclePhase) -> bool {
        self.signal(phase).token.is_cancelled()
    }

    /// When `phase` fired, if it has.
    pub fn fired_at(&self, phase: LifecyclePhase) -> Option<DateTime<Utc>> {
        self.signal(phase).fired_at.get().copied()
    }

    pub fn is_started(&self) -> bool {
        self.has_fired(LifecyclePhase::Started)
    }

    pub fn is_stopping(&self) -> bool {
        self.has_fired(LifecyclePhase::Stopping)
    }

    pub fn is_stopped(&self) -> bool {
        self.has_fired(LifecyclePhase::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_is_idempotent() {
        let lifetime = ApplicationLifetime::new();

        assert!(lifetime.notify_stopping());
        let first = lifetime.fired_at(LifecyclePhase::Stopping);
        assert!(!lifetime.notify_stopping());
        lifetime.stop_application();

        assert_eq!(lifetime.fired_at(LifecyclePhase::Stopping), first);
        assert!(lifetime.is_stopping());
        assert!(!lifetime.is_started());
        assert!(!lifetime.is_stopped());
    }

    #[tokio::test]
    async fn test_late_subscriber_is_satisfied() {
        let lifetime = ApplicationLifetime::new();
        lifetime.notify_started();

        tokio::time::timeout(Duration::from_millis(50), lifetime.wait(LifecyclePhase::Started))
            .await
            .expect("already-fired phase should resolve immediately");
        assert!(lifetime.started().is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_signals() {
        let lifetime = ApplicationLifetime::new();
        let observer = lifetime.clone();
        let stopped = observer.stopped();

        let waiter = tokio::spawn(async move { stopped.cancelled().await });
        lifetime.notify_stopped();

        waiter.await.unwrap();
        assert!(observer.is_stopped());
        assert!(observer.fired_at(LifecyclePhase::Stopped).is_some());
    }
}
