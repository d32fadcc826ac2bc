//! Hosting contracts
//!
//! These traits define what the host calls on application-supplied
//! components during startup and shutdown.

use super::background::ExecutionHandle;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A unit of work whose startup and shutdown the host orders
///
/// Services start in registration order and stop in the exact reverse.
/// The token passed to `start` is cancelled when the host begins shutting
/// down; the token passed to `stop` is cancelled when the shutdown deadline
/// expires. Both are cooperative.
///
/// # Example
///
/// ```rust
/// use meshestra_hosting::lifecycle::HostedService;
/// use meshestra_hosting::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct CacheWarmer;
///
/// #[async_trait]
/// impl HostedService for CacheWarmer {
///     async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
///         // pre-load entries...
///         Ok(())
///     }
///
///     async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait HostedService: Send + Sync + 'static {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once, in registration order, before the foreground loop runs
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Called once, in reverse registration order, during shutdown
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Long-running work that keeps going after `start` returned.
    ///
    /// When present, the host supervises it for unexpected termination.
    fn execution(&self) -> Option<ExecutionHandle> {
        None
    }
}

/// A long-running service driven by a single `execute` call
///
/// Register it through [`Background`](super::Background) (or
/// `HostBuilder::add_background_service`). `execute` runs on its own task
/// and should return once `stopping` is cancelled, either with `Ok(())` or
/// with a [`Cancelled`](super::Cancelled) error. Any other error, a panic,
/// or a cancellation the host did not ask for is treated as a fault.
#[async_trait]
pub trait BackgroundService: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()>;
}

/// Integration point with whatever owns the process lifetime
///
/// `wait_for_start` gates startup and is best effort: its failures are
/// logged and ignored. Failures from `stop` are reported with the other
/// stop-phase errors.
#[async_trait]
pub trait HostLifetime: Send + Sync + 'static {
    async fn wait_for_start(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}
