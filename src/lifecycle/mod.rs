//! Application Lifecycle Module
//!
//! Coordinates one application's run: hosted services, supervised background
//! work, lifecycle signals, the foreground loop and ordered disposal.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. HostBuilder::build
//!    ↓
//! 2. HostLifetime::wait_for_start      ← readiness gate
//!    ↓
//! 3. HostedService::start (each, in registration order)
//!    ↓
//! 4. ForegroundLoop::run → ReadyHook::ready → `started`
//!    ↓
//! [Running...]   background faults, Ctrl+C or stop_application()
//!    ↓
//! 5. `stopping`
//!    ↓
//! 6. HostedService::stop (each, in reverse order)
//!    ↓
//! 7. `stopped` → ForegroundLoop::request_exit → HostLifetime::stop
//!    ↓
//! 8. Dispose: content root provider → application → container
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use meshestra_hosting::lifecycle::{BackgroundService, Host};
//! use meshestra_hosting::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl BackgroundService for Heartbeat {
//!     async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()> {
//!         while !stopping.is_cancelled() {
//!             tracing::info!("beat");
//!             tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut builder = Host::builder();
//! builder.add_background_service(Heartbeat).use_foreground(Server::new());
//! builder.build()?.run().await?;
//! ```

mod application;
mod background;
mod builder;
mod environment;
mod error;
mod foreground;
mod manager;
mod options;
mod shutdown;
mod signals;
mod state;
mod supervisor;
mod traits;

pub use application::{Host, SELF_STOP_DEADLINE};
pub use background::{Background, ExecutionHandle, ExecutionOutcome};
pub use builder::HostBuilder;
pub use environment::{
    APPLICATION_NAME_KEY, CONTENT_ROOT_KEY, DEFAULT_ENVIRONMENT, ENVIRONMENT_KEY, FileProvider,
    HostEnvironment, PhysicalFileProvider,
};
pub use error::{AggregateError, Cancelled, HostError, Result};
pub use foreground::{ApplicationConfigurer, ApplicationFactory, ForegroundLoop, ReadyHook};
pub use manager::{HostedServices, ServiceManager};
pub use options::{
    BACKGROUND_EXCEPTION_BEHAVIOR_KEY, BackgroundServiceExceptionBehavior,
    DEFAULT_SHUTDOWN_TIMEOUT, HostOptions, SHUTDOWN_TIMEOUT_KEY,
};
pub use shutdown::{ConsoleLifetime, NoopLifetime, shutdown_signal};
pub use signals::{ApplicationLifetime, LifecyclePhase};
pub use state::{HostState, HostStatus};
pub use supervisor::{BackgroundServiceHandle, BackgroundSupervisor, SupervisionVerdict};
pub use traits::{BackgroundService, HostLifetime, HostedService};
