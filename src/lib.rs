//! # Meshestra Hosting
//!
//! An application host for Rust services and desktop-style applications.
//!
//! A [`Host`](lifecycle::Host) owns a service container and runs one
//! application from start to disposal:
//!
//! - **Hosted services** start in registration order and stop in reverse.
//! - **Background services** run supervised; a fault either is logged or
//!   stops the whole host, per
//!   [`BackgroundServiceExceptionBehavior`](lifecycle::BackgroundServiceExceptionBehavior).
//! - **Lifecycle signals** (`started`, `stopping`, `stopped`) fire once each
//!   and can be observed from anywhere through
//!   [`ApplicationLifetime`](lifecycle::ApplicationLifetime).
//! - **Bounded shutdown**: the stop sequence is capped by
//!   `shutdownTimeoutSeconds` and reports every failure at once.
//! - **Ordered disposal**: file provider, then application object, then the
//!   container and every disposable singleton it owns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshestra_hosting::async_trait;
//! use meshestra_hosting::lifecycle::{BackgroundService, ForegroundLoop, Host, ReadyHook};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Ticker;
//!
//! #[async_trait]
//! impl BackgroundService for Ticker {
//!     async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()> {
//!         stopping.cancelled().await;
//!         Ok(())
//!     }
//! }
//!
//! struct Shell {
//!     exit: CancellationToken,
//! }
//!
//! #[async_trait]
//! impl ForegroundLoop for Shell {
//!     async fn run(&self, ready: ReadyHook) -> anyhow::Result<()> {
//!         ready.ready()?;
//!         self.exit.cancelled().await;
//!         Ok(())
//!     }
//!
//!     async fn request_exit(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
//!         self.exit.cancel();
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut builder = Host::builder();
//!     builder
//!         .add_background_service(Ticker)
//!         .use_foreground(Shell { exit: CancellationToken::new() });
//!
//!     let host = builder.build()?;
//!     host.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod di;
pub mod dispose;
pub mod error;
pub mod lifecycle;

// Re-export core types
pub use config::ConfigService;
pub use di::{Container, ContainerBuilder};
pub use dispose::{AsyncDispose, Disposable, Dispose};
pub use error::{ContainerError, Result};
pub use lifecycle::{Host, HostBuilder, HostError, HostOptions};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use meshestra_hosting::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ConfigService;
    pub use crate::di::{Container, ContainerBuilder};
    pub use crate::dispose::{AsyncDispose, Disposable, Dispose};
    pub use crate::lifecycle::{
        AggregateError, ApplicationLifetime, BackgroundService,
        BackgroundServiceExceptionBehavior, ForegroundLoop, Host, HostBuilder, HostError,
        HostLifetime, HostOptions, HostState, HostedService, LifecyclePhase, ReadyHook,
        shutdown_signal,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
