//! The foreground application loop
//!
//! A host drives exactly one foreground loop (a UI event loop, an HTTP
//! server, a REPL...). The host treats it as opaque: it calls
//! [`ForegroundLoop::run`] once, which blocks until the application wants to
//! exit, and [`ForegroundLoop::request_exit`] during shutdown.

use super::signals::ApplicationLifetime;
use crate::di::Container;
use crate::dispose::Disposable;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Builds the application object once the foreground loop is ready
pub type ApplicationFactory = Box<dyn FnOnce(&Container) -> anyhow::Result<Disposable> + Send>;

/// Configures the application once the foreground loop is ready
pub type ApplicationConfigurer = Box<dyn FnOnce(&Container) -> anyhow::Result<()> + Send>;

/// Contract for the loop a host runs in the foreground
#[async_trait]
pub trait ForegroundLoop: Send + Sync + 'static {
    /// Runs until the application should exit.
    ///
    /// Implementations call [`ReadyHook::ready`] once the loop can accept
    /// work. An error is treated as an unhandled application failure: it is
    /// logged and the host shuts down.
    async fn run(&self, ready: ReadyHook) -> anyhow::Result<()>;

    /// Asks the loop to return from [`run`](Self::run).
    ///
    /// Called during every stop sequence, including after `run` has already
    /// returned, so it must tolerate a loop that is no longer running.
    async fn request_exit(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Slot holding the application object until disposal.
pub(crate) type ApplicationSlot = Arc<Mutex<Disposable>>;

/// Handed to [`ForegroundLoop::run`]; invoked once the loop is ready
pub struct ReadyHook {
    services: Arc<Container>,
    lifetime: ApplicationLifetime,
    factory: Option<ApplicationFactory>,
    configurers: Vec<ApplicationConfigurer>,
    application: ApplicationSlot,
}

impl ReadyHook {
    pub(crate) fn new(
        services: Arc<Container>,
        lifetime: ApplicationLifetime,
        factory: Option<ApplicationFactory>,
        configurers: Vec<ApplicationConfigurer>,
        application: ApplicationSlot,
    ) -> Self {
        Self {
            services,
            lifetime,
            factory,
            configurers,
            application,
        }
    }

    /// The host's resolved service container
    pub fn services(&self) -> &Arc<Container> {
        &self.services
    }

    /// Builds and configures the application object, then announces
    /// `started`.
    pub fn ready(self) -> anyhow::Result<()> {
        if let Some(factory) = self.factory {
            let application = factory(&self.services)?;
            *self
                .application
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = application;
        }

        for configure in self.configurers {
            configure(&self.services)?;
        }

        if self.lifetime.notify_started() {
            tracing::info!("Application started");
        }
        Ok(())
    }
}
