//! Host Builder
//!
//! Collects configuration, services and hooks, then assembles a [`Host`].

use super::application::{Bootstrap, Host, HostParts};
use super::background::Background;
use super::environment::HostEnvironment;
use super::error::{HostError, Result};
use super::foreground::{ApplicationConfigurer, ApplicationFactory, ForegroundLoop};
use super::manager::HostedServices;
use super::options::HostOptions;
use super::shutdown::ConsoleLifetime;
use super::signals::ApplicationLifetime;
use super::traits::{BackgroundService, HostLifetime, HostedService};
use crate::config::ConfigService;
use crate::di::Container;
use crate::dispose::Disposable;
use std::sync::Arc;

type OptionsConfigurer = Box<dyn FnOnce(&mut HostOptions) + Send>;
type EnvironmentConfigurer = Box<dyn FnOnce(&mut HostEnvironment) + Send>;

/// Builder for [`Host`]
///
/// A builder produces one host; a second [`build`](Self::build) fails with
/// [`HostError::AlreadyBuilt`].
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = HostBuilder::from_config(ConfigService::from_pairs([
///     ("shutdownTimeoutSeconds", "10"),
/// ]));
/// builder
///     .configure_services(|container| {
///         container.register(Database::connect());
///     })
///     .add_hosted_service(CacheWarmer::new())
///     .add_background_service(MetricsFlusher::new())
///     .use_foreground(HttpServer::new());
///
/// let host = builder.build()?;
/// ```
pub struct HostBuilder {
    config: ConfigService,
    container: Container,
    lifetime: ApplicationLifetime,
    hosted_services: Vec<Arc<dyn HostedService>>,
    options_configurers: Vec<OptionsConfigurer>,
    environment_configurers: Vec<EnvironmentConfigurer>,
    host_lifetime: Option<Arc<dyn HostLifetime>>,
    foreground: Option<Arc<dyn ForegroundLoop>>,
    bootstrap: Bootstrap,
    built: bool,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBuilder {
    /// Create a builder reading configuration from the process environment
    pub fn new() -> Self {
        Self::from_config(ConfigService::new())
    }

    pub fn from_config(config: ConfigService) -> Self {
        Self {
            config,
            container: Container::new(),
            lifetime: ApplicationLifetime::new(),
            hosted_services: Vec::new(),
            options_configurers: Vec::new(),
            environment_configurers: Vec::new(),
            host_lifetime: None,
            foreground: None,
            bootstrap: Bootstrap::default(),
            built: false,
        }
    }

    pub fn config(&self) -> &ConfigService {
        &self.config
    }

    /// The lifetime the built host will signal through
    ///
    /// Available before [`build`](Self::build) so services can subscribe
    /// while they are being registered.
    pub fn lifetime(&self) -> ApplicationLifetime {
        self.lifetime.clone()
    }

    /// Replace the service container
    pub fn with_container(&mut self, container: Container) -> &mut Self {
        self.container = container;
        self
    }

    pub fn configure_services<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut Container),
    {
        configure(&mut self.container);
        self
    }

    /// Register a hosted service; services start in registration order.
    pub fn add_hosted_service<S: HostedService>(&mut self, service: S) -> &mut Self {
        self.hosted_services.push(Arc::new(service));
        self
    }

    pub fn add_hosted_service_arc(&mut self, service: Arc<dyn HostedService>) -> &mut Self {
        self.hosted_services.push(service);
        self
    }

    /// Register a long-running background service
    pub fn add_background_service<S: BackgroundService>(&mut self, service: S) -> &mut Self {
        self.hosted_services.push(Arc::new(Background::new(service)));
        self
    }

    /// Adjust options after they have been read from configuration.
    pub fn configure_options<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut HostOptions) + Send + 'static,
    {
        self.options_configurers.push(Box::new(configure));
        self
    }

    pub fn configure_environment<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut HostEnvironment) + Send + 'static,
    {
        self.environment_configurers.push(Box::new(configure));
        self
    }

    /// Use `lifetime` instead of [`ConsoleLifetime`]
    pub fn use_host_lifetime<L: HostLifetime>(&mut self, lifetime: L) -> &mut Self {
        self.host_lifetime = Some(Arc::new(lifetime));
        self
    }

    pub fn use_foreground<F: ForegroundLoop>(&mut self, foreground: F) -> &mut Self {
        self.foreground = Some(Arc::new(foreground));
        self
    }

    /// Build the application object when the foreground loop is ready.
    ///
    /// The returned resource is disposed after the file providers and before
    /// the container.
    pub fn application<F>(&mut self, factory: F) -> &mut Self
    where
        F: FnOnce(&Container) -> anyhow::Result<Disposable> + Send + 'static,
    {
        self.bootstrap.factory = Some(Box::new(factory) as ApplicationFactory);
        self
    }

    /// Run `configure` once the application object exists, before `started`.
    pub fn configure_application<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&Container) -> anyhow::Result<()> + Send + 'static,
    {
        self.bootstrap
            .configurers
            .push(Box::new(configure) as ApplicationConfigurer);
        self
    }

    /// Assemble the host.
    ///
    /// Registers the configuration, options, environment, application
    /// lifetime and hosted-service list into the container. Falls back to
    /// [`ConsoleLifetime`] when no host lifetime was supplied.
    ///
    /// # Errors
    ///
    /// - [`HostError::AlreadyBuilt`] if this builder already built a host.
    /// - [`HostError::Construction`] if no foreground loop is available.
    pub fn build(&mut self) -> Result<Host> {
        if std::mem::replace(&mut self.built, true) {
            return Err(HostError::AlreadyBuilt);
        }

        let mut options = HostOptions::from_config(&self.config);
        for configure in self.options_configurers.drain(..) {
            configure(&mut options);
        }
        let options = Arc::new(options);

        let mut environment = HostEnvironment::from_config(&self.config);
        let default_provider = environment.content_root_provider();
        for configure in self.environment_configurers.drain(..) {
            configure(&mut environment);
        }
        let environment = Arc::new(environment);

        let mut container = std::mem::take(&mut self.container);

        let mut hosted = container
            .resolve::<HostedServices>()
            .map(|services| (*services).clone())
            .unwrap_or_default();
        for service in self.hosted_services.drain(..) {
            hosted.push(service);
        }

        container
            .register(self.config.clone())
            .register_arc(Arc::clone(&options))
            .register_arc(Arc::clone(&environment))
            .register(self.lifetime.clone())
            .register(hosted);

        if let Some(foreground) = self.foreground.take() {
            container.register_trait_object::<dyn ForegroundLoop>(foreground);
        }
        if let Some(host_lifetime) = self.host_lifetime.take() {
            container.register_trait_object::<dyn HostLifetime>(host_lifetime);
        } else if !container.contains::<dyn HostLifetime>() {
            container.register_trait_object::<dyn HostLifetime>(Arc::new(ConsoleLifetime::new(
                self.lifetime.clone(),
            )));
        }

        let foreground = container
            .resolve_trait::<dyn ForegroundLoop>()
            .map_err(|e| HostError::missing_dependency("no foreground loop registered", e))?;
        let host_lifetime = container
            .resolve_trait::<dyn HostLifetime>()
            .map_err(|e| HostError::missing_dependency("host lifetime unavailable", e))?;

        tracing::debug!(
            services = container.len(),
            "Host built for {} ({})",
            environment.application_name(),
            environment.environment_name()
        );

        Ok(Host::new(HostParts {
            services: Arc::new(container),
            options,
            lifetime: self.lifetime.clone(),
            host_lifetime,
            foreground,
            environment,
            default_provider,
            bootstrap: std::mem::take(&mut self.bootstrap),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::NoopLifetime;
    use crate::lifecycle::ReadyHook;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Idle;

    #[async_trait]
    impl ForegroundLoop for Idle {
        async fn run(&self, ready: ReadyHook) -> anyhow::Result<()> {
            ready.ready()
        }

        async fn request_exit(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn builder() -> HostBuilder {
        let mut builder = HostBuilder::from_config(ConfigService::empty());
        builder.use_host_lifetime(NoopLifetime).use_foreground(Idle);
        builder
    }

    #[test]
    fn test_build_twice_fails() {
        let mut builder = builder();
        assert!(builder.build().is_ok());
        assert!(matches!(builder.build(), Err(HostError::AlreadyBuilt)));
    }

    #[test]
    fn test_missing_foreground_is_construction_error() {
        let mut builder = HostBuilder::from_config(ConfigService::empty());
        builder.use_host_lifetime(NoopLifetime);

        match builder.build() {
            Err(HostError::Construction { source, .. }) => assert!(source.is_some()),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a construction error"),
        }
    }

    #[test]
    fn test_build_registers_host_services() {
        let mut builder = HostBuilder::from_config(ConfigService::from_pairs([(
            "shutdownTimeoutSeconds",
            "10",
        )]));
        builder
            .use_foreground(Idle)
            .configure_options(|options| {
                options.shutdown_timeout += Duration::from_secs(1);
            });

        let host = builder.build().unwrap();
        let services = host.services();

        assert_eq!(host.options().shutdown_timeout, Duration::from_secs(11));
        assert_eq!(
            services.resolve::<HostOptions>().unwrap().shutdown_timeout,
            Duration::from_secs(11)
        );
        assert!(services.contains::<ApplicationLifetime>());
        assert!(services.contains::<HostEnvironment>());
        assert!(services.contains::<ConfigService>());
        assert!(services.contains::<HostedServices>());
        assert!(services.resolve_trait::<dyn HostLifetime>().is_ok());
    }

    #[test]
    fn test_builder_and_container_services_merge_in_order() {
        let mut builder = builder();
        builder
            .configure_services(|container| {
                container.register(HostedServices::new(vec![Arc::new(Background::new(Named))]));
            })
            .add_background_service(Named);

        let host = builder.build().unwrap();
        let hosted = host.services().resolve::<HostedServices>().unwrap();
        assert_eq!(hosted.len(), 2);
    }

    struct Named;

    #[async_trait]
    impl BackgroundService for Named {
        async fn execute(&self, stopping: CancellationToken) -> anyhow::Result<()> {
            stopping.cancelled().await;
            Ok(())
        }
    }

    #[test]
    fn test_environment_configurer_applies() {
        let mut builder = builder();
        builder.configure_environment(|environment| {
            environment.set_environment_name("Development");
        });

        let host = builder.build().unwrap();
        assert!(host.environment().is_development());
    }
}
