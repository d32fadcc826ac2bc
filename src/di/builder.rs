use crate::di::Container;
use crate::dispose::{AsyncDispose, Dispose};
use std::sync::Arc;

/// Builder for constructing a dependency injection container
///
/// Use this to configure and register services before building the final immutable container.
///
/// # Example
/// ```
/// use meshestra_hosting::ContainerBuilder;
///
/// struct Database;
///
/// let container = ContainerBuilder::new().register(Database).build();
/// assert!(container.resolve::<Database>().is_ok());
/// ```
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            container: Container::new(),
        }
    }

    /// Register a service instance
    pub fn register<T: 'static + Send + Sync>(mut self, instance: T) -> Self {
        self.container.register(instance);
        self
    }

    /// Register a service instance released synchronously when the container is disposed
    pub fn register_disposable<T: Dispose>(mut self, instance: T) -> Self {
        self.container.register_disposable(instance);
        self
    }

    /// Register a service instance released asynchronously when the container is disposed
    pub fn register_async_disposable<T: AsyncDispose>(mut self, instance: T) -> Self {
        self.container.register_async_disposable(instance);
        self
    }

    /// Bind a trait to a concrete implementation
    ///
    /// This enables resolving `Arc<dyn Trait>` to the registered implementation.
    /// The implementation must have been registered first (or will be).
    pub fn bind<Trait, Impl, F>(mut self, caster: F) -> Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        self.container.register_trait::<Trait, Impl, F>(caster);
        self
    }

    /// Build the container
    pub fn build(self) -> Container {
        self.container
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Container> for ContainerBuilder {
    fn from(container: Container) -> Self {
        Self { container }
    }
}
