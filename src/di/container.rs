use crate::dispose::{AsyncDispose, Disposable, Dispose};
use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, PoisonError};

/// Casts an `Arc<dyn Any>` holding the implementation into an `Arc<dyn Any>`
/// holding an `Arc<dyn Trait>`. `None` means the implementation had the wrong type.
type CasterFn =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// Thread-safe dependency injection container.
///
/// Registration happens through `&mut self` before the container is shared;
/// afterwards it is only resolved from. Singletons registered as disposable
/// are owned by the container and released, last registered first, when the
/// container itself is disposed.
pub struct Container {
    services: DashMap<TypeId, ServiceEntry>,
    trait_mappings: DashMap<TypeId, TypeId>,
    casters: DashMap<TypeId, CasterFn>,
    disposables: Mutex<Vec<(&'static str, Disposable)>>,
}

#[derive(Clone)]
struct ServiceEntry {
    instance: Arc<dyn Any + Send + Sync>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            trait_mappings: DashMap::new(),
            casters: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
        }
    }

    pub fn register<T: 'static + Send + Sync>(&mut self, instance: T) -> &mut Self {
        self.register_arc(Arc::new(instance))
    }

    /// Register an instance that is already shared elsewhere.
    pub fn register_arc<T: 'static + Send + Sync>(&mut self, instance: Arc<T>) -> &mut Self {
        let type_id = TypeId::of::<T>();
        self.services.insert(type_id, ServiceEntry { instance });
        self
    }

    /// Register a singleton the container releases synchronously on disposal.
    pub fn register_disposable<T: Dispose>(&mut self, instance: T) -> &mut Self {
        let instance = Arc::new(instance);
        self.track(std::any::type_name::<T>(), Disposable::from_sync(Arc::clone(&instance)));
        self.register_arc(instance)
    }

    /// Register a singleton the container releases asynchronously on disposal.
    pub fn register_async_disposable<T: AsyncDispose>(&mut self, instance: T) -> &mut Self {
        let instance = Arc::new(instance);
        self.track(std::any::type_name::<T>(), Disposable::from_async(Arc::clone(&instance)));
        self.register_arc(instance)
    }

    fn track(&mut self, type_name: &'static str, disposable: Disposable) {
        self.disposables
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push((type_name, disposable));
    }

    pub fn register_trait<Trait, Impl, F>(&mut self, caster_fn: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        let trait_id = TypeId::of::<Trait>();
        let impl_id = TypeId::of::<Impl>();

        self.trait_mappings.insert(trait_id, impl_id);

        let caster: CasterFn = Arc::new(move |instance: Arc<dyn Any + Send + Sync>| {
            let concrete = instance.downcast::<Impl>().ok()?;
            let trait_obj: Arc<Trait> = caster_fn(concrete);
            // Wrap the Arc<dyn Trait> in an Arc<dyn Any>
            Some(Arc::new(trait_obj) as Arc<dyn Any + Send + Sync>)
        });

        self.casters.insert(trait_id, caster);
        self
    }

    /// Register an already type-erased trait object under `Trait`.
    pub fn register_trait_object<Trait>(&mut self, instance: Arc<Trait>) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
    {
        self.register(instance)
            .register_trait::<Trait, Arc<Trait>, _>(|holder: Arc<Arc<Trait>>| Arc::clone(&*holder))
    }

    pub fn resolve<T: 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let requested_type_id = TypeId::of::<T>();
        let entry = self.services.get(&requested_type_id).ok_or_else(|| {
            ContainerError::DependencyNotFound {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;
        entry
            .instance
            .clone()
            .downcast::<T>()
            .map_err(|_| ContainerError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn resolve_trait<T: ?Sized + 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let requested_type_id = TypeId::of::<T>();

        let caster = self.casters.get(&requested_type_id).ok_or_else(|| {
            ContainerError::DependencyNotFound {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;

        let impl_type_id = self.trait_mappings.get(&requested_type_id).ok_or_else(|| {
            ContainerError::DependencyNotFound {
                type_name: format!(
                    "No implementation mapping found for trait '{}'",
                    std::any::type_name::<T>()
                ),
            }
        })?;

        let entry =
            self.services
                .get(&impl_type_id)
                .ok_or_else(|| ContainerError::DependencyNotFound {
                    type_name: format!(
                        "Implementation for trait '{}' not registered",
                        std::any::type_name::<T>()
                    ),
                })?;

        let downcast_failed = || ContainerError::DowncastFailed {
            type_name: std::any::type_name::<T>().to_string(),
        };

        let cast_result = (caster.value())(entry.instance.clone()).ok_or_else(downcast_failed)?;

        // The caster returns an Arc<dyn Any> which holds an Arc<T>.
        let wrapper = cast_result
            .downcast::<Arc<T>>()
            .map_err(|_| downcast_failed())?;
        Ok(wrapper.as_ref().clone())
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.services.contains_key(&type_id) || self.trait_mappings.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Number of container-owned singletons still awaiting disposal.
    pub fn pending_disposals(&self) -> usize {
        self.disposables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposing the container cascades to every singleton it owns, in reverse
/// registration order. A second disposal finds nothing left to release.
#[async_trait]
impl AsyncDispose for Container {
    async fn dispose(&self) -> anyhow::Result<()> {
        let owned = std::mem::take(
            &mut *self
                .disposables
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (type_name, disposable) in owned.into_iter().rev() {
            if let Err(e) = disposable.release().await {
                tracing::warn!("Failed to dispose singleton {}: {:#}", type_name, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: i32,
    }

    trait MyTrait: Send + Sync {
        fn get_value(&self) -> i32;
    }

    struct MyTraitImpl {
        value: i32,
    }

    impl MyTrait for MyTraitImpl {
        fn get_value(&self) -> i32 {
            self.value
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        container.register(TestService { value: 42 });
        let service = container.resolve::<TestService>().unwrap();
        assert_eq!(service.value, 42);
    }

    #[test]
    fn test_register_and_resolve_trait() {
        let mut container = Container::new();
        container.register(MyTraitImpl { value: 99 });
        container.register_trait::<dyn MyTrait, MyTraitImpl, _>(|i| i as Arc<dyn MyTrait>);
        let trait_instance = container.resolve_trait::<dyn MyTrait>().unwrap();
        assert_eq!(trait_instance.get_value(), 99);
    }

    #[test]
    fn test_register_trait_object() {
        let mut container = Container::new();
        let object: Arc<dyn MyTrait> = Arc::new(MyTraitImpl { value: 7 });
        container.register_trait_object(Arc::clone(&object));

        let resolved = container.resolve_trait::<dyn MyTrait>().unwrap();
        assert_eq!(resolved.get_value(), 7);
        assert!(std::ptr::addr_eq(Arc::as_ptr(&resolved), Arc::as_ptr(&object)));
        assert!(container.contains::<dyn MyTrait>());
    }

    #[test]
    fn test_missing_dependency() {
        let container = Container::new();
        let err = container.resolve::<TestService>().unwrap_err();
        assert!(matches!(err, ContainerError::DependencyNotFound { .. }));
        assert!(container.resolve_trait::<dyn MyTrait>().is_err());
    }

    #[tokio::test]
    async fn test_dispose_cascades_once_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        struct Owned {
            id: usize,
            order: Arc<Mutex<Vec<usize>>>,
            calls: Arc<AtomicUsize>,
        }

        impl Dispose for Owned {
            fn dispose(&self) -> anyhow::Result<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(self.id);
                Ok(())
            }
        }

        struct First(Owned);
        struct Second(Owned);

        impl Dispose for First {
            fn dispose(&self) -> anyhow::Result<()> {
                self.0.dispose()
            }
        }

        #[async_trait]
        impl AsyncDispose for Second {
            async fn dispose(&self) -> anyhow::Result<()> {
                self.0.dispose()
            }
        }

        let owned = |id| Owned {
            id,
            order: Arc::clone(&order),
            calls: Arc::clone(&calls),
        };

        let mut container = Container::new();
        container.register_disposable(First(owned(1)));
        container.register_async_disposable(Second(owned(2)));
        assert!(container.resolve::<First>().is_ok());
        assert_eq!(container.pending_disposals(), 2);

        AsyncDispose::dispose(&container).await.unwrap();
        AsyncDispose::dispose(&container).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(container.pending_disposals(), 0);
    }
}
