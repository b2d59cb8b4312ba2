//! Service descriptors: what to build, how long to keep it, how to release it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::container::Resolver;
use crate::error::ContainerError;
use crate::key::{Lifetime, ServiceKey};

/// Type-erased instance. The concrete payload is always an `Arc<T>`.
pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory =
    Arc<dyn Fn(&Resolver<'_>) -> Result<AnyService, ContainerError> + Send + Sync>;

pub(crate) type DisposeHook = Arc<dyn Fn(&AnyService) + Send + Sync>;

/// Typed registration builder, erased into a [`ServiceDescriptor`] on
/// registration.
pub struct Registration<T: ?Sized + Send + Sync + 'static> {
    lifetime: Lifetime,
    factory: Arc<dyn Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync>,
    dispose: Option<Arc<dyn Fn(&Arc<T>) + Send + Sync>>,
}

impl<T: ?Sized + Send + Sync + 'static> Registration<T> {
    pub fn new<F>(lifetime: Lifetime, factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        Self {
            lifetime,
            factory: Arc::new(factory),
            dispose: None,
        }
    }

    /// Run `hook` when the owning scope is closed.
    ///
    /// Only scoped instances are tracked for disposal; the hook is ignored for
    /// singleton and transient registrations.
    pub fn on_dispose<D>(mut self, hook: D) -> Self
    where
        D: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.dispose = Some(Arc::new(hook));
        self
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Registration<T>> for ServiceDescriptor {
    fn from(registration: Registration<T>) -> Self {
        let Registration {
            lifetime,
            factory,
            dispose,
        } = registration;

        let factory: ErasedFactory = Arc::new(move |resolver: &Resolver<'_>| {
            let instance = factory(resolver)?;
            Ok(Arc::new(instance) as AnyService)
        });
        let dispose = dispose.map(|hook| {
            Arc::new(move |instance: &AnyService| {
                if let Some(typed) = instance.downcast_ref::<Arc<T>>() {
                    hook(typed);
                }
            }) as DisposeHook
        });

        ServiceDescriptor {
            key: ServiceKey::of::<T>(),
            lifetime,
            factory,
            dispose,
            singleton: OnceCell::new(),
            resolved: AtomicBool::new(false),
        }
    }
}

/// A registered service: key, factory and lifetime, plus the singleton slot.
pub struct ServiceDescriptor {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: ErasedFactory,
    pub(crate) dispose: Option<DisposeHook>,
    pub(crate) singleton: OnceCell<AnyService>,
    resolved: AtomicBool,
}

impl ServiceDescriptor {
    pub fn singleton<T, F>(factory: F) -> Registration<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        Registration::new(Lifetime::Singleton, factory)
    }

    pub fn scoped<T, F>(factory: F) -> Registration<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        Registration::new(Lifetime::Scoped, factory)
    }

    pub fn transient<T, F>(factory: F) -> Registration<T>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        Registration::new(Lifetime::Transient, factory)
    }

    /// A singleton backed by an already constructed instance.
    pub fn instance<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Registration<T> {
        Registration::new(Lifetime::Singleton, move |_| Ok(Arc::clone(&instance)))
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Whether any resolution has been attempted against this registration
    pub fn was_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("disposable", &self.dispose.is_some())
            .field("instantiated", &self.singleton.get().is_some())
            .finish()
    }
}
