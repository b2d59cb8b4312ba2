//! Service container implementation.
//!
//! Provides type-keyed service registration and resolution with three
//! lifetimes:
//! - Singleton: built once (guarded against concurrent first resolution)
//! - Scoped: built once per [`Scope`]
//! - Transient: built on every resolution
//!
//! Factories receive a [`Resolver`] which carries the caller's scope, so
//! dependencies resolved from inside a factory share the same scoped
//! instances as the outer resolution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptor::{AnyService, ServiceDescriptor};
use crate::error::{ConfigurationError, ContainerError, LifetimeViolationError};
use crate::key::{Lifetime, ServiceKey};
use crate::scope::Scope;

/// Registry of service descriptors
#[derive(Default)]
pub struct ServiceContainer {
    registry: RwLock<HashMap<ServiceKey, Arc<ServiceDescriptor>>>,
    sealed: AtomicBool,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service.
    ///
    /// Replacing is only allowed while the existing registration has never
    /// been resolved.
    pub fn register(&self, descriptor: impl Into<ServiceDescriptor>) -> Result<(), ContainerError> {
        let descriptor = descriptor.into();
        let key = descriptor.key();

        if self.is_sealed() {
            return Err(ConfigurationError::Sealed { key }.into());
        }

        let mut registry = self.registry.write();
        if let Some(existing) = registry.get(&key) {
            if existing.was_resolved() {
                return Err(ConfigurationError::AlreadyResolved { key }.into());
            }
            tracing::debug!(service = %key, "replacing service registration");
        }

        tracing::debug!(service = %key, lifetime = %descriptor.lifetime(), "registered service");
        registry.insert(key, Arc::new(descriptor));
        Ok(())
    }

    pub fn register_singleton<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::singleton(factory))
    }

    pub fn register_scoped<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::scoped(factory))
    }

    pub fn register_transient<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::transient(factory))
    }

    pub fn register_instance<T>(&self, instance: Arc<T>) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::instance(instance))
    }

    /// Reject every further registration.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.registry.read().contains_key(&ServiceKey::of::<T>())
    }

    pub fn lifetime_of<T: ?Sized + 'static>(&self) -> Option<Lifetime> {
        self.registry
            .read()
            .get(&ServiceKey::of::<T>())
            .map(|descriptor| descriptor.lifetime())
    }

    /// Registered keys, sorted by type name
    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self.registry.read().keys().copied().collect();
        keys.sort_by_key(|key| key.type_name());
        keys
    }

    /// Resolve outside of any scope.
    ///
    /// Scoped services (and anything depending on them) fail with
    /// [`LifetimeViolationError::MissingScope`].
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_in::<T>(None)
    }

    /// Resolve with an optional scope.
    pub fn resolve_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: Option<&Scope>,
    ) -> Result<Arc<T>, ContainerError> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_key(key, scope, &[])?;
        downcast::<T>(key, &instance)
    }

    /// Resolve every registered service inside `scope`.
    ///
    /// Run once at startup so that a broken registration fails the process
    /// instead of its first request.
    pub fn verify(&self, scope: &Scope) -> Result<VerificationReport, ContainerError> {
        let mut report = VerificationReport::default();
        for key in self.keys() {
            let lifetime = self.descriptor(key)?.lifetime();
            if let Err(err) = self.resolve_key(key, Some(scope), &[]) {
                tracing::error!(service = %key, error = %err, "service failed verification");
                return Err(err);
            }
            report.services.push((key, lifetime));
        }
        tracing::info!(services = report.services.len(), "container verified");
        Ok(report)
    }

    fn descriptor(&self, key: ServiceKey) -> Result<Arc<ServiceDescriptor>, ContainerError> {
        self.registry
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ConfigurationError::Unregistered { key }.into())
    }

    pub(crate) fn resolve_key(
        &self,
        key: ServiceKey,
        scope: Option<&Scope>,
        chain: &[ServiceKey],
    ) -> Result<AnyService, ContainerError> {
        if chain.contains(&key) {
            let mut cycle = chain.to_vec();
            cycle.push(key);
            return Err(ConfigurationError::CircularDependency { chain: cycle }.into());
        }

        let descriptor = self.descriptor(key)?;
        descriptor.mark_resolved();

        let mut path = chain.to_vec();
        path.push(key);

        match descriptor.lifetime() {
            Lifetime::Singleton => {
                // Singletons never see the caller's scope: they must not
                // capture scoped instances.
                let instance = descriptor.singleton.get_or_try_init(|| {
                    tracing::debug!(service = %key, "constructing singleton");
                    (descriptor.factory)(&Resolver::new(self, None, path))
                })?;
                Ok(Arc::clone(instance))
            }
            Lifetime::Scoped => {
                let scope = scope.ok_or(LifetimeViolationError::MissingScope { key })?;
                scope.get_or_create(&descriptor, || {
                    (descriptor.factory)(&Resolver::new(self, Some(scope), path))
                })
            }
            Lifetime::Transient => (descriptor.factory)(&Resolver::new(self, scope, path)),
        }
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.registry.read().len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

fn downcast<T: ?Sized + Send + Sync + 'static>(
    key: ServiceKey,
    instance: &AnyService,
) -> Result<Arc<T>, ContainerError> {
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| ConfigurationError::TypeMismatch { key }.into())
}

/// Resolution context handed to factories.
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    scope: Option<&'a Scope>,
    chain: Vec<ServiceKey>,
}

impl<'a> Resolver<'a> {
    fn new(
        container: &'a ServiceContainer,
        scope: Option<&'a Scope>,
        chain: Vec<ServiceKey>,
    ) -> Self {
        Self {
            container,
            scope,
            chain,
        }
    }

    /// Resolve a dependency in the same scope as the service being built.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let key = ServiceKey::of::<T>();
        let instance = self.container.resolve_key(key, self.scope, &self.chain)?;
        downcast::<T>(key, &instance)
    }

    /// The scope the current resolution runs in, if any
    pub fn scope(&self) -> Option<&'a Scope> {
        self.scope
    }
}

/// Services resolved during [`ServiceContainer::verify`]
#[derive(Debug, Default)]
pub struct VerificationReport {
    pub services: Vec<(ServiceKey, Lifetime)>,
}

impl VerificationReport {
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
