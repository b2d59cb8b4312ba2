//! Resolution scopes.
//!
//! A [`Scope`] spans one logical operation. It owns every scoped instance
//! resolved through it and releases the disposable ones, newest first, when
//! closed. Dropping a scope closes it, so disposal also runs when the
//! operation bails out early.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::container::ServiceContainer;
use crate::descriptor::{AnyService, DisposeHook, ServiceDescriptor};
use crate::error::{ContainerError, LifetimeViolationError};
use crate::key::ServiceKey;

struct Disposable {
    key: ServiceKey,
    instance: AnyService,
    hook: DisposeHook,
}

pub struct Scope {
    id: Uuid,
    container: Arc<ServiceContainer>,
    instances: Mutex<HashMap<ServiceKey, Arc<OnceCell<AnyService>>>>,
    /// Construction order; disposed in reverse
    disposables: Mutex<Vec<Disposable>>,
    closed: AtomicBool,
}

impl Scope {
    /// Begin a new scope on `container`.
    pub fn open(container: &Arc<ServiceContainer>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(scope = %id, "scope opened");
        Self {
            id,
            container: Arc::clone(container),
            instances: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve a service within this scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.container.resolve_in::<T>(Some(self))
    }

    /// Dispose every disposable scoped instance in reverse construction order.
    ///
    /// Safe to call more than once; only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let disposables = std::mem::take(&mut *self.disposables.lock());
        for disposable in disposables.into_iter().rev() {
            tracing::debug!(
                scope = %self.id,
                service = %disposable.key,
                "disposing scoped service"
            );
            (disposable.hook)(&disposable.instance);
        }
        self.instances.lock().clear();
        tracing::debug!(scope = %self.id, "scope closed");
    }

    pub(crate) fn get_or_create<F>(
        &self,
        descriptor: &ServiceDescriptor,
        create: F,
    ) -> Result<AnyService, ContainerError>
    where
        F: FnOnce() -> Result<AnyService, ContainerError>,
    {
        let key = descriptor.key();
        self.ensure_open(key)?;

        // The map lock is released before construction so factories can
        // resolve further scoped dependencies.
        let cell = Arc::clone(self.instances.lock().entry(key).or_default());

        let mut created = false;
        let instance = Arc::clone(cell.get_or_try_init(|| {
            created = true;
            tracing::debug!(scope = %self.id, service = %key, "constructing scoped service");
            create()
        })?);

        if created {
            if let Some(hook) = &descriptor.dispose {
                let mut disposables = self.disposables.lock();
                if self.is_closed() {
                    drop(disposables);
                    hook(&instance);
                    return Err(self.disposed_error(key));
                }
                disposables.push(Disposable {
                    key,
                    instance: Arc::clone(&instance),
                    hook: Arc::clone(hook),
                });
            }
        }

        Ok(instance)
    }

    fn ensure_open(&self, key: ServiceKey) -> Result<(), ContainerError> {
        if self.is_closed() {
            Err(self.disposed_error(key))
        } else {
            Ok(())
        }
    }

    fn disposed_error(&self, key: ServiceKey) -> ContainerError {
        LifetimeViolationError::ScopeDisposed {
            scope_id: self.id,
            key,
        }
        .into()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ServiceDescriptor;

    struct Connection {
        name: &'static str,
    }

    struct Repository {
        _connection: Arc<Connection>,
    }

    fn recording_container(log: Arc<Mutex<Vec<&'static str>>>) -> Arc<ServiceContainer> {
        let container = Arc::new(ServiceContainer::new());
        let connection_log = Arc::clone(&log);
        container
            .register(
                ServiceDescriptor::scoped(|_| Ok(Arc::new(Connection { name: "connection" })))
                    .on_dispose(move |c: &Arc<Connection>| connection_log.lock().push(c.name)),
            )
            .unwrap();
        let repository_log = Arc::clone(&log);
        container
            .register(
                ServiceDescriptor::scoped(|r| {
                    Ok(Arc::new(Repository {
                        _connection: r.resolve::<Connection>()?,
                    }))
                })
                .on_dispose(move |_: &Arc<Repository>| repository_log.lock().push("repository")),
            )
            .unwrap();
        container
    }

    #[test]
    fn test_close_disposes_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = recording_container(Arc::clone(&log));

        let scope = Scope::open(&container);
        scope.resolve::<Repository>().unwrap();
        scope.close();

        assert_eq!(*log.lock(), vec!["repository", "connection"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = recording_container(Arc::clone(&log));

        let scope = Scope::open(&container);
        scope.resolve::<Connection>().unwrap();
        scope.close();
        scope.close();
        drop(scope);

        assert_eq!(*log.lock(), vec!["connection"]);
    }

    #[test]
    fn test_drop_closes_scope() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = recording_container(Arc::clone(&log));

        let result: Result<(), &str> = (|| {
            let scope = Scope::open(&container);
            scope.resolve::<Connection>().map_err(|_| "resolve")?;
            Err("operation failed")
        })();

        assert!(result.is_err());
        assert_eq!(*log.lock(), vec!["connection"]);
    }

    #[test]
    fn test_resolve_after_close_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = recording_container(log);

        let scope = Scope::open(&container);
        scope.close();
        assert!(matches!(
            scope.resolve::<Connection>(),
            Err(ContainerError::LifetimeViolation(LifetimeViolationError::ScopeDisposed { .. }))
        ));
    }

    #[test]
    fn test_unused_services_are_not_disposed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = recording_container(Arc::clone(&log));

        Scope::open(&container).close();
        assert!(log.lock().is_empty());
    }
}
