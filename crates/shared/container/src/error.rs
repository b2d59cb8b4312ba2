//! Container errors.
//!
//! Two families, mirroring how they are handled by callers:
//! - [`ConfigurationError`]: the registry itself is wrong (fatal at startup)
//! - [`LifetimeViolationError`]: a lifetime rule was broken at resolution time

use thiserror::Error;
use uuid::Uuid;

use crate::key::ServiceKey;

/// Boxed source error produced by a failing factory
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("no service registered for `{key}`")]
    Unregistered { key: ServiceKey },

    #[error("`{key}` has already been resolved and cannot be re-registered")]
    AlreadyResolved { key: ServiceKey },

    #[error("container is sealed; cannot register `{key}`")]
    Sealed { key: ServiceKey },

    #[error("failed to construct `{key}`: {source}")]
    FactoryFailed {
        key: ServiceKey,
        #[source]
        source: BoxError,
    },

    #[error("circular dependency detected: {}", format_chain(.chain))]
    CircularDependency { chain: Vec<ServiceKey> },

    #[error("`{key}` produced an instance of an unexpected type")]
    TypeMismatch { key: ServiceKey },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifetimeViolationError {
    #[error("scoped service `{key}` cannot be resolved without an active scope")]
    MissingScope { key: ServiceKey },

    #[error("scope {scope_id} has been disposed; cannot resolve `{key}`")]
    ScopeDisposed { scope_id: Uuid, key: ServiceKey },
}

/// Any failure surfaced by [`crate::ServiceContainer`] or [`crate::Scope`].
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    LifetimeViolation(#[from] LifetimeViolationError),
}

impl ContainerError {
    /// Wrap an arbitrary failure raised while building `T`.
    pub fn factory_failed<T: ?Sized + 'static>(source: impl Into<BoxError>) -> Self {
        ConfigurationError::FactoryFailed {
            key: ServiceKey::of::<T>(),
            source: source.into(),
        }
        .into()
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ContainerError::Configuration(_))
    }

    pub fn is_lifetime_violation(&self) -> bool {
        matches!(self, ContainerError::LifetimeViolation(_))
    }
}

fn format_chain(chain: &[ServiceKey]) -> String {
    chain
        .iter()
        .map(|key| key.type_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}
