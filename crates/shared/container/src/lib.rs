//! Dependency injection container with explicit lifetimes.
//!
//! - [`ServiceContainer`]: type-keyed registry of factories and lifetimes
//! - [`Scope`]: one per logical operation; owns and disposes scoped instances
//! - [`Resolver`]: handed to factories so nested resolutions share the scope
//!
//! ```ignore
//! let container = Arc::new(ServiceContainer::new());
//! container.register_singleton::<dyn Clock, _>(|_| Ok(Arc::new(SystemClock)))?;
//! container.register_scoped(|r| Ok(Arc::new(Checkout::new(r.resolve::<dyn Clock>()?))))?;
//!
//! let scope = Scope::open(&container);
//! let checkout = scope.resolve::<Checkout>()?;
//! ```

mod container;
mod descriptor;
mod error;
mod key;
mod scope;

pub use container::{Resolver, ServiceContainer, VerificationReport};
pub use descriptor::{Registration, ServiceDescriptor};
pub use error::{BoxError, ConfigurationError, ContainerError, LifetimeViolationError};
pub use key::{Lifetime, ServiceKey};
pub use scope::Scope;
