//! Infrastructure layer - persistence session, unit of work and event bus.

mod event_bus;
mod memory;
mod session;
mod unit_of_work;

pub use event_bus::{EventBus, EventHandler};
pub use memory::InMemorySession;
pub use session::{EventCollector, Repository, Session, SessionHandle, TxHandle};
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};

#[cfg(any(test, feature = "test-utils"))]
pub use session::MockSession;
