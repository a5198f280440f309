//! Event plumbing for the inventory core: the event trait, envelopes and
//! the pub/sub bus used to hand state transitions to observers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::InMemoryEventBus;
