//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{InventoryError, InventoryResult};
pub use id::{
    EventId, LedgerEntryId, MovementId, OrderId, ProductId, ReservationId, SupplierId, VariantId,
    WarehouseId,
};
pub use value_object::ValueObject;
