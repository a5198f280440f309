//! Stock ledger domain (event-driven aggregate).
//!
//! This crate contains the business rules for one SKU's stock: counters,
//! reservations and the movement history. It is deterministic domain logic
//! only (no IO, no locking, no storage); `stockledger-infra` supplies those.

pub mod command;
pub mod event;
pub mod ledger;
pub mod metadata;
pub mod movement;
pub mod reservation;
pub mod status;

pub use command::{
    AddStock, AdjustStock, CancelReservation, CreateEntry, ExpireReservation, ExtendReservation,
    FulfillReservation, InventoryCommand, ReleaseReservation, RemoveStock, Reserve,
    SetLifecycleStatus, SetLocation, SetMetadata, SetNotes, SetSupplierInfo, SetThresholds,
    SetUnitCost, StockChange,
};
pub use event::{
    EntryCreated, InventoryEvent, LifecycleStatusChanged, LocationChanged, MetadataChanged,
    NotesChanged, ReservationClosed, ReservationExtended, ReservationFulfilled, StockMoved,
    StockReserved, SupplierInfoChanged, ThresholdsChanged, UnitCostChanged,
};
pub use ledger::StockLedgerEntry;
pub use metadata::{Metadata, MetadataValue, Patch};
pub use movement::{Movement, MovementLog, MovementType};
pub use reservation::{Reservation, ReservationStatus};
pub use status::{LifecycleStatus, StockLevels, StockStatus, Thresholds};
