//! Infrastructure layer: the inventory control component, the ledger store
//! boundary, the expiry sweeper, configuration and process wiring.

pub mod config;
pub mod control;
pub mod service;
pub mod store;
pub mod sweeper;

pub use config::{ConfigError, InventoryConfig, ThresholdsConfig};
pub use control::{
    AGGREGATE_TYPE, ControlError, ControlSettings, InventoryControl, NewEntry, SweepReport,
};
pub use service::{InventoryService, LedgerBus, LocalInventoryControl, ServiceError};
pub use store::{InMemoryLedgerStore, LedgerStore, OverdueReservation, StoreError};
pub use sweeper::{ExpirySweeper, ExpirySweeperConfig, ExpirySweeperHandle, SweeperStats};
