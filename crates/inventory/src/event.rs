//! Events emitted by a stock ledger entry, one per state transition.
//!
//! Quantity and reservation events carry `before`/`after` counter snapshots
//! so observers never have to reload the entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    LedgerEntryId, OrderId, ProductId, ReservationId, SupplierId, VariantId, WarehouseId,
};
use stockledger_events::Event;

use crate::metadata::{MetadataValue, Patch};
use crate::movement::Movement;
use crate::reservation::Reservation;
use crate::status::{LifecycleStatus, StockLevels, Thresholds};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCreated {
    pub entry_id: LedgerEntryId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub thresholds: Thresholds,
    pub unit_cost: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Physical quantity change (added, removed or adjusted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub entry_id: LedgerEntryId,
    pub movement: Movement,
    pub before: StockLevels,
    pub after: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub entry_id: LedgerEntryId,
    pub reservation: Reservation,
    pub before: StockLevels,
    pub after: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Stock removal and reservation closure as a single fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFulfilled {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub movement: Movement,
    pub before: StockLevels,
    pub after: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Hold returned to availability (released, expired or cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationClosed {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub reason: Option<String>,
    pub before: StockLevels,
    pub after: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationExtended {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub previous_expires_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdsChanged {
    pub entry_id: LedgerEntryId,
    pub previous: Thresholds,
    pub thresholds: Thresholds,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStatusChanged {
    pub entry_id: LedgerEntryId,
    pub previous: LifecycleStatus,
    pub status: LifecycleStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCostChanged {
    pub entry_id: LedgerEntryId,
    pub previous: Option<u64>,
    pub unit_cost: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationChanged {
    pub entry_id: LedgerEntryId,
    pub warehouse_id: Patch<WarehouseId>,
    pub location: Patch<String>,
    pub bin: Patch<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierInfoChanged {
    pub entry_id: LedgerEntryId,
    pub supplier_id: Patch<SupplierId>,
    pub supplier_sku: Patch<String>,
    pub lead_time_days: Patch<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesChanged {
    pub entry_id: LedgerEntryId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataChanged {
    pub entry_id: LedgerEntryId,
    pub key: String,
    pub value: Option<MetadataValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryEvent {
    EntryCreated(EntryCreated),
    StockAdded(StockMoved),
    StockRemoved(StockMoved),
    StockAdjusted(StockMoved),
    StockReserved(StockReserved),
    ReservationFulfilled(ReservationFulfilled),
    ReservationReleased(ReservationClosed),
    ReservationExpired(ReservationClosed),
    ReservationCancelled(ReservationClosed),
    ReservationExtended(ReservationExtended),
    ThresholdsChanged(ThresholdsChanged),
    LifecycleStatusChanged(LifecycleStatusChanged),
    UnitCostChanged(UnitCostChanged),
    LocationChanged(LocationChanged),
    SupplierInfoChanged(SupplierInfoChanged),
    NotesChanged(NotesChanged),
    MetadataChanged(MetadataChanged),
}

impl InventoryEvent {
    pub fn entry_id(&self) -> LedgerEntryId {
        match self {
            InventoryEvent::EntryCreated(e) => e.entry_id,
            InventoryEvent::StockAdded(e)
            | InventoryEvent::StockRemoved(e)
            | InventoryEvent::StockAdjusted(e) => e.entry_id,
            InventoryEvent::StockReserved(e) => e.entry_id,
            InventoryEvent::ReservationFulfilled(e) => e.entry_id,
            InventoryEvent::ReservationReleased(e)
            | InventoryEvent::ReservationExpired(e)
            | InventoryEvent::ReservationCancelled(e) => e.entry_id,
            InventoryEvent::ReservationExtended(e) => e.entry_id,
            InventoryEvent::ThresholdsChanged(e) => e.entry_id,
            InventoryEvent::LifecycleStatusChanged(e) => e.entry_id,
            InventoryEvent::UnitCostChanged(e) => e.entry_id,
            InventoryEvent::LocationChanged(e) => e.entry_id,
            InventoryEvent::SupplierInfoChanged(e) => e.entry_id,
            InventoryEvent::NotesChanged(e) => e.entry_id,
            InventoryEvent::MetadataChanged(e) => e.entry_id,
        }
    }

    /// `(before, after)` counters for quantity and reservation transitions.
    pub fn levels(&self) -> Option<(StockLevels, StockLevels)> {
        match self {
            InventoryEvent::StockAdded(e)
            | InventoryEvent::StockRemoved(e)
            | InventoryEvent::StockAdjusted(e) => Some((e.before, e.after)),
            InventoryEvent::StockReserved(e) => Some((e.before, e.after)),
            InventoryEvent::ReservationFulfilled(e) => Some((e.before, e.after)),
            InventoryEvent::ReservationReleased(e)
            | InventoryEvent::ReservationExpired(e)
            | InventoryEvent::ReservationCancelled(e) => Some((e.before, e.after)),
            _ => None,
        }
    }

    /// The movement this event appends to the log, if any.
    pub fn movement(&self) -> Option<&Movement> {
        match self {
            InventoryEvent::StockAdded(e)
            | InventoryEvent::StockRemoved(e)
            | InventoryEvent::StockAdjusted(e) => Some(&e.movement),
            InventoryEvent::ReservationFulfilled(e) => Some(&e.movement),
            _ => None,
        }
    }

    /// Reservation touched by this event, if any.
    pub fn reservation_id(&self) -> Option<ReservationId> {
        use stockledger_core::Entity;

        match self {
            InventoryEvent::StockReserved(e) => Some(*e.reservation.id()),
            InventoryEvent::ReservationFulfilled(e) => Some(e.reservation_id),
            InventoryEvent::ReservationReleased(e)
            | InventoryEvent::ReservationExpired(e)
            | InventoryEvent::ReservationCancelled(e) => Some(e.reservation_id),
            InventoryEvent::ReservationExtended(e) => Some(e.reservation_id),
            _ => None,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::EntryCreated(_) => "inventory.entry.created",
            InventoryEvent::StockAdded(_) => "inventory.stock.added",
            InventoryEvent::StockRemoved(_) => "inventory.stock.removed",
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            InventoryEvent::StockReserved(_) => "inventory.reservation.reserved",
            InventoryEvent::ReservationFulfilled(_) => "inventory.reservation.fulfilled",
            InventoryEvent::ReservationReleased(_) => "inventory.reservation.released",
            InventoryEvent::ReservationExpired(_) => "inventory.reservation.expired",
            InventoryEvent::ReservationCancelled(_) => "inventory.reservation.cancelled",
            InventoryEvent::ReservationExtended(_) => "inventory.reservation.extended",
            InventoryEvent::ThresholdsChanged(_) => "inventory.entry.thresholds_changed",
            InventoryEvent::LifecycleStatusChanged(_) => "inventory.entry.lifecycle_changed",
            InventoryEvent::UnitCostChanged(_) => "inventory.entry.unit_cost_changed",
            InventoryEvent::LocationChanged(_) => "inventory.entry.location_changed",
            InventoryEvent::SupplierInfoChanged(_) => "inventory.entry.supplier_changed",
            InventoryEvent::NotesChanged(_) => "inventory.entry.notes_changed",
            InventoryEvent::MetadataChanged(_) => "inventory.entry.metadata_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::EntryCreated(e) => e.occurred_at,
            InventoryEvent::StockAdded(e)
            | InventoryEvent::StockRemoved(e)
            | InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::StockReserved(e) => e.occurred_at,
            InventoryEvent::ReservationFulfilled(e) => e.occurred_at,
            InventoryEvent::ReservationReleased(e)
            | InventoryEvent::ReservationExpired(e)
            | InventoryEvent::ReservationCancelled(e) => e.occurred_at,
            InventoryEvent::ReservationExtended(e) => e.occurred_at,
            InventoryEvent::ThresholdsChanged(e) => e.occurred_at,
            InventoryEvent::LifecycleStatusChanged(e) => e.occurred_at,
            InventoryEvent::UnitCostChanged(e) => e.occurred_at,
            InventoryEvent::LocationChanged(e) => e.occurred_at,
            InventoryEvent::SupplierInfoChanged(e) => e.occurred_at,
            InventoryEvent::NotesChanged(e) => e.occurred_at,
            InventoryEvent::MetadataChanged(e) => e.occurred_at,
        }
    }
}
