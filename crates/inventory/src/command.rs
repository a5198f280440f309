//! Commands accepted by a stock ledger entry.
//!
//! Every command carries the ids it will mint (movement, reservation) and its
//! business time, so `handle` stays deterministic. The `InventoryCommand`
//! constructors fill those in for callers that don't care.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    LedgerEntryId, MovementId, OrderId, ProductId, ReservationId, SupplierId, VariantId,
    WarehouseId,
};

use crate::metadata::{MetadataValue, Patch};
use crate::movement::MovementType;
use crate::status::{LifecycleStatus, Thresholds};

/// Description of a physical stock change (restock, sale, write-off, return).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub quantity: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub order_id: Option<OrderId>,
    pub supplier_id: Option<SupplierId>,
    pub unit_cost: Option<u64>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub actor: Option<String>,
    /// Overrides the default `Inbound`/`Outbound` type; must point the same way.
    pub movement_type: Option<MovementType>,
}

impl StockChange {
    pub fn new(quantity: i64, reason: impl Into<String>) -> Self {
        Self {
            quantity,
            reason: reason.into(),
            reference: None,
            order_id: None,
            supplier_id: None,
            unit_cost: None,
            from_location: None,
            to_location: None,
            actor: None,
            movement_type: None,
        }
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn supplier(mut self, supplier_id: SupplierId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn unit_cost(mut self, unit_cost: u64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn locations(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_location = Some(from.into());
        self.to_location = Some(to.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn as_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    pub entry_id: LedgerEntryId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub initial_quantity: i64,
    /// `None` inherits the defaults.
    pub thresholds: Option<Thresholds>,
    pub unit_cost: Option<u64>,
    pub initial_movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStock {
    pub entry_id: LedgerEntryId,
    pub movement_id: MovementId,
    pub change: StockChange,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveStock {
    pub entry_id: LedgerEntryId,
    pub movement_id: MovementId,
    pub change: StockChange,
    pub occurred_at: DateTime<Utc>,
}

/// Physical-count correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub entry_id: LedgerEntryId,
    pub movement_id: MovementId,
    pub new_quantity: i64,
    pub reason: String,
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub order_id: OrderId,
    pub quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub movement_id: MovementId,
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetThresholds {
    pub entry_id: LedgerEntryId,
    pub low_stock: i64,
    pub reorder_point: i64,
    pub max_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLifecycleStatus {
    pub entry_id: LedgerEntryId,
    pub status: LifecycleStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUnitCost {
    pub entry_id: LedgerEntryId,
    pub unit_cost: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLocation {
    pub entry_id: LedgerEntryId,
    pub warehouse_id: Patch<WarehouseId>,
    pub location: Patch<String>,
    pub bin: Patch<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSupplierInfo {
    pub entry_id: LedgerEntryId,
    pub supplier_id: Patch<SupplierId>,
    pub supplier_sku: Patch<String>,
    pub lead_time_days: Patch<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNotes {
    pub entry_id: LedgerEntryId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Set (`Some`) or remove (`None`) one metadata attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMetadata {
    pub entry_id: LedgerEntryId,
    pub key: String,
    pub value: Option<MetadataValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateEntry(CreateEntry),
    AddStock(AddStock),
    RemoveStock(RemoveStock),
    AdjustStock(AdjustStock),
    Reserve(Reserve),
    ReleaseReservation(ReleaseReservation),
    FulfillReservation(FulfillReservation),
    ExpireReservation(ExpireReservation),
    CancelReservation(CancelReservation),
    ExtendReservation(ExtendReservation),
    SetThresholds(SetThresholds),
    SetLifecycleStatus(SetLifecycleStatus),
    SetUnitCost(SetUnitCost),
    SetLocation(SetLocation),
    SetSupplierInfo(SetSupplierInfo),
    SetNotes(SetNotes),
    SetMetadata(SetMetadata),
}

impl InventoryCommand {
    pub fn add_stock(entry_id: LedgerEntryId, change: StockChange, at: DateTime<Utc>) -> Self {
        Self::AddStock(AddStock {
            entry_id,
            movement_id: MovementId::new(),
            change,
            occurred_at: at,
        })
    }

    pub fn remove_stock(entry_id: LedgerEntryId, change: StockChange, at: DateTime<Utc>) -> Self {
        Self::RemoveStock(RemoveStock {
            entry_id,
            movement_id: MovementId::new(),
            change,
            occurred_at: at,
        })
    }

    pub fn adjust_stock(
        entry_id: LedgerEntryId,
        new_quantity: i64,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::AdjustStock(AdjustStock {
            entry_id,
            movement_id: MovementId::new(),
            new_quantity,
            reason: reason.into(),
            actor: None,
            occurred_at: at,
        })
    }

    pub fn reserve(
        entry_id: LedgerEntryId,
        reservation_id: ReservationId,
        order_id: OrderId,
        quantity: i64,
        expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::Reserve(Reserve {
            entry_id,
            reservation_id,
            order_id,
            quantity,
            expires_at,
            actor: None,
            occurred_at: at,
        })
    }

    pub fn release(
        entry_id: LedgerEntryId,
        reservation_id: ReservationId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::ReleaseReservation(ReleaseReservation {
            entry_id,
            reservation_id,
            reason,
            occurred_at: at,
        })
    }

    pub fn fulfill(entry_id: LedgerEntryId, reservation_id: ReservationId, at: DateTime<Utc>) -> Self {
        Self::FulfillReservation(FulfillReservation {
            entry_id,
            reservation_id,
            movement_id: MovementId::new(),
            actor: None,
            occurred_at: at,
        })
    }

    pub fn expire(entry_id: LedgerEntryId, reservation_id: ReservationId, at: DateTime<Utc>) -> Self {
        Self::ExpireReservation(ExpireReservation {
            entry_id,
            reservation_id,
            occurred_at: at,
        })
    }

    pub fn cancel(
        entry_id: LedgerEntryId,
        reservation_id: ReservationId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::CancelReservation(CancelReservation {
            entry_id,
            reservation_id,
            reason,
            occurred_at: at,
        })
    }

    pub fn entry_id(&self) -> LedgerEntryId {
        match self {
            InventoryCommand::CreateEntry(c) => c.entry_id,
            InventoryCommand::AddStock(c) => c.entry_id,
            InventoryCommand::RemoveStock(c) => c.entry_id,
            InventoryCommand::AdjustStock(c) => c.entry_id,
            InventoryCommand::Reserve(c) => c.entry_id,
            InventoryCommand::ReleaseReservation(c) => c.entry_id,
            InventoryCommand::FulfillReservation(c) => c.entry_id,
            InventoryCommand::ExpireReservation(c) => c.entry_id,
            InventoryCommand::CancelReservation(c) => c.entry_id,
            InventoryCommand::ExtendReservation(c) => c.entry_id,
            InventoryCommand::SetThresholds(c) => c.entry_id,
            InventoryCommand::SetLifecycleStatus(c) => c.entry_id,
            InventoryCommand::SetUnitCost(c) => c.entry_id,
            InventoryCommand::SetLocation(c) => c.entry_id,
            InventoryCommand::SetSupplierInfo(c) => c.entry_id,
            InventoryCommand::SetNotes(c) => c.entry_id,
            InventoryCommand::SetMetadata(c) => c.entry_id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            InventoryCommand::CreateEntry(_) => "create_entry",
            InventoryCommand::AddStock(_) => "add_stock",
            InventoryCommand::RemoveStock(_) => "remove_stock",
            InventoryCommand::AdjustStock(_) => "adjust_stock",
            InventoryCommand::Reserve(_) => "reserve",
            InventoryCommand::ReleaseReservation(_) => "release",
            InventoryCommand::FulfillReservation(_) => "fulfill",
            InventoryCommand::ExpireReservation(_) => "expire",
            InventoryCommand::CancelReservation(_) => "cancel",
            InventoryCommand::ExtendReservation(_) => "extend_reservation",
            InventoryCommand::SetThresholds(_) => "set_thresholds",
            InventoryCommand::SetLifecycleStatus(_) => "set_lifecycle_status",
            InventoryCommand::SetUnitCost(_) => "set_unit_cost",
            InventoryCommand::SetLocation(_) => "set_location",
            InventoryCommand::SetSupplierInfo(_) => "set_supplier_info",
            InventoryCommand::SetNotes(_) => "set_notes",
            InventoryCommand::SetMetadata(_) => "set_metadata",
        }
    }
}
