use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, Entity, InventoryError, InventoryResult, LedgerEntryId, MovementId,
    ProductId, ReservationId, SupplierId, VariantId, WarehouseId,
};

use crate::command::{
    AddStock, AdjustStock, CancelReservation, CreateEntry, ExpireReservation, ExtendReservation,
    FulfillReservation, InventoryCommand, ReleaseReservation, RemoveStock, Reserve, SetLifecycleStatus,
    SetLocation, SetMetadata, SetNotes, SetSupplierInfo, SetThresholds, SetUnitCost, StockChange,
};
use crate::event::{
    EntryCreated, InventoryEvent, LifecycleStatusChanged, LocationChanged, MetadataChanged,
    NotesChanged, ReservationClosed, ReservationExtended, ReservationFulfilled, StockMoved,
    StockReserved, SupplierInfoChanged, ThresholdsChanged, UnitCostChanged,
};
use crate::metadata::Metadata;
use crate::movement::{Movement, MovementLog, MovementType};
use crate::reservation::{Reservation, ReservationStatus};
use crate::status::{LifecycleStatus, StockLevels, StockStatus, Thresholds};

/// Aggregate root: the stock ledger entry of one SKU.
///
/// Counters obey `0 <= reserved <= quantity` and `available = quantity - reserved`;
/// `reserved` always equals the summed quantity of active reservations.
/// `stock_status` and `total_value` are recomputed after every applied event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    id: LedgerEntryId,
    product_id: Option<ProductId>,
    variant_id: Option<VariantId>,
    sku: String,

    quantity: i64,
    reserved: i64,
    available: i64,

    thresholds: Thresholds,
    lifecycle_status: LifecycleStatus,
    stock_status: StockStatus,

    unit_cost: Option<u64>,
    total_value: u64,

    warehouse_id: Option<WarehouseId>,
    location: Option<String>,
    bin: Option<String>,
    supplier_id: Option<SupplierId>,
    supplier_sku: Option<String>,
    lead_time_days: Option<u32>,
    notes: Option<String>,
    metadata: Metadata,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_restocked_at: Option<DateTime<Utc>>,
    last_sold_at: Option<DateTime<Utc>>,
    last_counted_at: Option<DateTime<Utc>>,

    movements: MovementLog,
    reservations: Vec<Reservation>,

    version: u64,
    created: bool,
}

impl StockLedgerEntry {
    /// Create an empty, not-yet-created entry; `CreateEntry` brings it to life.
    pub fn empty(id: LedgerEntryId) -> Self {
        Self {
            id,
            product_id: None,
            variant_id: None,
            sku: String::new(),
            quantity: 0,
            reserved: 0,
            available: 0,
            thresholds: Thresholds::default(),
            lifecycle_status: LifecycleStatus::Active,
            stock_status: StockStatus::OutOfStock,
            unit_cost: None,
            total_value: 0,
            warehouse_id: None,
            location: None,
            bin: None,
            supplier_id: None,
            supplier_sku: None,
            lead_time_days: None,
            notes: None,
            metadata: Metadata::new(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            last_restocked_at: None,
            last_sold_at: None,
            last_counted_at: None,
            movements: MovementLog::default(),
            reservations: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerEntryId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// `None` only before `CreateEntry` was applied.
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn variant_id(&self) -> Option<VariantId> {
        self.variant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels::new(self.quantity, self.reserved)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        self.lifecycle_status
    }

    pub fn stock_status(&self) -> StockStatus {
        self.stock_status
    }

    pub fn unit_cost(&self) -> Option<u64> {
        self.unit_cost
    }

    pub fn total_value(&self) -> u64 {
        self.total_value
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn bin(&self) -> Option<&str> {
        self.bin.as_deref()
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn supplier_sku(&self) -> Option<&str> {
        self.supplier_sku.as_deref()
    }

    pub fn lead_time_days(&self) -> Option<u32> {
        self.lead_time_days
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_restocked_at(&self) -> Option<DateTime<Utc>> {
        self.last_restocked_at
    }

    pub fn last_sold_at(&self) -> Option<DateTime<Utc>> {
        self.last_sold_at
    }

    pub fn last_counted_at(&self) -> Option<DateTime<Utc>> {
        self.last_counted_at
    }

    pub fn movements(&self) -> &MovementLog {
        &self.movements
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn reservation(&self, reservation_id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| *r.id() == reservation_id)
    }

    pub fn active_reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }

    /// Active reservations whose deadline has passed (candidates for `Expire`).
    pub fn overdue_reservations(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Reservation> {
        self.active_reservations().filter(move |r| r.is_expired(now))
    }

    pub fn needs_reorder(&self) -> bool {
        self.available <= self.thresholds.reorder_point()
    }

    pub fn is_overstocked(&self) -> bool {
        self.quantity > self.thresholds.max_stock()
    }

    pub fn can_fulfill(&self, quantity: i64) -> bool {
        self.available >= quantity && self.lifecycle_status.is_active()
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock_status == StockStatus::InStock
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_status == StockStatus::LowStock
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock_status == StockStatus::OutOfStock
    }

    pub fn has_variant(&self) -> bool {
        self.variant_id.is_some()
    }

    pub fn has_location(&self) -> bool {
        self.location.as_deref().is_some_and(|l| !l.is_empty())
    }

    pub fn has_supplier(&self) -> bool {
        self.supplier_id.is_some()
    }

    /// Whole days since the last sale (or since creation if never sold).
    pub fn days_without_sale(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_sold_at.unwrap_or(self.created_at)).num_days()
    }

    /// Whole days since the last restock (or since creation if never restocked).
    pub fn days_since_restock(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_restocked_at.unwrap_or(self.created_at)).num_days()
    }

    /// Check every counter invariant; returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.quantity < 0 {
            return Err(format!("quantity is negative ({})", self.quantity));
        }
        if self.reserved < 0 {
            return Err(format!("reserved is negative ({})", self.reserved));
        }
        if self.reserved > self.quantity {
            return Err(format!(
                "reserved ({}) exceeds quantity ({})",
                self.reserved, self.quantity
            ));
        }
        if self.available != self.quantity - self.reserved {
            return Err(format!(
                "available ({}) != quantity ({}) - reserved ({})",
                self.available, self.quantity, self.reserved
            ));
        }
        let held: i64 = self.active_reservations().map(|r| r.quantity()).sum();
        if held != self.reserved {
            return Err(format!(
                "reserved ({}) != sum of active reservations ({held})",
                self.reserved
            ));
        }
        let derived = StockStatus::derive(
            self.lifecycle_status,
            self.available,
            self.thresholds.low_stock(),
        );
        if derived != self.stock_status {
            return Err(format!(
                "stock status {} does not match derived {derived}",
                self.stock_status
            ));
        }
        if let Some(bad) = self.movements.iter().find(|m| !m.is_consistent()) {
            return Err(format!("movement {} is inconsistent", bad.id()));
        }
        Ok(())
    }

    fn recompute(&mut self) {
        self.available = self.quantity - self.reserved;
        self.stock_status = StockStatus::derive(
            self.lifecycle_status,
            self.available,
            self.thresholds.low_stock(),
        );
        self.total_value = self
            .unit_cost
            .map(|cost| cost.saturating_mul(self.quantity.max(0) as u64))
            .unwrap_or(0);
    }

    fn close_reservation(&mut self, closed: &ReservationClosed, to: ReservationStatus) {
        self.reserved -= closed.quantity;
        if let Some(r) = self
            .reservations
            .iter_mut()
            .find(|r| *r.id() == closed.reservation_id)
        {
            r.close(to, closed.occurred_at, closed.reason.clone());
        }
    }
}

impl AggregateRoot for StockLedgerEntry {
    type Id = LedgerEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for StockLedgerEntry {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = InventoryError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::EntryCreated(e) => {
                self.id = e.entry_id;
                self.product_id = Some(e.product_id);
                self.variant_id = e.variant_id;
                self.sku = e.sku.clone();
                self.thresholds = e.thresholds;
                self.unit_cost = e.unit_cost;
                self.lifecycle_status = LifecycleStatus::Active;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            InventoryEvent::StockAdded(e) => {
                self.quantity = e.movement.new_qty();
                self.last_restocked_at = Some(e.occurred_at);
                self.movements.append(e.movement.clone());
            }
            InventoryEvent::StockRemoved(e) => {
                self.quantity = e.movement.new_qty();
                self.last_sold_at = Some(e.occurred_at);
                self.movements.append(e.movement.clone());
            }
            InventoryEvent::StockAdjusted(e) => {
                self.quantity = e.movement.new_qty();
                self.last_counted_at = Some(e.occurred_at);
                self.movements.append(e.movement.clone());
            }
            InventoryEvent::StockReserved(e) => {
                self.reserved += e.reservation.quantity();
                self.reservations.push(e.reservation.clone());
            }
            InventoryEvent::ReservationFulfilled(e) => {
                // Stock removal, hold release and closure land together.
                self.quantity = e.movement.new_qty();
                self.reserved -= e.quantity;
                if let Some(r) = self
                    .reservations
                    .iter_mut()
                    .find(|r| *r.id() == e.reservation_id)
                {
                    r.close(ReservationStatus::Fulfilled, e.occurred_at, None);
                }
                self.last_sold_at = Some(e.occurred_at);
                self.movements.append(e.movement.clone());
            }
            InventoryEvent::ReservationReleased(e) => {
                self.close_reservation(e, ReservationStatus::Released);
            }
            InventoryEvent::ReservationExpired(e) => {
                self.close_reservation(e, ReservationStatus::Expired);
            }
            InventoryEvent::ReservationCancelled(e) => {
                self.close_reservation(e, ReservationStatus::Cancelled);
            }
            InventoryEvent::ReservationExtended(e) => {
                if let Some(r) = self
                    .reservations
                    .iter_mut()
                    .find(|r| *r.id() == e.reservation_id)
                {
                    r.extend(e.expires_at, e.occurred_at);
                }
            }
            InventoryEvent::ThresholdsChanged(e) => {
                self.thresholds = e.thresholds;
            }
            InventoryEvent::LifecycleStatusChanged(e) => {
                self.lifecycle_status = e.status;
            }
            InventoryEvent::UnitCostChanged(e) => {
                self.unit_cost = e.unit_cost;
            }
            InventoryEvent::LocationChanged(e) => {
                e.warehouse_id.apply_to(&mut self.warehouse_id);
                e.location.apply_to(&mut self.location);
                e.bin.apply_to(&mut self.bin);
            }
            InventoryEvent::SupplierInfoChanged(e) => {
                e.supplier_id.apply_to(&mut self.supplier_id);
                e.supplier_sku.apply_to(&mut self.supplier_sku);
                e.lead_time_days.apply_to(&mut self.lead_time_days);
            }
            InventoryEvent::NotesChanged(e) => {
                self.notes = e.notes.clone();
            }
            InventoryEvent::MetadataChanged(e) => match &e.value {
                Some(value) => {
                    self.metadata.insert(e.key.clone(), value.clone());
                }
                None => {
                    self.metadata.remove(&e.key);
                }
            },
        }

        self.updated_at = stockledger_events::Event::occurred_at(event);
        self.recompute();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateEntry(cmd) => self.handle_create(cmd),
            InventoryCommand::AddStock(cmd) => self.handle_add(cmd),
            InventoryCommand::RemoveStock(cmd) => self.handle_remove(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::Reserve(cmd) => self.handle_reserve(cmd),
            InventoryCommand::ReleaseReservation(cmd) => self.handle_release(cmd),
            InventoryCommand::FulfillReservation(cmd) => self.handle_fulfill(cmd),
            InventoryCommand::ExpireReservation(cmd) => self.handle_expire(cmd),
            InventoryCommand::CancelReservation(cmd) => self.handle_cancel(cmd),
            InventoryCommand::ExtendReservation(cmd) => self.handle_extend(cmd),
            InventoryCommand::SetThresholds(cmd) => self.handle_thresholds(cmd),
            InventoryCommand::SetLifecycleStatus(cmd) => self.handle_lifecycle(cmd),
            InventoryCommand::SetUnitCost(cmd) => self.handle_unit_cost(cmd),
            InventoryCommand::SetLocation(cmd) => self.handle_location(cmd),
            InventoryCommand::SetSupplierInfo(cmd) => self.handle_supplier(cmd),
            InventoryCommand::SetNotes(cmd) => self.handle_notes(cmd),
            InventoryCommand::SetMetadata(cmd) => self.handle_metadata(cmd),
        }
    }
}

impl StockLedgerEntry {
    fn ensure_created(&self) -> InventoryResult<()> {
        if !self.created {
            return Err(InventoryError::not_found(format!("ledger entry {}", self.id)));
        }
        Ok(())
    }

    fn ensure_entry_id(&self, entry_id: LedgerEntryId) -> InventoryResult<()> {
        if self.id != entry_id {
            return Err(InventoryError::validation(format!(
                "command targets entry {entry_id}, not {}",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_target(&self, entry_id: LedgerEntryId) -> InventoryResult<()> {
        self.ensure_created()?;
        self.ensure_entry_id(entry_id)
    }

    fn find_reservation(&self, reservation_id: ReservationId) -> InventoryResult<&Reservation> {
        self.reservation(reservation_id).ok_or_else(|| {
            InventoryError::not_found(format!(
                "reservation {reservation_id} on ledger entry {}",
                self.id
            ))
        })
    }

    fn stock_movement(
        &self,
        id: MovementId,
        movement_type: MovementType,
        new_qty: i64,
        change: &StockChange,
        at: DateTime<Utc>,
    ) -> Movement {
        Movement::new(
            id,
            self.id,
            movement_type,
            self.quantity,
            new_qty,
            change.reason.clone(),
            at,
        )
        .with_reference(change.reference.clone())
        .with_order(change.order_id)
        .with_supplier(change.supplier_id)
        .with_locations(change.from_location.clone(), change.to_location.clone())
        .with_unit_cost(change.unit_cost.or(self.unit_cost))
        .with_actor(change.actor.clone())
    }

    fn handle_create(&self, cmd: &CreateEntry) -> InventoryResult<Vec<InventoryEvent>> {
        if self.created {
            return Err(InventoryError::conflict(format!(
                "ledger entry {} already exists",
                self.id
            )));
        }
        self.ensure_entry_id(cmd.entry_id)?;

        let sku = cmd.sku.trim();
        if sku.is_empty() {
            return Err(InventoryError::validation("sku cannot be empty"));
        }
        if cmd.initial_quantity < 0 {
            return Err(InventoryError::invalid_quantity(
                "initial quantity cannot be negative",
            ));
        }
        let thresholds = match cmd.thresholds {
            Some(t) => Thresholds::new(t.low_stock(), t.reorder_point(), t.max_stock())?,
            None => Thresholds::default(),
        };

        let mut events = vec![InventoryEvent::EntryCreated(EntryCreated {
            entry_id: cmd.entry_id,
            product_id: cmd.product_id,
            variant_id: cmd.variant_id,
            sku: sku.to_string(),
            thresholds,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })];

        if cmd.initial_quantity > 0 {
            let movement = Movement::new(
                cmd.initial_movement_id,
                cmd.entry_id,
                MovementType::Inbound,
                0,
                cmd.initial_quantity,
                "initial stock",
                cmd.occurred_at,
            )
            .with_unit_cost(cmd.unit_cost);
            events.push(InventoryEvent::StockAdded(StockMoved {
                entry_id: cmd.entry_id,
                movement,
                before: StockLevels::new(0, 0),
                after: StockLevels::new(cmd.initial_quantity, 0),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_add(&self, cmd: &AddStock) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;

        let qty = cmd.change.quantity;
        if qty <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "quantity to add must be positive (got {qty})"
            )));
        }
        if !self.lifecycle_status.is_active() {
            return Err(InventoryError::invalid_state(format!(
                "cannot add stock to a {} ledger entry",
                self.lifecycle_status
            )));
        }
        let movement_type = cmd.change.movement_type.unwrap_or(MovementType::Inbound);
        if !movement_type.is_inbound() {
            return Err(InventoryError::validation(format!(
                "{movement_type} movements cannot add stock"
            )));
        }
        let new_qty = self
            .quantity
            .checked_add(qty)
            .ok_or_else(|| InventoryError::invalid_quantity("quantity overflow"))?;

        let movement =
            self.stock_movement(cmd.movement_id, movement_type, new_qty, &cmd.change, cmd.occurred_at);

        Ok(vec![InventoryEvent::StockAdded(StockMoved {
            entry_id: self.id,
            movement,
            before: self.levels(),
            after: StockLevels::new(new_qty, self.reserved),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveStock) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;

        let qty = cmd.change.quantity;
        if qty <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "quantity to remove must be positive (got {qty})"
            )));
        }
        let movement_type = cmd.change.movement_type.unwrap_or(MovementType::Outbound);
        if !movement_type.is_outbound() {
            return Err(InventoryError::validation(format!(
                "{movement_type} movements cannot remove stock"
            )));
        }
        if qty > self.available {
            return Err(InventoryError::insufficient(qty, self.available));
        }

        let new_qty = self.quantity - qty;
        let movement =
            self.stock_movement(cmd.movement_id, movement_type, new_qty, &cmd.change, cmd.occurred_at);

        Ok(vec![InventoryEvent::StockRemoved(StockMoved {
            entry_id: self.id,
            movement,
            before: self.levels(),
            after: StockLevels::new(new_qty, self.reserved),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;

        if cmd.new_quantity < 0 {
            return Err(InventoryError::invalid_quantity(
                "counted quantity cannot be negative",
            ));
        }
        if cmd.new_quantity < self.reserved {
            return Err(InventoryError::invalid_quantity(format!(
                "counted quantity ({}) cannot be below reserved quantity ({})",
                cmd.new_quantity, self.reserved
            )));
        }

        let movement = Movement::new(
            cmd.movement_id,
            self.id,
            MovementType::Adjustment,
            self.quantity,
            cmd.new_quantity,
            cmd.reason.clone(),
            cmd.occurred_at,
        )
        .with_unit_cost(self.unit_cost)
        .with_actor(cmd.actor.clone());

        Ok(vec![InventoryEvent::StockAdjusted(StockMoved {
            entry_id: self.id,
            movement,
            before: self.levels(),
            after: StockLevels::new(cmd.new_quantity, self.reserved),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &Reserve) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;

        if cmd.quantity <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "quantity to reserve must be positive (got {})",
                cmd.quantity
            )));
        }
        if !self.lifecycle_status.is_active() {
            return Err(InventoryError::invalid_state(format!(
                "cannot reserve stock of a {} ledger entry",
                self.lifecycle_status
            )));
        }
        if cmd.quantity > self.available {
            return Err(InventoryError::insufficient(cmd.quantity, self.available));
        }
        if cmd.expires_at.is_some_and(|deadline| deadline <= cmd.occurred_at) {
            return Err(InventoryError::validation(
                "reservation expiry must be in the future",
            ));
        }
        if self.reservation(cmd.reservation_id).is_some() {
            return Err(InventoryError::conflict(format!(
                "reservation {} already exists",
                cmd.reservation_id
            )));
        }

        let reservation = Reservation::open(
            cmd.reservation_id,
            self.id,
            cmd.order_id,
            cmd.quantity,
            cmd.expires_at,
            cmd.actor.clone(),
            cmd.occurred_at,
        );

        Ok(vec![InventoryEvent::StockReserved(StockReserved {
            entry_id: self.id,
            reservation,
            before: self.levels(),
            after: StockLevels::new(self.quantity, self.reserved + cmd.quantity),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Shared by release/expire/cancel: validates and builds the closing fact.
    fn closing(
        &self,
        entry_id: LedgerEntryId,
        reservation_id: ReservationId,
        to: ReservationStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> InventoryResult<ReservationClosed> {
        self.ensure_target(entry_id)?;
        let reservation = self.find_reservation(reservation_id)?;
        reservation.check_transition(to, at)?;

        Ok(ReservationClosed {
            entry_id: self.id,
            reservation_id,
            order_id: reservation.order_id(),
            quantity: reservation.quantity(),
            reason,
            before: self.levels(),
            after: StockLevels::new(self.quantity, self.reserved - reservation.quantity()),
            occurred_at: at,
        })
    }

    fn handle_release(&self, cmd: &ReleaseReservation) -> InventoryResult<Vec<InventoryEvent>> {
        let closed = self.closing(
            cmd.entry_id,
            cmd.reservation_id,
            ReservationStatus::Released,
            cmd.reason.clone(),
            cmd.occurred_at,
        )?;
        Ok(vec![InventoryEvent::ReservationReleased(closed)])
    }

    fn handle_expire(&self, cmd: &ExpireReservation) -> InventoryResult<Vec<InventoryEvent>> {
        let closed = self.closing(
            cmd.entry_id,
            cmd.reservation_id,
            ReservationStatus::Expired,
            Some("reservation expired".to_string()),
            cmd.occurred_at,
        )?;
        Ok(vec![InventoryEvent::ReservationExpired(closed)])
    }

    fn handle_cancel(&self, cmd: &CancelReservation) -> InventoryResult<Vec<InventoryEvent>> {
        let closed = self.closing(
            cmd.entry_id,
            cmd.reservation_id,
            ReservationStatus::Cancelled,
            cmd.reason.clone(),
            cmd.occurred_at,
        )?;
        Ok(vec![InventoryEvent::ReservationCancelled(closed)])
    }

    fn handle_fulfill(&self, cmd: &FulfillReservation) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        let reservation = self.find_reservation(cmd.reservation_id)?;
        reservation.check_transition(ReservationStatus::Fulfilled, cmd.occurred_at)?;

        let qty = reservation.quantity();
        if qty > self.quantity || qty > self.reserved {
            return Err(InventoryError::insufficient(qty, self.quantity.min(self.reserved)));
        }

        let order_id = reservation.order_id();
        let new_qty = self.quantity - qty;
        let movement = Movement::new(
            cmd.movement_id,
            self.id,
            MovementType::Outbound,
            self.quantity,
            new_qty,
            "fulfillment",
            cmd.occurred_at,
        )
        .with_reference(Some(order_id.to_string()))
        .with_order(Some(order_id))
        .with_unit_cost(self.unit_cost)
        .with_actor(cmd.actor.clone());

        Ok(vec![InventoryEvent::ReservationFulfilled(ReservationFulfilled {
            entry_id: self.id,
            reservation_id: cmd.reservation_id,
            order_id,
            quantity: qty,
            movement,
            before: self.levels(),
            after: StockLevels::new(new_qty, self.reserved - qty),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_extend(&self, cmd: &ExtendReservation) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        let reservation = self.find_reservation(cmd.reservation_id)?;
        reservation.check_extend(cmd.expires_at, cmd.occurred_at)?;

        Ok(vec![InventoryEvent::ReservationExtended(ReservationExtended {
            entry_id: self.id,
            reservation_id: cmd.reservation_id,
            previous_expires_at: reservation.expires_at(),
            expires_at: cmd.expires_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_thresholds(&self, cmd: &SetThresholds) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        let thresholds = Thresholds::new(cmd.low_stock, cmd.reorder_point, cmd.max_stock)?;
        if thresholds == self.thresholds {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::ThresholdsChanged(ThresholdsChanged {
            entry_id: self.id,
            previous: self.thresholds,
            thresholds,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_lifecycle(&self, cmd: &SetLifecycleStatus) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        if cmd.status == self.lifecycle_status {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::LifecycleStatusChanged(LifecycleStatusChanged {
            entry_id: self.id,
            previous: self.lifecycle_status,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unit_cost(&self, cmd: &SetUnitCost) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        if cmd.unit_cost == self.unit_cost {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::UnitCostChanged(UnitCostChanged {
            entry_id: self.id,
            previous: self.unit_cost,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_location(&self, cmd: &SetLocation) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        if cmd.warehouse_id.is_keep() && cmd.location.is_keep() && cmd.bin.is_keep() {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::LocationChanged(LocationChanged {
            entry_id: self.id,
            warehouse_id: cmd.warehouse_id.clone(),
            location: cmd.location.clone(),
            bin: cmd.bin.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_supplier(&self, cmd: &SetSupplierInfo) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        if cmd.supplier_id.is_keep() && cmd.supplier_sku.is_keep() && cmd.lead_time_days.is_keep() {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::SupplierInfoChanged(SupplierInfoChanged {
            entry_id: self.id,
            supplier_id: cmd.supplier_id.clone(),
            supplier_sku: cmd.supplier_sku.clone(),
            lead_time_days: cmd.lead_time_days.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_notes(&self, cmd: &SetNotes) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;
        let notes = cmd.notes.clone().filter(|n| !n.trim().is_empty());
        if notes == self.notes {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::NotesChanged(NotesChanged {
            entry_id: self.id,
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_metadata(&self, cmd: &SetMetadata) -> InventoryResult<Vec<InventoryEvent>> {
        self.ensure_target(cmd.entry_id)?;

        let key = cmd.key.trim();
        if key.is_empty() {
            return Err(InventoryError::validation("metadata key cannot be empty"));
        }
        if cmd.value.as_ref() == self.metadata.get(key) {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::MetadataChanged(MetadataChanged {
            entry_id: self.id,
            key: key.to_string(),
            value: cmd.value.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
