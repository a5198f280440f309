//! Inventory control component.
//!
//! `InventoryControl` is the only code path that mutates ledger entries. Every
//! operation runs the same pipeline while holding that entry's lock:
//!
//! ```text
//! acquire entry lock (bounded wait, else Contended)
//!   ↓
//! 1. Load the snapshot from the store (missing entry = empty aggregate)
//!   ↓
//! 2. Decide + evolve on the loaded copy (`execute`: handle, then apply)
//!   ↓
//! 3. Save the copy with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 4. Publish the committed events to the bus
//! ```
//!
//! A failure at steps 1–3 drops the copy, so the stored entry is exactly what
//! it was before the call. A failure at step 4 is reported as
//! `ControlError::Publish`; the state is already committed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockledger_core::{
    AggregateRoot, Clock, ExpectedVersion, InventoryError, LedgerEntryId, MovementId, OrderId,
    ProductId, ReservationId, SupplierId, VariantId, WarehouseId,
};
use stockledger_events::{Event, EventBus, EventEnvelope, execute};
use stockledger_inventory::{
    CreateEntry, ExtendReservation, InventoryCommand, InventoryEvent, LifecycleStatus,
    MetadataValue, Movement, MovementType, Patch, Reservation, SetLifecycleStatus, SetLocation,
    SetMetadata, SetNotes, SetSupplierInfo, SetThresholds, SetUnitCost, StockChange,
    StockLedgerEntry, Thresholds,
};

use crate::store::{LedgerStore, StoreError};

/// Aggregate type stamped on every published envelope.
pub const AGGREGATE_TYPE: &str = "inventory.ledger_entry";

/// Caller-facing error of the control component.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The command was rejected (or the entry was busy); nothing changed.
    #[error(transparent)]
    Domain(#[from] InventoryError),

    /// Persisting failed; nothing changed.
    #[error("ledger store failure: {0}")]
    Store(StoreError),

    /// Publication failed after a successful save (at-least-once; retry may duplicate).
    #[error("event publication failed after commit: {0}")]
    Publish(String),
}

impl From<StoreError> for ControlError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ControlError::Domain(InventoryError::Conflict(msg)),
            StoreError::NotFound(msg) => ControlError::Domain(InventoryError::NotFound(msg)),
            StoreError::DuplicateSku(msg) => ControlError::Domain(InventoryError::Validation(msg)),
            other => ControlError::Store(other),
        }
    }
}

impl ControlError {
    pub fn domain(&self) -> Option<&InventoryError> {
        match self {
            ControlError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ControlError::Domain(err) => err.is_retryable(),
            ControlError::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

/// Runtime knobs of the control component.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    /// Longest wait for an entry lock before returning `Contended`.
    pub lock_timeout: Duration,
    /// Thresholds for entries created without explicit ones.
    pub default_thresholds: Thresholds,
    /// Deadline given to reservations created without a TTL (`None` = no expiry).
    pub default_reservation_ttl: Option<chrono::Duration>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(250),
            default_thresholds: Thresholds::default(),
            default_reservation_ttl: Some(chrono::Duration::seconds(900)),
        }
    }
}

/// Parameters for a new ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub sku: String,
    pub initial_quantity: i64,
    pub thresholds: Option<Thresholds>,
    pub unit_cost: Option<u64>,
}

impl NewEntry {
    pub fn new(product_id: ProductId, sku: impl Into<String>) -> Self {
        Self {
            product_id,
            variant_id: None,
            sku: sku.into(),
            initial_quantity: 0,
            thresholds: None,
            unit_cost: None,
        }
    }

    pub fn variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    pub fn initial_quantity(mut self, quantity: i64) -> Self {
        self.initial_quantity = quantity;
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn unit_cost(mut self, unit_cost: u64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue reservations returned by the store.
    pub scanned: usize,
    pub expired: usize,
    /// Already terminated by a racing call.
    pub skipped: usize,
    /// Entry busy; retried on the next pass.
    pub contended: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct LockRegistry {
    entries: Mutex<HashMap<LedgerEntryId, Arc<Mutex<()>>>>,
    skus: Mutex<()>,
}

impl LockRegistry {
    fn entry(&self, entry_id: LedgerEntryId) -> Arc<Mutex<()>> {
        self.entries.lock().entry(entry_id).or_default().clone()
    }
}

/// Serialized, atomic mutation of ledger entries.
///
/// One lock per entry; operations on different entries never wait on each
/// other and no operation holds two entry locks.
#[derive(Debug)]
pub struct InventoryControl<S, B, C> {
    store: S,
    bus: B,
    clock: C,
    settings: ControlSettings,
    locks: LockRegistry,
}

impl<S, B, C> InventoryControl<S, B, C> {
    pub fn new(store: S, bus: B, clock: C, settings: ControlSettings) -> Self {
        Self {
            store,
            bus,
            clock,
            settings,
            locks: LockRegistry::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }
}

impl<S, B, C> InventoryControl<S, B, C>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<InventoryEvent>>,
    C: Clock,
{
    // ---- restock / admin ----

    /// Create a ledger entry; `NewEntry::thresholds = None` inherits the configured defaults.
    pub fn create_entry(&self, new: NewEntry) -> Result<StockLedgerEntry, ControlError> {
        // Serializes creators so two of them cannot both pass the SKU check.
        let _sku_guard = self
            .locks
            .skus
            .try_lock_for(self.settings.lock_timeout)
            .ok_or_else(|| InventoryError::contended("sku registry is busy"))?;

        let sku = new.sku.trim().to_string();
        if !sku.is_empty() && self.store.load_by_sku(&sku)?.is_some() {
            return Err(InventoryError::validation(format!("sku {sku} already exists")).into());
        }

        let entry_id = LedgerEntryId::new();
        let thresholds = new.thresholds.unwrap_or(self.settings.default_thresholds);
        self.dispatch(entry_id, |now| {
            InventoryCommand::CreateEntry(CreateEntry {
                entry_id,
                product_id: new.product_id,
                variant_id: new.variant_id,
                sku,
                initial_quantity: new.initial_quantity,
                thresholds: Some(thresholds),
                unit_cost: new.unit_cost,
                initial_movement_id: MovementId::new(),
                occurred_at: now,
            })
        })
    }

    pub fn add_stock(
        &self,
        entry_id: LedgerEntryId,
        change: StockChange,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::add_stock(entry_id, change, now)
        })
    }

    pub fn remove_stock(
        &self,
        entry_id: LedgerEntryId,
        change: StockChange,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::remove_stock(entry_id, change, now)
        })
    }

    pub fn adjust_stock(
        &self,
        entry_id: LedgerEntryId,
        new_quantity: i64,
        reason: impl Into<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        let reason = reason.into();
        self.dispatch(entry_id, |now| {
            InventoryCommand::adjust_stock(entry_id, new_quantity, reason, now)
        })
    }

    pub fn set_thresholds(
        &self,
        entry_id: LedgerEntryId,
        low_stock: i64,
        reorder_point: i64,
        max_stock: i64,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetThresholds(SetThresholds {
                entry_id,
                low_stock,
                reorder_point,
                max_stock,
                occurred_at: now,
            })
        })
    }

    pub fn set_lifecycle_status(
        &self,
        entry_id: LedgerEntryId,
        status: LifecycleStatus,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetLifecycleStatus(SetLifecycleStatus {
                entry_id,
                status,
                occurred_at: now,
            })
        })
    }

    pub fn set_unit_cost(
        &self,
        entry_id: LedgerEntryId,
        unit_cost: Option<u64>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetUnitCost(SetUnitCost {
                entry_id,
                unit_cost,
                occurred_at: now,
            })
        })
    }

    pub fn set_location(
        &self,
        entry_id: LedgerEntryId,
        warehouse_id: Patch<WarehouseId>,
        location: Patch<String>,
        bin: Patch<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetLocation(SetLocation {
                entry_id,
                warehouse_id,
                location,
                bin,
                occurred_at: now,
            })
        })
    }

    pub fn set_supplier_info(
        &self,
        entry_id: LedgerEntryId,
        supplier_id: Patch<SupplierId>,
        supplier_sku: Patch<String>,
        lead_time_days: Patch<u32>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetSupplierInfo(SetSupplierInfo {
                entry_id,
                supplier_id,
                supplier_sku,
                lead_time_days,
                occurred_at: now,
            })
        })
    }

    pub fn set_notes(
        &self,
        entry_id: LedgerEntryId,
        notes: Option<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetNotes(SetNotes {
                entry_id,
                notes,
                occurred_at: now,
            })
        })
    }

    pub fn set_metadata(
        &self,
        entry_id: LedgerEntryId,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.write_metadata(entry_id, key.into(), Some(value.into()))
    }

    pub fn remove_metadata(
        &self,
        entry_id: LedgerEntryId,
        key: impl Into<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.write_metadata(entry_id, key.into(), None)
    }

    fn write_metadata(
        &self,
        entry_id: LedgerEntryId,
        key: String,
        value: Option<MetadataValue>,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.dispatch(entry_id, |now| {
            InventoryCommand::SetMetadata(SetMetadata {
                entry_id,
                key,
                value,
                occurred_at: now,
            })
        })
    }

    // ---- checkout ----

    /// Hold `quantity` of `sku` for an order.
    ///
    /// `ttl = None` uses the configured default reservation TTL.
    pub fn reserve(
        &self,
        sku: &str,
        quantity: i64,
        order_id: OrderId,
        ttl: Option<chrono::Duration>,
    ) -> Result<ReservationId, ControlError> {
        let entry_id = *self.entry_by_sku(sku)?.id();
        let reservation_id = ReservationId::new();
        let ttl = ttl.or(self.settings.default_reservation_ttl);

        self.try_dispatch(entry_id, |now| {
            let expires_at = match ttl {
                Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                    InventoryError::validation(format!("reservation ttl {ttl} is out of range"))
                })?),
                None => None,
            };
            Ok(InventoryCommand::reserve(
                entry_id,
                reservation_id,
                order_id,
                quantity,
                expires_at,
                now,
            ))
        })?;

        Ok(reservation_id)
    }

    pub fn release(
        &self,
        reservation_id: ReservationId,
        reason: Option<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = self.owner_of(reservation_id)?;
        self.dispatch(entry_id, |now| {
            InventoryCommand::release(entry_id, reservation_id, reason, now)
        })
    }

    /// Turn a reservation into a permanent deduction (one atomic transition).
    pub fn fulfill(&self, reservation_id: ReservationId) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = self.owner_of(reservation_id)?;
        self.dispatch(entry_id, |now| {
            InventoryCommand::fulfill(entry_id, reservation_id, now)
        })
    }

    pub fn expire(&self, reservation_id: ReservationId) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = self.owner_of(reservation_id)?;
        self.dispatch(entry_id, |now| {
            InventoryCommand::expire(entry_id, reservation_id, now)
        })
    }

    pub fn cancel(
        &self,
        reservation_id: ReservationId,
        reason: Option<String>,
    ) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = self.owner_of(reservation_id)?;
        self.dispatch(entry_id, |now| {
            InventoryCommand::cancel(entry_id, reservation_id, reason, now)
        })
    }

    pub fn extend_reservation(
        &self,
        reservation_id: ReservationId,
        expires_at: DateTime<Utc>,
    ) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = self.owner_of(reservation_id)?;
        self.dispatch(entry_id, |now| {
            InventoryCommand::ExtendReservation(ExtendReservation {
                entry_id,
                reservation_id,
                expires_at,
                occurred_at: now,
            })
        })
    }

    // ---- scheduler ----

    /// Expire every overdue reservation once.
    ///
    /// Reservations terminated by a racing call are skipped; busy entries are
    /// left for the next pass. Individual failures are logged and counted.
    pub fn sweep_expired(&self) -> Result<SweepReport, ControlError> {
        let overdue = self.store.expired_reservations(self.clock.now())?;
        let mut report = SweepReport {
            scanned: overdue.len(),
            ..SweepReport::default()
        };

        for o in overdue {
            let outcome = self.dispatch(o.entry_id, |now| {
                InventoryCommand::expire(o.entry_id, o.reservation_id, now)
            });
            match outcome {
                Ok(_) => report.expired += 1,
                Err(ControlError::Domain(
                    InventoryError::InvalidState(_) | InventoryError::NotFound(_),
                )) => report.skipped += 1,
                Err(ControlError::Domain(InventoryError::Contended(_))) => report.contended += 1,
                Err(err) => {
                    warn!(
                        entry_id = %o.entry_id,
                        reservation_id = %o.reservation_id,
                        error = %err,
                        "failed to expire reservation"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                contended = report.contended,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    // ---- queries ----

    pub fn entry(&self, entry_id: LedgerEntryId) -> Result<StockLedgerEntry, ControlError> {
        self.store.load(entry_id)?.ok_or_else(|| {
            ControlError::from(InventoryError::not_found(format!("ledger entry {entry_id}")))
        })
    }

    pub fn entry_by_sku(&self, sku: &str) -> Result<StockLedgerEntry, ControlError> {
        self.store
            .load_by_sku(sku)?
            .ok_or_else(|| ControlError::from(InventoryError::not_found(format!("sku {sku}"))))
    }

    pub fn movements(&self, entry_id: LedgerEntryId) -> Result<Vec<Movement>, ControlError> {
        Ok(self.store.movements(entry_id)?)
    }

    pub fn movements_between(
        &self,
        entry_id: LedgerEntryId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Movement>, ControlError> {
        Ok(self.store.movements_between(entry_id, from, to)?)
    }

    pub fn movements_by_type(
        &self,
        entry_id: LedgerEntryId,
        movement_type: MovementType,
    ) -> Result<Vec<Movement>, ControlError> {
        Ok(self.store.movements_by_type(entry_id, movement_type)?)
    }

    pub fn reservations_by_sku(&self, sku: &str) -> Result<Vec<Reservation>, ControlError> {
        Ok(self.store.reservations_by_sku(sku)?)
    }

    // ---- pipeline ----

    fn owner_of(&self, reservation_id: ReservationId) -> Result<LedgerEntryId, ControlError> {
        self.store
            .locate_reservation(reservation_id)?
            .ok_or_else(|| {
                ControlError::from(InventoryError::not_found(format!(
                    "reservation {reservation_id}"
                )))
            })
    }

    /// Run one command against `entry_id` under its lock.
    ///
    /// The command is built inside the lock so its timestamp is taken after
    /// every earlier operation on the entry finished.
    fn dispatch(
        &self,
        entry_id: LedgerEntryId,
        make_command: impl FnOnce(DateTime<Utc>) -> InventoryCommand,
    ) -> Result<StockLedgerEntry, ControlError> {
        self.try_dispatch(entry_id, |now| Ok(make_command(now)))
    }

    /// Like `dispatch`, for commands whose construction can itself fail.
    fn try_dispatch(
        &self,
        entry_id: LedgerEntryId,
        make_command: impl FnOnce(DateTime<Utc>) -> Result<InventoryCommand, InventoryError>,
    ) -> Result<StockLedgerEntry, ControlError> {
        let lock = self.locks.entry(entry_id);
        let _guard = lock
            .try_lock_for(self.settings.lock_timeout)
            .ok_or_else(|| {
                warn!(
                    entry_id = %entry_id,
                    timeout_ms = self.settings.lock_timeout.as_millis() as u64,
                    "ledger entry lock contended"
                );
                InventoryError::contended(format!("ledger entry {entry_id} is busy"))
            })?;

        let command = make_command(self.clock.now())?;
        self.commit(&command)
    }

    fn commit(&self, command: &InventoryCommand) -> Result<StockLedgerEntry, ControlError> {
        let entry_id = command.entry_id();

        // 1) Load (a missing entry is the empty aggregate; it rejects everything but create)
        let mut entry = self
            .store
            .load(entry_id)?
            .unwrap_or_else(|| StockLedgerEntry::empty(entry_id));
        let loaded_version = entry.version();

        // 2) Decide + evolve the private copy
        let events = execute(&mut entry, command).inspect_err(|err| {
            debug!(
                entry_id = %entry_id,
                command = command.name(),
                error = %err,
                "command rejected"
            );
        })?;
        if events.is_empty() {
            return Ok(entry);
        }

        // 3) Persist (optimistic, against the loaded version)
        self.store
            .save(&entry, ExpectedVersion::Exact(loaded_version))
            .inspect_err(|err| {
                warn!(
                    entry_id = %entry_id,
                    command = command.name(),
                    error = %err,
                    "ledger entry save failed; nothing committed"
                );
            })?;

        let levels = entry.levels();
        info!(
            entry_id = %entry_id,
            sku = entry.sku(),
            command = command.name(),
            version = entry.version(),
            quantity = levels.quantity,
            reserved = levels.reserved,
            available = levels.available,
            stock_status = %entry.stock_status(),
            "ledger entry updated"
        );

        // 4) Publish (after save)
        self.publish(entry_id, loaded_version, &events)?;

        Ok(entry)
    }

    fn publish(
        &self,
        entry_id: LedgerEntryId,
        base_version: u64,
        events: &[InventoryEvent],
    ) -> Result<(), ControlError> {
        for (offset, event) in events.iter().enumerate() {
            let sequence_number = base_version + offset as u64 + 1;
            debug!(
                entry_id = %entry_id,
                event_type = event.event_type(),
                sequence_number,
                "publishing event"
            );
            self.bus
                .publish(EventEnvelope::wrap(
                    entry_id,
                    AGGREGATE_TYPE,
                    sequence_number,
                    event.clone(),
                ))
                .map_err(|e| ControlError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;

    use stockledger_core::{Entity, ManualClock};
    use stockledger_events::{InMemoryEventBus, Subscription};
    use stockledger_inventory::{ReservationStatus, StockLevels, StockStatus};

    use crate::store::{InMemoryLedgerStore, OverdueReservation};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<InventoryEvent>>>;
    type TestControl<S> = InventoryControl<S, Bus, Arc<ManualClock>>;

    fn settings() -> ControlSettings {
        ControlSettings {
            lock_timeout: Duration::from_millis(50),
            ..ControlSettings::default()
        }
    }

    fn control_with<S: LedgerStore>(store: S, settings: ControlSettings) -> TestControl<S> {
        InventoryControl::new(
            store,
            Arc::new(InMemoryEventBus::new()),
            Arc::new(ManualClock::new(Utc::now())),
            settings,
        )
    }

    fn control() -> TestControl<Arc<InMemoryLedgerStore>> {
        control_with(Arc::new(InMemoryLedgerStore::new()), settings())
    }

    fn stocked<S: LedgerStore>(control: &TestControl<S>, sku: &str, qty: i64) -> LedgerEntryId {
        let entry = control
            .create_entry(NewEntry::new(ProductId::new(), sku).initial_quantity(qty))
            .unwrap();
        *entry.id()
    }

    /// Store wrapper that can be told to fail saves or to report a stale overdue list.
    #[derive(Debug, Default)]
    struct ScriptedStore {
        inner: InMemoryLedgerStore,
        fail_saves: AtomicBool,
        stale_overdue: parking_lot::Mutex<Option<Vec<OverdueReservation>>>,
    }

    impl LedgerStore for ScriptedStore {
        fn load(&self, entry_id: LedgerEntryId) -> Result<Option<StockLedgerEntry>, StoreError> {
            self.inner.load(entry_id)
        }

        fn load_by_sku(&self, sku: &str) -> Result<Option<StockLedgerEntry>, StoreError> {
            self.inner.load_by_sku(sku)
        }

        fn save(
            &self,
            entry: &StockLedgerEntry,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk on fire".to_string()));
            }
            self.inner.save(entry, expected)
        }

        fn movements(&self, entry_id: LedgerEntryId) -> Result<Vec<Movement>, StoreError> {
            self.inner.movements(entry_id)
        }

        fn movements_between(
            &self,
            entry_id: LedgerEntryId,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Movement>, StoreError> {
            self.inner.movements_between(entry_id, from, to)
        }

        fn movements_by_type(
            &self,
            entry_id: LedgerEntryId,
            movement_type: MovementType,
        ) -> Result<Vec<Movement>, StoreError> {
            self.inner.movements_by_type(entry_id, movement_type)
        }

        fn locate_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Option<LedgerEntryId>, StoreError> {
            self.inner.locate_reservation(reservation_id)
        }

        fn reservations_by_sku(&self, sku: &str) -> Result<Vec<Reservation>, StoreError> {
            self.inner.reservations_by_sku(sku)
        }

        fn expired_reservations(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<OverdueReservation>, StoreError> {
            match self.stale_overdue.lock().clone() {
                Some(stale) => Ok(stale),
                None => self.inner.expired_reservations(now),
            }
        }
    }

    #[derive(Debug, Default)]
    struct DownBus {
        attempts: AtomicUsize,
    }

    impl EventBus<EventEnvelope<InventoryEvent>> for DownBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<InventoryEvent>) -> Result<(), Self::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err("bus down")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<InventoryEvent>> {
            let (_tx, rx) = mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[test]
    fn checkout_flow_commits_and_publishes_in_order() {
        let control = control();
        let sub = control.bus().subscribe();
        let entry_id = stocked(&control, "SKU-1", 50);

        let reservation_id = control
            .reserve("SKU-1", 45, OrderId::new(), None)
            .unwrap();
        let entry = control.fulfill(reservation_id).unwrap();

        assert_eq!(entry.levels(), StockLevels::new(5, 0));
        assert_eq!(control.entry(entry_id).unwrap(), entry);

        let published = sub.drain();
        let types: Vec<_> = published.iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(
            types,
            vec![
                "inventory.entry.created",
                "inventory.stock.added",
                "inventory.reservation.reserved",
                "inventory.reservation.fulfilled",
            ]
        );
        let sequences: Vec<_> = published.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert!(published.iter().all(|e| e.entry_id() == entry_id));
        assert!(published.iter().all(|e| e.aggregate_type() == AGGREGATE_TYPE));
    }

    #[test]
    fn create_applies_configured_defaults_and_rejects_duplicate_sku() {
        let custom = Thresholds::new(3, 1, 50).unwrap();
        let control = control_with(
            Arc::new(InMemoryLedgerStore::new()),
            ControlSettings {
                default_thresholds: custom,
                ..settings()
            },
        );

        let entry = control
            .create_entry(NewEntry::new(ProductId::new(), "  SKU-1 ").initial_quantity(4))
            .unwrap();
        assert_eq!(entry.sku(), "SKU-1");
        assert_eq!(entry.thresholds(), custom);
        assert_eq!(entry.stock_status(), StockStatus::InStock);

        let err = control
            .create_entry(NewEntry::new(ProductId::new(), "SKU-1"))
            .unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::Validation(_))));

        let err = control
            .create_entry(NewEntry::new(ProductId::new(), " "))
            .unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::Validation(_))));
    }

    #[test]
    fn reserve_uses_default_ttl_and_explicit_ttl_overrides_it() {
        let control = control();
        stocked(&control, "SKU-1", 10);
        let now = control.clock().now();

        let defaulted = control.reserve("SKU-1", 1, OrderId::new(), None).unwrap();
        let explicit = control
            .reserve("SKU-1", 1, OrderId::new(), Some(chrono::Duration::minutes(2)))
            .unwrap();

        let entry = control.entry_by_sku("SKU-1").unwrap();
        assert_eq!(
            entry.reservation(defaulted).unwrap().expires_at(),
            Some(now + chrono::Duration::seconds(900))
        );
        assert_eq!(
            entry.reservation(explicit).unwrap().expires_at(),
            Some(now + chrono::Duration::minutes(2))
        );
    }

    #[test]
    fn ttl_past_the_representable_range_is_rejected() {
        let control = control();
        stocked(&control, "SKU-1", 10);
        let before = control.entry_by_sku("SKU-1").unwrap();

        let err = control
            .reserve(
                "SKU-1",
                1,
                OrderId::new(),
                Some(chrono::Duration::seconds(10_000_000_000_000)),
            )
            .unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::Validation(_))));

        let after = control.entry_by_sku("SKU-1").unwrap();
        assert_eq!(after.version(), before.version());
        assert_eq!(after.reserved(), 0);
    }

    #[test]
    fn unknown_sku_and_reservation_are_not_found() {
        let control = control();
        let err = control.reserve("nope", 1, OrderId::new(), None).unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::NotFound(_))));

        let err = control.fulfill(ReservationId::new()).unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::NotFound(_))));

        let err = control
            .add_stock(LedgerEntryId::new(), StockChange::new(1, "restock"))
            .unwrap_err();
        assert!(matches!(err, ControlError::Domain(InventoryError::NotFound(_))));
    }

    #[test]
    fn rejected_command_changes_nothing_and_publishes_nothing() {
        let control = control();
        let entry_id = stocked(&control, "SKU-1", 50);
        control.reserve("SKU-1", 45, OrderId::new(), None).unwrap();
        let before = control.entry(entry_id).unwrap();
        let sub = control.bus().subscribe();

        let err = control
            .reserve("SKU-1", 10, OrderId::new(), None)
            .unwrap_err();

        assert!(matches!(
            err,
            ControlError::Domain(InventoryError::InsufficientStock {
                requested: 10,
                available: 5
            })
        ));
        assert_eq!(control.entry(entry_id).unwrap(), before);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn failed_save_rolls_back_fulfill() {
        let control = control_with(ScriptedStore::default(), settings());
        let entry_id = stocked(&control, "SKU-1", 20);
        let reservation_id = control.reserve("SKU-1", 8, OrderId::new(), None).unwrap();
        let before = control.entry(entry_id).unwrap();
        let sub = control.bus().subscribe();

        control.store().fail_saves.store(true, Ordering::SeqCst);
        let err = control.fulfill(reservation_id).unwrap_err();

        assert!(matches!(err, ControlError::Store(StoreError::Unavailable(_))));
        assert!(err.is_retryable());
        let after = control.entry(entry_id).unwrap();
        assert_eq!(after, before);
        assert_eq!(
            after.reservation(reservation_id).map(|r| r.status()),
            Some(ReservationStatus::Active)
        );
        assert!(sub.drain().is_empty());

        control.store().fail_saves.store(false, Ordering::SeqCst);
        let entry = control.fulfill(reservation_id).unwrap();
        assert_eq!(entry.levels(), StockLevels::new(12, 0));
    }

    #[test]
    fn publish_failure_is_reported_after_commit() {
        let control = InventoryControl::new(
            Arc::new(InMemoryLedgerStore::new()),
            DownBus::default(),
            Arc::new(ManualClock::new(Utc::now())),
            settings(),
        );

        let err = control
            .create_entry(NewEntry::new(ProductId::new(), "SKU-1").initial_quantity(3))
            .unwrap_err();

        assert!(matches!(err, ControlError::Publish(_)));
        assert_eq!(control.bus().attempts.load(Ordering::SeqCst), 1);
        let stored = control.entry_by_sku("SKU-1").unwrap();
        assert_eq!(stored.quantity(), 3);
    }

    #[test]
    fn busy_entry_reports_contended() {
        let control = control();
        let entry_id = stocked(&control, "SKU-1", 5);

        let lock = control.locks.entry(entry_id);
        let held = lock.lock();
        let err = control
            .add_stock(entry_id, StockChange::new(1, "restock"))
            .unwrap_err();
        drop(held);

        assert!(matches!(err, ControlError::Domain(InventoryError::Contended(_))));
        assert!(err.is_retryable());
        assert_eq!(control.entry(entry_id).unwrap().quantity(), 5);

        // Other entries are unaffected by the held lock.
        let other = stocked(&control, "SKU-2", 1);
        let _held = lock.lock();
        control
            .add_stock(other, StockChange::new(1, "restock"))
            .unwrap();
    }

    #[test]
    fn sweep_expires_overdue_and_leaves_the_rest() {
        let control = control();
        stocked(&control, "SKU-1", 10);
        let short = control
            .reserve("SKU-1", 2, OrderId::new(), Some(chrono::Duration::minutes(1)))
            .unwrap();
        let long = control
            .reserve("SKU-1", 3, OrderId::new(), Some(chrono::Duration::hours(1)))
            .unwrap();

        assert_eq!(control.sweep_expired().unwrap(), SweepReport::default());

        control.clock().advance(chrono::Duration::minutes(2));
        let report = control.sweep_expired().unwrap();
        assert_eq!(
            report,
            SweepReport {
                scanned: 1,
                expired: 1,
                ..SweepReport::default()
            }
        );

        let entry = control.entry_by_sku("SKU-1").unwrap();
        assert_eq!(
            entry.reservation(short).map(|r| r.status()),
            Some(ReservationStatus::Expired)
        );
        assert_eq!(
            entry.reservation(long).map(|r| r.status()),
            Some(ReservationStatus::Active)
        );
        assert_eq!(entry.reserved(), 3);
    }

    #[test]
    fn sweep_treats_already_terminated_reservations_as_benign() {
        let control = control_with(ScriptedStore::default(), settings());
        let entry_id = stocked(&control, "SKU-1", 10);
        let reservation_id = control
            .reserve("SKU-1", 2, OrderId::new(), Some(chrono::Duration::minutes(1)))
            .unwrap();
        control.clock().advance(chrono::Duration::minutes(2));

        // The sweep's query raced with a checkout that already released it.
        let stale = control
            .store()
            .expired_reservations(control.clock().now())
            .unwrap();
        assert_eq!(stale.len(), 1);
        control.release(reservation_id, None).unwrap();
        *control.store().stale_overdue.lock() = Some(
            stale
                .into_iter()
                .chain([OverdueReservation {
                    entry_id,
                    reservation_id: ReservationId::new(),
                    expires_at: control.clock().now(),
                }])
                .collect(),
        );
        let before = control.entry(entry_id).unwrap();

        let report = control.sweep_expired().unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                skipped: 2,
                ..SweepReport::default()
            }
        );
        assert_eq!(control.entry(entry_id).unwrap(), before);
    }

    #[test]
    fn setters_flow_through_the_pipeline() {
        let control = control();
        let entry_id = stocked(&control, "SKU-1", 10);

        control.set_unit_cost(entry_id, Some(125)).unwrap();
        control
            .set_location(
                entry_id,
                Patch::Set(WarehouseId::new()),
                Patch::Set("A-1".into()),
                Patch::Keep,
            )
            .unwrap();
        control
            .set_supplier_info(entry_id, Patch::Set(SupplierId::new()), Patch::Keep, Patch::Set(7))
            .unwrap();
        control.set_notes(entry_id, Some("fragile".into())).unwrap();
        control.set_metadata(entry_id, "color", "red").unwrap();
        control.remove_metadata(entry_id, "color").unwrap();
        control.set_thresholds(entry_id, 20, 10, 100).unwrap();
        let entry = control
            .set_lifecycle_status(entry_id, LifecycleStatus::Inactive)
            .unwrap();

        assert_eq!(entry.total_value(), 1250);
        assert_eq!(entry.location(), Some("A-1"));
        assert_eq!(entry.lead_time_days(), Some(7));
        assert_eq!(entry.notes(), Some("fragile"));
        assert!(entry.metadata().is_empty());
        assert_eq!(entry.stock_status(), StockStatus::OutOfStock);

        let err = control.set_thresholds(entry_id, 5, 10, 100).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Domain(InventoryError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn movement_queries_go_through_the_store() {
        let control = control();
        let entry_id = stocked(&control, "SKU-1", 10);
        control
            .remove_stock(entry_id, StockChange::new(2, "sale"))
            .unwrap();
        control.adjust_stock(entry_id, 7, "cycle count").unwrap();

        let all = control.movements(entry_id).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|m| m.is_consistent()));
        assert_eq!(
            control
                .movements_by_type(entry_id, MovementType::Outbound)
                .unwrap()
                .len(),
            1
        );
        let now = control.clock().now();
        assert_eq!(control.movements_between(entry_id, now, now).unwrap().len(), 3);
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let control = control_with(
            Arc::new(InMemoryLedgerStore::new()),
            ControlSettings {
                lock_timeout: Duration::from_secs(10),
                ..ControlSettings::default()
            },
        );
        let entry_id = stocked(&control, "SKU-HOT", 10);
        let threads = 24;
        let barrier = Barrier::new(threads);

        let (control_ref, barrier_ref) = (&control, &barrier);
        let outcomes: Vec<Result<ReservationId, ControlError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(move || {
                        barrier_ref.wait();
                        control_ref.reserve("SKU-HOT", 1, OrderId::new(), None)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let won = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(won, 10);
        for lost in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            assert!(matches!(
                lost,
                ControlError::Domain(InventoryError::InsufficientStock { .. })
            ));
        }

        let entry = control.entry(entry_id).unwrap();
        assert_eq!(entry.levels(), StockLevels::new(10, 10));
        assert_eq!(entry.active_reservations().count(), 10);
        entry.check_invariants().unwrap();
    }

    #[test]
    fn two_parallel_reservations_of_eight_against_ten_cannot_both_win() {
        let control = control_with(
            Arc::new(InMemoryLedgerStore::new()),
            ControlSettings {
                lock_timeout: Duration::from_secs(10),
                ..ControlSettings::default()
            },
        );
        let entry_id = stocked(&control, "SKU-PAIR", 10);
        let barrier = Barrier::new(2);

        let (control_ref, barrier_ref) = (&control, &barrier);
        let outcomes: Vec<Result<ReservationId, ControlError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        barrier_ref.wait();
                        control_ref.reserve("SKU-PAIR", 8, OrderId::new(), None)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        let lost = outcomes
            .iter()
            .find_map(|o| o.as_ref().err())
            .unwrap();
        assert!(matches!(
            lost,
            ControlError::Domain(
                InventoryError::InsufficientStock { requested: 8, available: 2 }
                    | InventoryError::Contended(_)
            )
        ));

        let entry = control.entry(entry_id).unwrap();
        assert_eq!(entry.levels(), StockLevels::new(10, 8));
        assert_eq!(entry.available(), 2);
        entry.check_invariants().unwrap();
    }

    #[test]
    fn concurrent_fulfill_and_release_of_one_reservation_has_one_winner() {
        let control = control_with(
            Arc::new(InMemoryLedgerStore::new()),
            ControlSettings {
                lock_timeout: Duration::from_secs(10),
                ..ControlSettings::default()
            },
        );
        let entry_id = stocked(&control, "SKU-1", 10);
        let reservation_id = control.reserve("SKU-1", 4, OrderId::new(), None).unwrap();
        let barrier = Barrier::new(2);

        let (fulfilled, released) = thread::scope(|s| {
            let f = s.spawn(|| {
                barrier.wait();
                control.fulfill(reservation_id)
            });
            let r = s.spawn(|| {
                barrier.wait();
                control.release(reservation_id, Some("customer left".into()))
            });
            (f.join().unwrap(), r.join().unwrap())
        });

        assert!(fulfilled.is_ok() != released.is_ok());
        let loser = fulfilled.err().or(released.err()).unwrap();
        assert!(matches!(
            loser,
            ControlError::Domain(InventoryError::InvalidState(_))
        ));

        let entry = control.entry(entry_id).unwrap();
        assert_eq!(entry.reserved(), 0);
        let r = entry.reservation(reservation_id).unwrap();
        assert!(r.status().is_terminal());
        assert_eq!(*r.id(), reservation_id);
        entry.check_invariants().unwrap();
    }
}
