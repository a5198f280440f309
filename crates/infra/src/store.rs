//! Ledger store boundary.
//!
//! The store persists whole `StockLedgerEntry` snapshots (movement log and
//! reservations included) and answers the lookups the control component and
//! the expiry sweeper need. Implementations must:
//! - reject a save whose `ExpectedVersion` does not match the stored version
//! - keep SKUs unique across entries
//! - refuse any save that would rewrite or drop already-stored movements

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use stockledger_core::{AggregateRoot, Entity, ExpectedVersion, LedgerEntryId, ReservationId};
use stockledger_inventory::{Movement, MovementType, Reservation, StockLedgerEntry};

/// Store operation error.
///
/// These are persistence failures as opposed to domain rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("duplicate sku: {0}")]
    DuplicateSku(String),

    #[error("movement log is append-only: {0}")]
    AppendOnly(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// An active reservation whose deadline has passed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OverdueReservation {
    pub entry_id: LedgerEntryId,
    pub reservation_id: ReservationId,
    pub expires_at: DateTime<Utc>,
}

/// Persistence boundary for ledger entries.
pub trait LedgerStore: Send + Sync {
    /// Load a snapshot; `None` if the entry was never saved.
    fn load(&self, entry_id: LedgerEntryId) -> Result<Option<StockLedgerEntry>, StoreError>;

    fn load_by_sku(&self, sku: &str) -> Result<Option<StockLedgerEntry>, StoreError>;

    /// Persist a snapshot if the stored version still equals `expected`.
    ///
    /// A missing entry counts as version 0.
    fn save(&self, entry: &StockLedgerEntry, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn movements(&self, entry_id: LedgerEntryId) -> Result<Vec<Movement>, StoreError>;

    /// Movements created within `[from, to]`.
    fn movements_between(
        &self,
        entry_id: LedgerEntryId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError>;

    fn movements_by_type(
        &self,
        entry_id: LedgerEntryId,
        movement_type: MovementType,
    ) -> Result<Vec<Movement>, StoreError>;

    /// Which entry owns a reservation.
    fn locate_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<LedgerEntryId>, StoreError>;

    fn reservations_by_sku(&self, sku: &str) -> Result<Vec<Reservation>, StoreError>;

    /// Active reservations with `expires_at < now`, oldest deadline first.
    fn expired_reservations(&self, now: DateTime<Utc>)
    -> Result<Vec<OverdueReservation>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load(&self, entry_id: LedgerEntryId) -> Result<Option<StockLedgerEntry>, StoreError> {
        (**self).load(entry_id)
    }

    fn load_by_sku(&self, sku: &str) -> Result<Option<StockLedgerEntry>, StoreError> {
        (**self).load_by_sku(sku)
    }

    fn save(&self, entry: &StockLedgerEntry, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(entry, expected)
    }

    fn movements(&self, entry_id: LedgerEntryId) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(entry_id)
    }

    fn movements_between(
        &self,
        entry_id: LedgerEntryId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError> {
        (**self).movements_between(entry_id, from, to)
    }

    fn movements_by_type(
        &self,
        entry_id: LedgerEntryId,
        movement_type: MovementType,
    ) -> Result<Vec<Movement>, StoreError> {
        (**self).movements_by_type(entry_id, movement_type)
    }

    fn locate_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<LedgerEntryId>, StoreError> {
        (**self).locate_reservation(reservation_id)
    }

    fn reservations_by_sku(&self, sku: &str) -> Result<Vec<Reservation>, StoreError> {
        (**self).reservations_by_sku(sku)
    }

    fn expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverdueReservation>, StoreError> {
        (**self).expired_reservations(now)
    }
}

#[derive(Debug, Default)]
struct Tables {
    entries: HashMap<LedgerEntryId, StockLedgerEntry>,
    by_sku: HashMap<String, LedgerEntryId>,
    by_reservation: HashMap<ReservationId, LedgerEntryId>,
}

impl Tables {
    fn entry(&self, entry_id: LedgerEntryId) -> Result<&StockLedgerEntry, StoreError> {
        self.entries
            .get(&entry_id)
            .ok_or_else(|| StoreError::NotFound(format!("ledger entry {entry_id}")))
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Snapshots are cloned in and out.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self, entry_id: LedgerEntryId) -> Result<Option<StockLedgerEntry>, StoreError> {
        Ok(self.tables.read().entries.get(&entry_id).cloned())
    }

    fn load_by_sku(&self, sku: &str) -> Result<Option<StockLedgerEntry>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .by_sku
            .get(sku)
            .and_then(|id| tables.entries.get(id))
            .cloned())
    }

    fn save(&self, entry: &StockLedgerEntry, expected: ExpectedVersion) -> Result<(), StoreError> {
        let entry_id = *entry.id();
        let mut tables = self.tables.write();

        let stored = tables.entries.get(&entry_id);
        let current = stored.map(|e| e.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "ledger entry {entry_id}: expected {expected:?}, found {current}"
            )));
        }

        if let Some(owner) = tables.by_sku.get(entry.sku()) {
            if *owner != entry_id {
                return Err(StoreError::DuplicateSku(format!(
                    "{} already belongs to ledger entry {owner}",
                    entry.sku()
                )));
            }
        }

        if let Some(stored) = stored {
            if !entry.movements().extends(stored.movements()) {
                return Err(StoreError::AppendOnly(format!(
                    "ledger entry {entry_id}: stored movements are not a prefix of the new log"
                )));
            }
        }

        if let Some(previous_sku) = stored.map(|e| e.sku().to_string()) {
            if previous_sku != entry.sku() {
                tables.by_sku.remove(&previous_sku);
            }
        }
        tables.by_sku.insert(entry.sku().to_string(), entry_id);
        for r in entry.reservations() {
            tables.by_reservation.insert(*r.id(), entry_id);
        }
        tables.entries.insert(entry_id, entry.clone());

        Ok(())
    }

    fn movements(&self, entry_id: LedgerEntryId) -> Result<Vec<Movement>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.entry(entry_id)?.movements().all().to_vec())
    }

    fn movements_between(
        &self,
        entry_id: LedgerEntryId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .entry(entry_id)?
            .movements()
            .between(from, to)
            .cloned()
            .collect())
    }

    fn movements_by_type(
        &self,
        entry_id: LedgerEntryId,
        movement_type: MovementType,
    ) -> Result<Vec<Movement>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .entry(entry_id)?
            .movements()
            .by_type(movement_type)
            .cloned()
            .collect())
    }

    fn locate_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<LedgerEntryId>, StoreError> {
        Ok(self.tables.read().by_reservation.get(&reservation_id).copied())
    }

    fn reservations_by_sku(&self, sku: &str) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .by_sku
            .get(sku)
            .and_then(|id| tables.entries.get(id))
            .map(|e| e.reservations().to_vec())
            .unwrap_or_default())
    }

    fn expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverdueReservation>, StoreError> {
        let tables = self.tables.read();
        let mut overdue: Vec<OverdueReservation> = tables
            .entries
            .values()
            .flat_map(|entry| {
                entry.overdue_reservations(now).filter_map(|r| {
                    r.expires_at().map(|expires_at| OverdueReservation {
                        entry_id: r.entry_id(),
                        reservation_id: *r.id(),
                        expires_at,
                    })
                })
            })
            .collect();
        overdue.sort_by_key(|o| o.expires_at);
        Ok(overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockledger_core::{MovementId, OrderId, ProductId};
    use stockledger_events::execute;
    use stockledger_inventory::{CreateEntry, InventoryCommand, StockChange};

    fn created(sku: &str, qty: i64) -> StockLedgerEntry {
        let id = LedgerEntryId::new();
        let mut entry = StockLedgerEntry::empty(id);
        execute(
            &mut entry,
            &InventoryCommand::CreateEntry(CreateEntry {
                entry_id: id,
                product_id: ProductId::new(),
                variant_id: None,
                sku: sku.to_string(),
                initial_quantity: qty,
                thresholds: None,
                unit_cost: None,
                initial_movement_id: MovementId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        entry
    }

    #[test]
    fn save_then_load_by_id_and_sku() {
        let store = InMemoryLedgerStore::new();
        let entry = created("SKU-A", 5);

        store.save(&entry, ExpectedVersion::Exact(0)).unwrap();

        assert_eq!(store.load(*entry.id()).unwrap(), Some(entry.clone()));
        assert_eq!(store.load_by_sku("SKU-A").unwrap(), Some(entry));
        assert_eq!(store.load_by_sku("SKU-B").unwrap(), None);
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let mut entry = created("SKU-A", 5);
        store.save(&entry, ExpectedVersion::Exact(0)).unwrap();

        let loaded_version = entry.version();
        let entry_id = *entry.id();
        execute(
            &mut entry,
            &InventoryCommand::add_stock(entry_id, StockChange::new(1, "restock"), Utc::now()),
        )
        .unwrap();
        store.save(&entry, ExpectedVersion::Exact(loaded_version)).unwrap();

        let err = store
            .save(&entry, ExpectedVersion::Exact(loaded_version))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn sku_is_unique_across_entries() {
        let store = InMemoryLedgerStore::new();
        store
            .save(&created("SKU-A", 0), ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .save(&created("SKU-A", 0), ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSku(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dropping_stored_movements_is_refused() {
        let store = InMemoryLedgerStore::new();
        let entry = created("SKU-A", 5);
        store.save(&entry, ExpectedVersion::Any).unwrap();

        // A fresh entry under the same id has an empty log.
        let mut rewritten = StockLedgerEntry::empty(*entry.id());
        execute(
            &mut rewritten,
            &InventoryCommand::CreateEntry(CreateEntry {
                entry_id: *entry.id(),
                product_id: ProductId::new(),
                variant_id: None,
                sku: "SKU-A".to_string(),
                initial_quantity: 0,
                thresholds: None,
                unit_cost: None,
                initial_movement_id: MovementId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = store.save(&rewritten, ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, StoreError::AppendOnly(_)));
    }

    #[test]
    fn movement_queries_filter_the_stored_log() {
        let store = InMemoryLedgerStore::new();
        let start = Utc::now();
        let mut entry = created("SKU-A", 10);
        let id = *entry.id();
        execute(
            &mut entry,
            &InventoryCommand::remove_stock(id, StockChange::new(3, "sale"), start + Duration::hours(1)),
        )
        .unwrap();
        execute(
            &mut entry,
            &InventoryCommand::adjust_stock(id, 6, "count", start + Duration::hours(2)),
        )
        .unwrap();
        store.save(&entry, ExpectedVersion::Any).unwrap();

        assert_eq!(store.movements(id).unwrap().len(), 3);
        assert_eq!(
            store
                .movements_by_type(id, MovementType::Adjustment)
                .unwrap()
                .len(),
            1
        );
        let window = store
            .movements_between(id, start + Duration::minutes(30), start + Duration::hours(1))
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].movement_type(), MovementType::Outbound);

        let missing = store.movements(LedgerEntryId::new()).unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[test]
    fn reservation_index_and_expiry_query() {
        let store = InMemoryLedgerStore::new();
        let now = Utc::now();
        let mut entry = created("SKU-A", 10);
        let id = *entry.id();

        let soon = ReservationId::new();
        let later = ReservationId::new();
        let open_ended = ReservationId::new();
        for (rid, deadline) in [
            (later, Some(now + Duration::minutes(30))),
            (soon, Some(now + Duration::minutes(5))),
            (open_ended, None),
        ] {
            execute(
                &mut entry,
                &InventoryCommand::reserve(id, rid, OrderId::new(), 1, deadline, now),
            )
            .unwrap();
        }
        store.save(&entry, ExpectedVersion::Any).unwrap();

        assert_eq!(store.locate_reservation(soon).unwrap(), Some(id));
        assert_eq!(store.locate_reservation(ReservationId::new()).unwrap(), None);
        assert_eq!(store.reservations_by_sku("SKU-A").unwrap().len(), 3);

        assert!(store.expired_reservations(now).unwrap().is_empty());
        // Exactly at the deadline is not yet overdue.
        assert!(
            store
                .expired_reservations(now + Duration::minutes(5))
                .unwrap()
                .is_empty()
        );

        let overdue = store.expired_reservations(now + Duration::hours(1)).unwrap();
        let ids: Vec<_> = overdue.iter().map(|o| o.reservation_id).collect();
        assert_eq!(ids, vec![soon, later]);
    }
}
