//! Movement log: the append-only audit trail of quantity changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, LedgerEntryId, MovementId, OrderId, SupplierId};

/// Kind of quantity change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Inbound,
    Outbound,
    Adjustment,
    Transfer,
    Return,
    Damage,
    Expiry,
    Promotion,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Inbound => "inbound",
            MovementType::Outbound => "outbound",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Return => "return",
            MovementType::Damage => "damage",
            MovementType::Expiry => "expiry",
            MovementType::Promotion => "promotion",
        }
    }

    /// Types that add to on-hand quantity.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementType::Inbound | MovementType::Return)
    }

    /// Types that take away from on-hand quantity.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            MovementType::Outbound
                | MovementType::Damage
                | MovementType::Expiry
                | MovementType::Promotion
        )
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of a quantity change.
///
/// `quantity_delta` is a magnitude; the direction comes from the type
/// (adjustments go whichever way the count moved). Fields are private and
/// there are no setters once a movement has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    id: MovementId,
    entry_id: LedgerEntryId,
    movement_type: MovementType,
    quantity_delta: i64,
    previous_qty: i64,
    new_qty: i64,
    reason: String,
    reference: Option<String>,
    order_id: Option<OrderId>,
    supplier_id: Option<SupplierId>,
    from_location: Option<String>,
    to_location: Option<String>,
    unit_cost: Option<u64>,
    total_cost: Option<u64>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl Movement {
    pub(crate) fn new(
        id: MovementId,
        entry_id: LedgerEntryId,
        movement_type: MovementType,
        previous_qty: i64,
        new_qty: i64,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entry_id,
            movement_type,
            quantity_delta: (new_qty - previous_qty).abs(),
            previous_qty,
            new_qty,
            reason: reason.into(),
            reference: None,
            order_id: None,
            supplier_id: None,
            from_location: None,
            to_location: None,
            unit_cost: None,
            total_cost: None,
            created_by: None,
            created_at,
        }
    }

    pub(crate) fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub(crate) fn with_order(mut self, order_id: Option<OrderId>) -> Self {
        self.order_id = order_id;
        self
    }

    pub(crate) fn with_supplier(mut self, supplier_id: Option<SupplierId>) -> Self {
        self.supplier_id = supplier_id;
        self
    }

    pub(crate) fn with_locations(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from_location = from.filter(|s| !s.is_empty());
        self.to_location = to.filter(|s| !s.is_empty());
        self
    }

    pub(crate) fn with_unit_cost(mut self, unit_cost: Option<u64>) -> Self {
        self.unit_cost = unit_cost;
        self.total_cost =
            unit_cost.map(|cost| cost.saturating_mul(self.quantity_delta.unsigned_abs()));
        self
    }

    pub(crate) fn with_actor(mut self, actor: Option<String>) -> Self {
        self.created_by = actor;
        self
    }

    pub fn entry_id(&self) -> LedgerEntryId {
        self.entry_id
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn quantity_delta(&self) -> i64 {
        self.quantity_delta
    }

    pub fn previous_qty(&self) -> i64 {
        self.previous_qty
    }

    pub fn new_qty(&self) -> i64 {
        self.new_qty
    }

    /// `new_qty - previous_qty`.
    pub fn signed_delta(&self) -> i64 {
        self.new_qty - self.previous_qty
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn from_location(&self) -> Option<&str> {
        self.from_location.as_deref()
    }

    pub fn to_location(&self) -> Option<&str> {
        self.to_location.as_deref()
    }

    pub fn unit_cost(&self) -> Option<u64> {
        self.unit_cost
    }

    pub fn total_cost(&self) -> Option<u64> {
        self.total_cost
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_inbound(&self) -> bool {
        self.movement_type.is_inbound()
    }

    pub fn is_outbound(&self) -> bool {
        self.movement_type.is_outbound()
    }

    /// Delta magnitude and direction agree with the movement type.
    pub fn is_consistent(&self) -> bool {
        let delta = self.signed_delta();
        if self.quantity_delta != delta.abs() {
            return false;
        }
        match self.movement_type {
            t if t.is_inbound() => delta >= 0,
            t if t.is_outbound() => delta <= 0,
            MovementType::Transfer => delta == 0,
            _ => true,
        }
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Ordered, append-only sequence of movements for one ledger entry.
///
/// Only the ledger entry itself can append (crate-private); everyone else reads.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementLog {
    entries: Vec<Movement>,
}

impl MovementLog {
    pub(crate) fn append(&mut self, movement: Movement) {
        self.entries.push(movement);
    }

    pub fn all(&self) -> &[Movement] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Movement> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Movement> {
        self.entries.last()
    }

    pub fn by_type(&self, movement_type: MovementType) -> impl Iterator<Item = &Movement> {
        self.entries
            .iter()
            .filter(move |m| m.movement_type == movement_type)
    }

    /// Movements with `from <= created_at <= to`.
    pub fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &Movement> {
        self.entries
            .iter()
            .filter(move |m| m.created_at >= from && m.created_at <= to)
    }

    /// Whether `self` keeps every record of `earlier`, unchanged and in order.
    pub fn extends(&self, earlier: &MovementLog) -> bool {
        self.entries.len() >= earlier.entries.len()
            && self.entries[..earlier.entries.len()] == earlier.entries[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn movement(t: MovementType, prev: i64, new: i64, at: DateTime<Utc>) -> Movement {
        Movement::new(MovementId::new(), LedgerEntryId::new(), t, prev, new, "test", at)
    }

    #[test]
    fn delta_is_a_magnitude() {
        let m = movement(MovementType::Adjustment, 20, 12, Utc::now());
        assert_eq!(m.quantity_delta(), 8);
        assert_eq!(m.signed_delta(), -8);
        assert!(m.is_consistent());
    }

    #[test]
    fn direction_must_match_type() {
        let now = Utc::now();
        assert!(movement(MovementType::Inbound, 0, 5, now).is_consistent());
        assert!(!movement(MovementType::Inbound, 5, 0, now).is_consistent());
        assert!(movement(MovementType::Damage, 5, 3, now).is_consistent());
        assert!(!movement(MovementType::Outbound, 3, 5, now).is_consistent());
        assert!(!movement(MovementType::Transfer, 3, 5, now).is_consistent());
    }

    #[test]
    fn total_cost_follows_delta() {
        let m = movement(MovementType::Inbound, 10, 14, Utc::now()).with_unit_cost(Some(250));
        assert_eq!(m.total_cost(), Some(1000));
    }

    #[test]
    fn empty_locations_are_dropped() {
        let m = movement(MovementType::Return, 0, 1, Utc::now())
            .with_locations(Some(String::new()), Some("A-01".into()));
        assert_eq!(m.from_location(), None);
        assert_eq!(m.to_location(), Some("A-01"));
    }

    #[test]
    fn log_queries_filter_by_type_and_time() {
        let t0 = Utc::now();
        let mut log = MovementLog::default();
        log.append(movement(MovementType::Inbound, 0, 10, t0));
        log.append(movement(MovementType::Outbound, 10, 7, t0 + Duration::hours(1)));
        log.append(movement(MovementType::Inbound, 7, 9, t0 + Duration::hours(2)));

        assert_eq!(log.by_type(MovementType::Inbound).count(), 2);
        assert_eq!(
            log.between(t0 + Duration::minutes(30), t0 + Duration::hours(2))
                .count(),
            2
        );
        assert_eq!(log.last().map(|m| m.new_qty()), Some(9));
    }

    #[test]
    fn extends_requires_unchanged_prefix() {
        let now = Utc::now();
        let mut earlier = MovementLog::default();
        earlier.append(movement(MovementType::Inbound, 0, 10, now));

        let mut later = earlier.clone();
        later.append(movement(MovementType::Outbound, 10, 4, now));
        assert!(later.extends(&earlier));
        assert!(!earlier.extends(&later));

        let mut rewritten = MovementLog::default();
        rewritten.append(movement(MovementType::Inbound, 0, 11, now));
        rewritten.append(movement(MovementType::Outbound, 11, 4, now));
        assert!(!rewritten.extends(&earlier));
    }
}
