//! Reservations: expiring holds against available quantity.
//!
//! ```text
//!            ┌──> Fulfilled
//!            ├──> Released
//!  Active ───┼──> Expired     (explicit Expire only, never on read)
//!            └──> Cancelled
//! ```
//!
//! Every non-active state is terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Entity, InventoryError, InventoryResult, LedgerEntryId, OrderId, ReservationId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Released,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hold of `quantity` units for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    entry_id: LedgerEntryId,
    order_id: OrderId,
    quantity: i64,
    status: ReservationStatus,
    expires_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Reservation {
    pub(crate) fn open(
        id: ReservationId,
        entry_id: LedgerEntryId,
        order_id: OrderId,
        quantity: i64,
        expires_at: Option<DateTime<Utc>>,
        created_by: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entry_id,
            order_id,
            quantity,
            status: ReservationStatus::Active,
            expires_at,
            fulfilled_at: None,
            released_at: None,
            expired_at: None,
            cancelled_at: None,
            reason: None,
            created_by,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn entry_id(&self) -> LedgerEntryId {
        self.entry_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn fulfilled_at(&self) -> Option<DateTime<Utc>> {
        self.fulfilled_at
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Deadline has passed. Does not change state; only `Expire` does.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Remaining time before the deadline, clamped at zero. `None` without a deadline.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    /// Time between creation and closing (or `now` while still active).
    pub fn duration_held(&self, now: DateTime<Utc>) -> Duration {
        let end = self.closed_at().unwrap_or(now);
        end - self.created_at
    }

    /// Timestamp of the terminal transition, if any.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ReservationStatus::Active => None,
            ReservationStatus::Fulfilled => self.fulfilled_at,
            ReservationStatus::Released => self.released_at,
            ReservationStatus::Expired => self.expired_at,
            ReservationStatus::Cancelled => self.cancelled_at,
        }
    }

    /// Validate a transition out of `Active` without performing it.
    pub fn check_transition(
        &self,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> InventoryResult<()> {
        if to == ReservationStatus::Active {
            return Err(InventoryError::invalid_state(format!(
                "reservation {} cannot be reopened",
                self.id
            )));
        }
        if self.status == ReservationStatus::Fulfilled && to == ReservationStatus::Cancelled {
            return Err(InventoryError::invalid_state(format!(
                "reservation {} is fulfilled; its stock has already left",
                self.id
            )));
        }
        if self.status.is_terminal() {
            return Err(InventoryError::invalid_state(format!(
                "reservation {} is {}, cannot move to {}",
                self.id, self.status, to
            )));
        }

        match to {
            ReservationStatus::Fulfilled if self.is_expired(now) => {
                Err(InventoryError::invalid_state(format!(
                    "reservation {} passed its deadline and can no longer be fulfilled",
                    self.id
                )))
            }
            ReservationStatus::Expired => match self.expires_at {
                None => Err(InventoryError::invalid_state(format!(
                    "reservation {} has no expiry deadline",
                    self.id
                ))),
                Some(deadline) if now <= deadline => Err(InventoryError::invalid_state(format!(
                    "reservation {} does not expire until {deadline}",
                    self.id
                ))),
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Validate moving the deadline of an active reservation.
    pub fn check_extend(
        &self,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<()> {
        if !self.is_active() {
            return Err(InventoryError::invalid_state(format!(
                "reservation {} is {}, only active reservations can be extended",
                self.id, self.status
            )));
        }
        if new_expires_at <= now {
            return Err(InventoryError::validation(
                "new expiry time must be in the future",
            ));
        }
        Ok(())
    }

    /// Perform a transition already accepted by `check_transition`.
    pub(crate) fn close(&mut self, to: ReservationStatus, at: DateTime<Utc>, reason: Option<String>) {
        debug_assert!(self.is_active(), "closing a terminal reservation");
        self.status = to;
        match to {
            ReservationStatus::Fulfilled => self.fulfilled_at = Some(at),
            ReservationStatus::Released => self.released_at = Some(at),
            ReservationStatus::Expired => self.expired_at = Some(at),
            ReservationStatus::Cancelled => self.cancelled_at = Some(at),
            ReservationStatus::Active => {}
        }
        if reason.is_some() {
            self.reason = reason;
        }
        self.updated_at = at;
    }

    pub(crate) fn extend(&mut self, new_expires_at: DateTime<Utc>, at: DateTime<Utc>) {
        self.expires_at = Some(new_expires_at);
        self.updated_at = at;
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(expires_in: Option<Duration>, now: DateTime<Utc>) -> Reservation {
        Reservation::open(
            ReservationId::new(),
            LedgerEntryId::new(),
            OrderId::new(),
            3,
            expires_in.map(|d| now + d),
            None,
            now,
        )
    }

    #[test]
    fn expired_predicate_is_strictly_after_deadline() {
        let now = Utc::now();
        let r = reservation(Some(Duration::minutes(10)), now);
        assert!(!r.is_expired(now + Duration::minutes(10)));
        assert!(r.is_expired(now + Duration::minutes(10) + Duration::seconds(1)));
        assert!(r.is_active(), "reading the predicate must not change state");

        let forever = reservation(None, now);
        assert!(!forever.is_expired(now + Duration::days(365)));
    }

    #[test]
    fn expire_requires_a_passed_deadline() {
        let now = Utc::now();
        let r = reservation(Some(Duration::minutes(10)), now);
        assert!(matches!(
            r.check_transition(ReservationStatus::Expired, now),
            Err(InventoryError::InvalidState(_))
        ));
        assert!(
            r.check_transition(ReservationStatus::Expired, now + Duration::minutes(11))
                .is_ok()
        );

        let forever = reservation(None, now);
        assert!(matches!(
            forever.check_transition(ReservationStatus::Expired, now + Duration::days(1)),
            Err(InventoryError::InvalidState(_))
        ));
    }

    #[test]
    fn terminal_states_are_final() {
        let now = Utc::now();
        for terminal in [
            ReservationStatus::Fulfilled,
            ReservationStatus::Released,
            ReservationStatus::Expired,
            ReservationStatus::Cancelled,
        ] {
            let mut r = reservation(None, now);
            r.close(terminal, now, None);
            for to in [
                ReservationStatus::Active,
                ReservationStatus::Fulfilled,
                ReservationStatus::Released,
                ReservationStatus::Expired,
                ReservationStatus::Cancelled,
            ] {
                assert!(
                    matches!(r.check_transition(to, now), Err(InventoryError::InvalidState(_))),
                    "{terminal} -> {to} must be rejected"
                );
            }
        }
    }

    #[test]
    fn cannot_fulfill_past_deadline() {
        let now = Utc::now();
        let r = reservation(Some(Duration::minutes(1)), now);
        assert!(r.check_transition(ReservationStatus::Fulfilled, now).is_ok());
        assert!(matches!(
            r.check_transition(ReservationStatus::Fulfilled, now + Duration::minutes(2)),
            Err(InventoryError::InvalidState(_))
        ));
    }

    #[test]
    fn close_stamps_exactly_one_timestamp() {
        let now = Utc::now();
        let later = now + Duration::minutes(3);
        let mut r = reservation(None, now);
        r.close(ReservationStatus::Released, later, Some("customer changed mind".into()));

        assert_eq!(r.status(), ReservationStatus::Released);
        assert_eq!(r.released_at(), Some(later));
        assert_eq!(r.fulfilled_at(), None);
        assert_eq!(r.closed_at(), Some(later));
        assert_eq!(r.reason(), Some("customer changed mind"));
        assert_eq!(r.duration_held(later + Duration::hours(1)), Duration::minutes(3));
    }

    #[test]
    fn time_until_expiry_clamps_at_zero() {
        let now = Utc::now();
        let r = reservation(Some(Duration::minutes(5)), now);
        assert_eq!(r.time_until_expiry(now), Some(Duration::minutes(5)));
        assert_eq!(
            r.time_until_expiry(now + Duration::hours(1)),
            Some(Duration::zero())
        );
    }

    #[test]
    fn extend_only_forward_and_only_while_active() {
        let now = Utc::now();
        let mut r = reservation(Some(Duration::minutes(5)), now);
        assert!(matches!(
            r.check_extend(now - Duration::minutes(1), now),
            Err(InventoryError::Validation(_))
        ));
        assert!(r.check_extend(now + Duration::hours(1), now).is_ok());

        r.close(ReservationStatus::Cancelled, now, None);
        assert!(matches!(
            r.check_extend(now + Duration::hours(1), now),
            Err(InventoryError::InvalidState(_))
        ));
    }
}
