use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{EventId, LedgerEntryId};

use crate::Event;

/// Envelope for a committed event, carrying stream metadata.
///
/// - `sequence_number` is the aggregate version right after this event was
///   applied, so it is strictly increasing per ledger entry.
/// - `payload` is the typed domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,
    entry_id: LedgerEntryId,
    aggregate_type: String,

    /// Monotonically increasing position in the entry's stream.
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: EventId,
        entry_id: LedgerEntryId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            entry_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn entry_id(&self) -> LedgerEntryId {
        self.entry_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, copying its type name and business time.
    pub fn wrap(
        entry_id: LedgerEntryId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self::new(
            EventId::new(),
            entry_id,
            aggregate_type,
            sequence_number,
            payload.event_type(),
            payload.occurred_at(),
            payload,
        )
    }
}
