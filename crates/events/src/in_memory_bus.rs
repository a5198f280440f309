//! In-process event bus.
//!
//! Subscribers may register a filter so that, for example, a reporting
//! consumer only sees reservation transitions of the ledger stream.

use std::convert::Infallible;
use std::sync::{Arc, mpsc};

use parking_lot::Mutex;

use stockledger_core::LedgerEntryId;

use crate::bus::{EventBus, Subscription};
use crate::envelope::EventEnvelope;

type Filter<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

struct Subscriber<M> {
    tx: mpsc::Sender<M>,
    filter: Option<Filter<M>>,
}

impl<M> Subscriber<M> {
    fn wants(&self, message: &M) -> bool {
        self.filter.as_ref().is_none_or(|f| f(message))
    }
}

/// In-memory pub/sub bus.
///
/// - No IO, no async
/// - Best-effort fan-out; subscribers whose receiving end was dropped are pruned
///   on the next publish they would have received
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered subscribers not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Subscribe to the messages for which `filter` returns true.
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&M) -> bool + Send + Sync + 'static,
    ) -> Subscription<M> {
        self.register(Some(Arc::new(filter)))
    }

    fn register(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(Subscriber { tx, filter });
        Subscription::new(rx)
    }
}

impl<E> InMemoryEventBus<EventEnvelope<E>>
where
    E: 'static,
{
    /// Subscribe to events whose type starts with `prefix`,
    /// e.g. `"inventory.reservation."`.
    pub fn subscribe_to_type(
        &self,
        prefix: impl Into<String>,
    ) -> Subscription<EventEnvelope<E>> {
        let prefix = prefix.into();
        self.subscribe_filtered(move |env| env.event_type().starts_with(&prefix))
    }

    /// Subscribe to the stream of a single ledger entry.
    pub fn subscribe_to_entry(&self, entry_id: LedgerEntryId) -> Subscription<EventEnvelope<E>> {
        self.subscribe_filtered(move |env| env.entry_id() == entry_id)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        self.subscribers
            .lock()
            .retain(|sub| !sub.wants(&message) || sub.tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.register(None)
    }
}
