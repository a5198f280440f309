//! Process wiring: config → store, bus, clock, control component, sweeper.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use stockledger_core::SystemClock;
use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockledger_inventory::InventoryEvent;

use crate::config::{ConfigError, InventoryConfig};
use crate::control::InventoryControl;
use crate::store::InMemoryLedgerStore;
use crate::sweeper::{ExpirySweeper, ExpirySweeperConfig, ExpirySweeperHandle, SweeperStats};

pub type LedgerBus = InMemoryEventBus<EventEnvelope<InventoryEvent>>;

/// Control component over the in-process store and bus with the wall clock.
pub type LocalInventoryControl =
    InventoryControl<Arc<InMemoryLedgerStore>, Arc<LedgerBus>, SystemClock>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start expiry sweeper: {0}")]
    Spawn(#[from] io::Error),
}

/// A running inventory service: control component plus its expiry sweeper.
#[derive(Debug)]
pub struct InventoryService {
    config: InventoryConfig,
    control: Arc<LocalInventoryControl>,
    sweeper: Option<ExpirySweeperHandle>,
}

impl InventoryService {
    /// Load configuration, initialise logging, and start the service.
    pub fn start(config_path: Option<&Path>) -> Result<Self, ServiceError> {
        let config = InventoryConfig::load(config_path)?;
        stockledger_observability::init(config.log_format);
        Self::from_config(config)
    }

    pub fn from_config(config: InventoryConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let control = Arc::new(InventoryControl::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(LedgerBus::new()),
            SystemClock,
            config.control_settings()?,
        ));

        let sweeper = ExpirySweeper::new(control.clone()).spawn(
            ExpirySweeperConfig::default().with_interval(config.sweep_interval()),
        )?;

        info!(
            lock_timeout_ms = config.lock_timeout_ms,
            sweep_interval_ms = config.sweep_interval_ms,
            default_reservation_ttl_secs = config.default_reservation_ttl_secs,
            "inventory service started"
        );

        Ok(Self {
            config,
            control,
            sweeper: Some(sweeper),
        })
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<LocalInventoryControl> {
        &self.control
    }

    /// Subscribe to committed inventory events.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<InventoryEvent>> {
        self.control.bus().subscribe()
    }

    /// Subscribe to committed events whose type starts with `event_type_prefix`,
    /// e.g. `"inventory.reservation."` for checkout observers.
    pub fn subscribe_to(
        &self,
        event_type_prefix: &str,
    ) -> Subscription<EventEnvelope<InventoryEvent>> {
        self.control.bus().subscribe_to_type(event_type_prefix)
    }

    pub fn sweeper_stats(&self) -> Option<SweeperStats> {
        self.sweeper.as_ref().map(|h| h.stats())
    }

    /// Stop the sweeper and wait for it.
    pub fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown();
        }
        info!("inventory service stopped");
    }
}
