//! Background reservation-expiry sweeper.

use std::io;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use stockledger_core::Clock;
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::InventoryEvent;

use crate::control::{ControlError, InventoryControl, SweepReport};
use crate::store::LedgerStore;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// Pause between passes.
    pub interval: Duration,
    /// Thread name, also used in logs.
    pub name: String,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            name: "expiry-sweeper".to_string(),
        }
    }
}

impl ExpirySweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Sweeper runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweeperStats {
    pub passes: u64,
    pub reservations_expired: u64,
    pub reservations_skipped: u64,
    pub reservations_contended: u64,
    pub reservations_failed: u64,
    /// Passes that could not even list overdue reservations.
    pub pass_errors: u64,
    pub last_report: Option<SweepReport>,
    pub uptime_secs: u64,
}

impl SweeperStats {
    fn record(&mut self, report: &SweepReport) {
        self.reservations_expired += report.expired as u64;
        self.reservations_skipped += report.skipped as u64;
        self.reservations_contended += report.contended as u64;
        self.reservations_failed += report.failed as u64;
        self.last_report = Some(*report);
    }
}

/// Handle to control a running sweeper.
///
/// Dropping the handle also stops the thread (its shutdown channel disconnects).
#[derive(Debug)]
pub struct ExpirySweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl ExpirySweeperHandle {
    /// Request graceful shutdown and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats.lock().clone()
    }
}

/// Periodically expires overdue reservations through the control component.
pub struct ExpirySweeper<S, B, C> {
    control: Arc<InventoryControl<S, B, C>>,
}

impl<S, B, C> ExpirySweeper<S, B, C>
where
    S: LedgerStore + 'static,
    B: EventBus<EventEnvelope<InventoryEvent>> + 'static,
    C: Clock + 'static,
{
    pub fn new(control: Arc<InventoryControl<S, B, C>>) -> Self {
        Self { control }
    }

    /// One pass, synchronously (for tests or an external scheduler).
    pub fn run_once(&self) -> Result<SweepReport, ControlError> {
        self.control.sweep_expired()
    }

    /// Spawn the sweeper in a background thread.
    pub fn spawn(self, config: ExpirySweeperConfig) -> io::Result<ExpirySweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                sweeper_loop(self, config, shutdown_rx, stats_clone);
            })?;

        Ok(ExpirySweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn sweeper_loop<S, B, C>(
    sweeper: ExpirySweeper<S, B, C>,
    config: ExpirySweeperConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SweeperStats>>,
) where
    S: LedgerStore + 'static,
    B: EventBus<EventEnvelope<InventoryEvent>> + 'static,
    C: Clock + 'static,
{
    info!(sweeper = %config.name, interval_ms = config.interval.as_millis() as u64, "expiry sweeper started");
    let start_time = Instant::now();

    loop {
        match shutdown_rx.recv_timeout(config.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            // Explicit shutdown or the handle was dropped.
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let outcome = sweeper.run_once();

        let mut s = stats.lock();
        s.passes += 1;
        s.uptime_secs = start_time.elapsed().as_secs();
        match outcome {
            Ok(report) => {
                debug!(sweeper = %config.name, ?report, "sweep pass complete");
                s.record(&report);
            }
            Err(e) => {
                error!(sweeper = %config.name, error = %e, "sweep pass failed");
                s.pass_errors += 1;
            }
        }
    }

    info!(sweeper = %config.name, "expiry sweeper stopped");
}
