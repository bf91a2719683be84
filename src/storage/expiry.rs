//! Background Expiry Sweeper
//!
//! `StorageEngine::get` already hides expired entries, but only removes the
//! ones somebody reads. This task reclaims the rest ("active expiry").
//!
//! Each wake-up runs one *cycle*: a series of small batches through
//! [`StorageEngine::expire_batch`], each under its own short lock hold. A
//! cycle keeps going while batches come back mostly expired, and stops at a
//! fixed batch budget so a burst of expiring keys is spread over several
//! cycles instead of one long one.
//!
//! Pacing between cycles:
//!
//! | last cycle                 | next pause          |
//! |----------------------------|---------------------|
//! | used its whole budget      | `busy_interval`     |
//! | expired something          | `active_interval`   |
//! | expired nothing            | doubles, up to `idle_interval` |

use crate::storage::engine::{ExpireBatch, StorageEngine, DEFAULT_EXPIRE_BATCH};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Tuning for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Pause after a cycle that ran out of budget (default: 10ms)
    pub busy_interval: Duration,

    /// Pause after a cycle that expired some keys (default: 100ms)
    pub active_interval: Duration,

    /// Longest pause while nothing expires (default: 1s)
    pub idle_interval: Duration,

    /// TTL records checked per lock acquisition
    pub batch_size: usize,

    /// Run another batch while more than this fraction of the last one expired
    pub repeat_ratio: f64,

    /// Batches allowed in one cycle
    pub max_batches_per_cycle: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            busy_interval: Duration::from_millis(10),
            active_interval: Duration::from_millis(100),
            idle_interval: Duration::from_secs(1),
            batch_size: DEFAULT_EXPIRE_BATCH,
            repeat_ratio: 0.25,
            max_batches_per_cycle: 16,
        }
    }
}

/// Totals for one sweeper cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batches: usize,
    pub examined: usize,
    pub expired: usize,
    /// The cycle stopped because it hit `max_batches_per_cycle`
    pub out_of_budget: bool,
}

impl CycleReport {
    fn add(&mut self, batch: ExpireBatch) {
        self.batches += 1;
        self.examined += batch.examined;
        self.expired += batch.expired;
    }
}

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    stop_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper onto the current Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        info!(
            batch_size = config.batch_size,
            max_batches = config.max_batches_per_cycle,
            "Starting expiry sweeper"
        );
        tokio::spawn(sweeper_loop(engine, config, stop_rx));
        Self { stop_tx }
    }

    /// Asks the task to exit. Calling this more than once is harmless.
    pub fn stop(&self) {
        let was_stopped = self.stop_tx.send_replace(true);
        if !was_stopped {
            info!("Expiry sweeper stopping");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns a sweeper with [`ExpiryConfig::default`].
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut pause = config.active_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                debug!("Expiry sweeper exited");
                return;
            }
        }

        let report = run_cycle(&engine, &config).await;
        pause = next_pause(&config, pause, &report);

        if report.expired > 0 {
            debug!(
                expired = report.expired,
                examined = report.examined,
                batches = report.batches,
                next_pause_ms = pause.as_millis() as u64,
                "Expired keys reclaimed"
            );
        } else {
            trace!(
                examined = report.examined,
                next_pause_ms = pause.as_millis() as u64,
                "Sweep found nothing"
            );
        }
    }
}

/// Runs batches until one comes back mostly live, the queue is empty, or
/// the cycle budget is spent. Other tasks get a turn between batches.
async fn run_cycle(engine: &StorageEngine, config: &ExpiryConfig) -> CycleReport {
    let mut report = CycleReport::default();

    while report.batches < config.max_batches_per_cycle {
        let batch = engine.expire_batch(config.batch_size);
        report.add(batch);

        if batch.examined < config.batch_size || batch.expired_ratio() <= config.repeat_ratio {
            return report;
        }
        tokio::task::yield_now().await;
    }

    report.out_of_budget = true;
    report
}

fn next_pause(config: &ExpiryConfig, current: Duration, report: &CycleReport) -> Duration {
    if report.out_of_budget {
        config.busy_interval
    } else if report.expired > 0 {
        config.active_interval
    } else {
        (current * 2)
            .max(config.active_interval)
            .min(config.idle_interval)
    }
}
