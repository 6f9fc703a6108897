//! PendingSweeper processor.
//!
//! The PendingSweeper is responsible for:
//! - Waking up on a fixed interval
//! - Polling the provider for every pending donation older than `poll_after`
//!   that already has a provider reference (mobile money has no reliable
//!   webhook, and card webhooks can get lost)
//! - Expiring donations still pending after `expire_after` (`pending → failed`,
//!   reason "expired"), including orphans that never got a provider reference.
//!   A donation whose status poll failed is left pending for the next sweep.
//!
//! Donations are never deleted.

use crate::engine::ReconciliationEngine;
use crate::store::{StoreError, TransitionOutcome};
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const EXPIRED_REASON: &str = "expired";

/// Errors that abort a whole sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub poll_after: Duration,
    pub expire_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            poll_after: Duration::from_secs(30),
            expire_after: Duration::from_secs(60 * 60),
        }
    }
}

/// One sweep, evaluated as of `now`.
#[derive(Debug, Clone, Copy)]
pub struct SweepTick {
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Provider status checks issued.
    pub polled: usize,
    /// Donations that a poll moved to a terminal state.
    pub settled: usize,
    pub expired: usize,
    /// Per-donation failures; the sweep carried on.
    pub errors: usize,
}

pub struct PendingSweeper {
    engine: Arc<ReconciliationEngine>,
    config: SweeperConfig,
}

impl PendingSweeper {
    pub fn new(engine: Arc<ReconciliationEngine>, config: SweeperConfig) -> Self {
        Self { engine, config }
    }

    /// Sweep once, now.
    pub async fn sweep_once(&self) -> Result<SweepReport, SweepError> {
        self.process(SweepTick {
            now: OffsetDateTime::now_utc(),
        })
        .await
    }

    /// Run until shutdown is signalled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "PendingSweeper started"
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("PendingSweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report == SweepReport::default() => {
                            debug!("PendingSweeper found nothing to do");
                        }
                        Ok(report) => {
                            info!(
                                polled = report.polled,
                                settled = report.settled,
                                expired = report.expired,
                                errors = report.errors,
                                "PendingSweeper finished a sweep"
                            );
                        }
                        Err(e) => error!(error = %e, "PendingSweeper sweep failed"),
                    }
                }
            }
        }

        info!("PendingSweeper shutdown complete");
    }
}

impl Processor<SweepTick> for PendingSweeper {
    type Output = SweepReport;
    type Error = SweepError;

    async fn process(&self, tick: SweepTick) -> Result<SweepReport, SweepError> {
        let poll_cutoff = tick.now - self.config.poll_after;
        let expire_cutoff = tick.now - self.config.expire_after;
        let candidates = self
            .engine
            .store()
            .list_pending_created_before(poll_cutoff)
            .await?;

        let mut report = SweepReport::default();
        for donation in candidates {
            // Only a donation whose status is known to be pending may expire.
            let mut may_expire = true;

            if let Some(reference) = donation.provider_reference.as_deref() {
                report.polled += 1;
                match self.engine.poll_status(reference).await {
                    Ok(current) if current.state.is_terminal() => {
                        report.settled += 1;
                        may_expire = false;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        report.errors += 1;
                        may_expire = false;
                        warn!(donation_id = %donation.id, error = %e, "Status poll failed, not expiring");
                    }
                }
            }

            if may_expire && donation.created_at < expire_cutoff {
                match self.engine.expire(donation.id, EXPIRED_REASON).await {
                    Ok(TransitionOutcome::Applied(_)) => report.expired += 1,
                    Ok(TransitionOutcome::Rejected(_)) => {}
                    Err(e) => {
                        report.errors += 1;
                        warn!(donation_id = %donation.id, error = %e, "Failed to expire donation");
                    }
                }
            }
        }
        Ok(report)
    }
}
