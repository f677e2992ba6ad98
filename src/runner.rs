//! The polling loop behind `gator agg`.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, FetchError, Result};
use crate::scheduler::{CycleReport, Scheduler};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Runner {
    scheduler: Scheduler,
    shutdown_grace: Duration,
}

impl Runner {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long a cycle already in flight may keep running after a stop request.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Run one cycle now and one per `interval` after that, never overlapping.
    ///
    /// Returns `Ok(())` once `cancel` fires, or the error of the first cycle
    /// that fails. A zero interval is rejected before any cycle runs.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config(
                "polling interval must be positive".to_string(),
            ));
        }

        info!("Collecting feeds every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stop requested, feed collection finished");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(report) => {
                    info!(
                        "Cycle complete for '{}': {} new posts",
                        report.feed_name, report.ingest.created
                    );
                }
                Err(Error::Fetch(FetchError::Cancelled { url })) if cancel.is_cancelled() => {
                    warn!("Abandoned fetch of {} after the shutdown grace period", url);
                    return Ok(());
                }
                Err(e) => {
                    error!("Feed collection stopped: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn run_cycle(&self, stop: &CancellationToken) -> Result<CycleReport> {
        let cycle_cancel = CancellationToken::new();
        let cycle = self.scheduler.schedule_next(&cycle_cancel);
        tokio::pin!(cycle);

        let finished = tokio::select! {
            result = &mut cycle => Some(result),
            _ = stop.cancelled() => None,
        };

        match finished {
            Some(result) => result,
            None => {
                info!(
                    "Stop requested, giving the current cycle up to {:?} to finish",
                    self.shutdown_grace
                );
                match tokio::time::timeout(self.shutdown_grace, &mut cycle).await {
                    Ok(result) => result,
                    Err(_) => {
                        cycle_cancel.cancel();
                        cycle.await
                    }
                }
            }
        }
    }
}
