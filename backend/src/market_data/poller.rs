// =============================================================================
// Market Poller — fixed-cadence refresh task
// =============================================================================
//
// Runs as a background Tokio task:
//   1. Poll immediately on start.
//   2. Poll again every `interval` until detached.
//   3. Hand each PollOutcome to the `on_outcome` callback (the app uses it to
//      push the fresh snapshot into the view model).
//
// Each poll is awaited before the next tick is taken, so polls are strictly
// sequential.  Ticks missed while a slow poll was in flight are delayed, not
// burst.
//
// Detaching (or dropping) the PollerHandle cancels the schedule exactly once;
// no poll fires afterwards.  A response still in flight at that moment is
// dropped together with the task.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::market_data::data_source::{DataSource, PollOutcome};

/// Owner of a running poll schedule.
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Cancel the schedule. Consumes the handle, so it can only happen once.
    pub fn detach(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("market poller detached");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start polling `source` every `period`, first poll immediately.
pub fn spawn_poller<F>(source: Arc<DataSource>, period: Duration, on_outcome: F) -> PollerHandle
where
    F: Fn(PollOutcome) + Send + Sync + 'static,
{
    info!(interval_secs = period.as_secs(), "market poller started");

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = source.poll().await;
            debug!(?outcome, "scheduled market poll settled");
            on_outcome(outcome);
        }
    });

    PollerHandle { task: Some(task) }
}
