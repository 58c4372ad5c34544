use std::sync::Weak;

use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::token_queue::{QueueShared, SweepOutcome};

// Ticks every second per active site-key; keep quiet unless chasing a bug.
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_warn};

pub(super) struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(super) fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

pub(super) fn spawn_sweeper(
    queue: Weak<QueueShared>,
    period: Duration,
    cancel: CancellationToken,
) -> Sweeper {
    let handle = tokio::spawn(expiration_loop(queue, period, cancel.clone()));
    Sweeper { cancel, handle }
}

/// Sweeps the queue once per `period` until the backlog drains, the queue is
/// dropped or the loop is cancelled. A panicking predicate skips the tick.
async fn expiration_loop(queue: Weak<QueueShared>, period: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(shared) = queue.upgrade() else {
                    break;
                };
                let outcome = shared.sweep();
                let on_update = shared
                    .lock()
                    .filter
                    .as_ref()
                    .and_then(|filter| filter.on_update.clone());
                drop(shared);

                match outcome {
                    SweepOutcome::Swept { removed, remaining } => {
                        log_debug!("token sweep removed {removed}, backlog now {remaining}");
                        if let Some(on_update) = on_update {
                            on_update();
                        }
                        if remaining == 0 {
                            break;
                        }
                    }
                    SweepOutcome::Aborted => {
                        log_warn!("token expiration predicate panicked; retrying next tick");
                    }
                    SweepOutcome::NoFilter => break,
                }
            }
            _ = cancel.cancelled() => {
                log_debug!("token sweeper cancelled");
                break;
            }
        }
    }
}
