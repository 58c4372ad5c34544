use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::debug;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::models::HarvestedToken;

use super::expiration::{spawn_sweeper, Sweeper};

pub type ExpirationPredicate = Arc<dyn Fn(&HarvestedToken) -> bool + Send + Sync>;
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub(super) struct ExpirationFilter {
    pub(super) keep: ExpirationPredicate,
    pub(super) interval: Duration,
    pub(super) on_update: Option<UpdateCallback>,
}

pub(super) struct QueueInner {
    backlog: VecDeque<HarvestedToken>,
    waiters: VecDeque<oneshot::Sender<HarvestedToken>>,
    pub(super) filter: Option<ExpirationFilter>,
    pub(super) sweeper: Option<Sweeper>,
}

pub(super) struct QueueShared {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Swept { removed: usize, remaining: usize },
    Aborted,
    NoFilter,
}

impl QueueShared {
    pub(super) fn lock(&self) -> MutexGuard<'_, QueueInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Applies the expiration predicate to the backlog. When the backlog ends
    /// up empty the sweeper slot is cleared so the next insert restarts it.
    pub(super) fn sweep(&self) -> SweepOutcome {
        let mut inner = self.lock();
        let Some(filter) = inner.filter.clone() else {
            return SweepOutcome::NoFilter;
        };

        let verdicts = catch_unwind(AssertUnwindSafe(|| {
            inner
                .backlog
                .iter()
                .map(|token| (filter.keep)(token))
                .collect::<Vec<bool>>()
        }));
        let Ok(verdicts) = verdicts else {
            return SweepOutcome::Aborted;
        };

        let before = inner.backlog.len();
        let mut verdicts = verdicts.into_iter();
        inner
            .backlog
            .retain(|_| verdicts.next().unwrap_or(true));
        let remaining = inner.backlog.len();

        if remaining == 0 {
            if let Some(sweeper) = inner.sweeper.take() {
                sweeper.stop();
            }
        }

        SweepOutcome::Swept {
            removed: before - remaining,
            remaining,
        }
    }
}

#[derive(Debug)]
pub enum NextToken {
    Ready(HarvestedToken),
    Pending(PendingToken),
}

impl NextToken {
    /// Waits for the token if it is not available yet. `None` means the
    /// request was dropped by the queue (e.g. [`TokenQueue::destroy`]).
    pub async fn resolve(self) -> Option<HarvestedToken> {
        match self {
            NextToken::Ready(token) => Some(token),
            NextToken::Pending(pending) => pending.wait().await,
        }
    }

    pub fn ready(self) -> Option<HarvestedToken> {
        match self {
            NextToken::Ready(token) => Some(token),
            NextToken::Pending(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct PendingToken {
    rx: oneshot::Receiver<HarvestedToken>,
}

impl PendingToken {
    pub async fn wait(self) -> Option<HarvestedToken> {
        self.rx.await.ok()
    }

    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Per-site-key store of harvested tokens.
///
/// Tokens come out oldest first. Consumers that ask while the backlog is empty
/// wait in line and are handed new tokens directly, ahead of the backlog.
#[derive(Clone)]
pub struct TokenQueue {
    shared: Arc<QueueShared>,
}

impl Default for TokenQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    backlog: VecDeque::new(),
                    waiters: VecDeque::new(),
                    filter: None,
                    sweeper: None,
                }),
            }),
        }
    }

    pub fn backlog_length(&self) -> usize {
        self.shared.lock().backlog.len()
    }

    pub fn line_length(&self) -> usize {
        let mut inner = self.shared.lock();
        inner.waiters.retain(|waiter| !waiter.is_closed());
        inner.waiters.len()
    }

    /// Hands the token to the longest-waiting consumer, or appends it to the
    /// backlog. Returns the backlog length afterwards.
    ///
    /// Starts the expiration sweeper when a filter is installed and it is not
    /// already running; this must then be called from within a tokio runtime.
    pub fn insert(&self, token: HarvestedToken) -> usize {
        let mut inner = self.shared.lock();

        let mut token = token;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(token) {
                Ok(()) => return inner.backlog.len(),
                Err(returned) => token = returned,
            }
        }

        inner.backlog.push_back(token);
        self.ensure_sweeper(&mut inner);
        inner.backlog.len()
    }

    pub fn next(&self) -> NextToken {
        let mut inner = self.shared.lock();
        inner.waiters.retain(|waiter| !waiter.is_closed());

        if inner.waiters.is_empty() {
            let keep = inner.filter.as_ref().map(|filter| filter.keep.clone());
            while let Some(token) = inner.backlog.pop_front() {
                let fresh = match &keep {
                    Some(keep) => catch_unwind(AssertUnwindSafe(|| keep(&token))).unwrap_or(true),
                    None => true,
                };
                if fresh {
                    return NextToken::Ready(token);
                }
                debug!("Discarding expired token for {}", token.site_key);
            }
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.push_back(tx);
        NextToken::Pending(PendingToken { rx })
    }

    /// Installs the expiration filter, replacing (and stopping) any previous
    /// one. `keep` returns `false` for tokens that must go; `on_update` runs
    /// after every completed sweep.
    pub fn add_expiration_filter(
        &self,
        keep: ExpirationPredicate,
        interval: Duration,
        on_update: Option<UpdateCallback>,
    ) {
        let mut inner = self.shared.lock();
        if let Some(previous) = inner.sweeper.take() {
            previous.stop();
        }
        inner.filter = Some(ExpirationFilter {
            keep,
            interval,
            on_update,
        });

        if !inner.backlog.is_empty() {
            self.ensure_sweeper(&mut inner);
        }
    }

    pub fn sweep(&self) -> SweepOutcome {
        self.shared.sweep()
    }

    pub fn is_sweeping(&self) -> bool {
        self.shared.lock().sweeper.is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.shared.lock();
        inner.backlog.clear();
        if let Some(sweeper) = inner.sweeper.take() {
            sweeper.stop();
        }
    }

    pub fn destroy(&self) {
        self.shared.lock().waiters.clear();
        self.clear();
    }

    fn ensure_sweeper(&self, inner: &mut QueueInner) {
        if inner.sweeper.is_some() {
            return;
        }
        let Some(filter) = &inner.filter else {
            return;
        };
        let cancel = CancellationToken::new();
        inner.sweeper = Some(spawn_sweeper(
            Arc::downgrade(&self.shared),
            filter.interval,
            cancel,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{Clock, ManualClock};
    use chrono::{Duration as ChronoDuration, Utc};

    fn token(name: &str, at: chrono::DateTime<Utc>) -> HarvestedToken {
        HarvestedToken::new(name, "x", "https://shop.example.com", at)
    }

    fn ttl_filter(clock: Arc<ManualClock>) -> ExpirationPredicate {
        Arc::new(move |token: &HarvestedToken| {
            token.is_fresh(clock.now(), ChronoDuration::seconds(120))
        })
    }

    #[test]
    fn tokens_come_out_oldest_first() {
        let queue = TokenQueue::new();
        let now = Utc::now();
        queue.insert(token("first", now));
        queue.insert(token("second", now));

        assert_eq!(queue.backlog_length(), 2);
        assert_eq!(queue.next().ready().unwrap().token, "first");
        assert_eq!(queue.next().ready().unwrap().token, "second");
        assert!(matches!(queue.next(), NextToken::Pending(_)));
    }

    #[tokio::test]
    async fn waiting_consumer_gets_the_next_insert_directly() {
        let queue = TokenQueue::new();
        let pending = queue.next();
        assert_eq!(queue.line_length(), 1);

        let backlog = queue.insert(token("direct", Utc::now()));
        assert_eq!(backlog, 0);
        assert_eq!(queue.line_length(), 0);
        assert_eq!(pending.resolve().await.unwrap().token, "direct");
    }

    #[tokio::test]
    async fn cancelled_consumers_are_skipped() {
        let queue = TokenQueue::new();
        let NextToken::Pending(first) = queue.next() else {
            panic!("expected a pending request");
        };
        let second = queue.next();
        first.cancel();
        assert_eq!(queue.line_length(), 1);

        queue.insert(token("t", Utc::now()));
        assert_eq!(second.resolve().await.unwrap().token, "t");
        assert_eq!(queue.backlog_length(), 0);
    }

    #[tokio::test]
    async fn destroy_fails_waiting_consumers() {
        let queue = TokenQueue::new();
        let pending = queue.next();
        queue.destroy();
        assert!(pending.resolve().await.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_tokens() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = TokenQueue::new();
        queue.add_expiration_filter(ttl_filter(clock.clone()), Duration::from_secs(1), None);

        let now = clock.now();
        queue.insert(token("stale", now - ChronoDuration::seconds(130)));
        queue.insert(token("fresh", now - ChronoDuration::seconds(10)));

        assert_eq!(
            queue.sweep(),
            SweepOutcome::Swept {
                removed: 1,
                remaining: 1
            }
        );
        assert_eq!(queue.backlog_length(), 1);
        assert_eq!(queue.next().ready().unwrap().token, "fresh");
    }

    #[tokio::test]
    async fn next_skips_tokens_expired_between_sweeps() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = TokenQueue::new();
        queue.add_expiration_filter(ttl_filter(clock.clone()), Duration::from_secs(1), None);

        queue.insert(token("old", clock.now()));
        queue.insert(token("new", clock.now() + ChronoDuration::seconds(60)));
        clock.advance(ChronoDuration::seconds(150));

        assert_eq!(queue.next().ready().unwrap().token, "new");
        assert_eq!(queue.backlog_length(), 0);
    }

    #[tokio::test]
    async fn panicking_predicate_aborts_the_sweep() {
        let queue = TokenQueue::new();
        queue.add_expiration_filter(
            Arc::new(|token: &HarvestedToken| {
                if token.token == "boom" {
                    panic!("predicate failure");
                }
                false
            }),
            Duration::from_secs(1),
            None,
        );
        queue.insert(token("a", Utc::now()));
        queue.insert(token("boom", Utc::now()));

        assert_eq!(queue.sweep(), SweepOutcome::Aborted);
        assert_eq!(queue.backlog_length(), 2);
    }

    #[test]
    fn sweep_without_filter_is_a_no_op() {
        let queue = TokenQueue::new();
        queue.insert(token("a", Utc::now()));
        assert_eq!(queue.sweep(), SweepOutcome::NoFilter);
        assert!(!queue.is_sweeping());
    }
}
