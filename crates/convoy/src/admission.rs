//! Admission control for conversation work.
//!
//! Every unit of work runs under a key (the conversation id). The controller
//! guarantees two things at once:
//!
//! - work for the same key runs one at a time, in arrival order;
//! - no more than `max_concurrent` units run across all keys.
//!
//! Arrival order is fixed by [`AdmissionController::enqueue`], which is
//! synchronous: it hands out the key's next turn number before any task is
//! spawned or polled. A ticket then waits for its turn, then for a global
//! permit (a fair semaphore). Waiting for the permit while holding the turn is
//! what keeps per-key ordering independent of global capacity.
//!
//! ```ignore
//! let admission = AdmissionController::new(10);
//! let ticket = admission.enqueue("chat-42")?; // position taken here
//! tokio::spawn(async move { ticket.run(|| async { handle(message).await }).await });
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tracing::debug;

/// Default global ceiling on concurrently running conversations.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Errors raised by the controller itself (never by the admitted work).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission key must not be empty")]
    EmptyKey,

    #[error("admission controller is closed")]
    Closed,
}

/// Point-in-time view of the controller's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    /// Units currently executing.
    pub active: usize,
    /// Units waiting for their turn or for a global permit.
    pub queued: usize,
    /// Distinct keys with in-flight work (running or waiting).
    pub active_keys: usize,
    /// Configured global ceiling.
    pub max_concurrent: usize,
}

/// Per-key turn bookkeeping. Only touched through the map's entry guards.
struct KeySlot {
    /// Turn number handed to the next ticket.
    next: u64,
    /// Turn currently allowed to run.
    serving: u64,
    /// Turns whose tickets were dropped before their turn came up.
    abandoned: BTreeSet<u64>,
    /// Tickets holding or waiting for a turn.
    pending: usize,
    serving_tx: watch::Sender<u64>,
}

impl KeySlot {
    fn new() -> Self {
        let (serving_tx, _) = watch::channel(0);
        Self {
            next: 0,
            serving: 0,
            abandoned: BTreeSet::new(),
            pending: 0,
            serving_tx,
        }
    }

    /// Move to the next live turn and wake its ticket.
    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
        self.serving_tx.send_replace(self.serving);
    }
}

struct Inner {
    slots: DashMap<String, KeySlot>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    active: AtomicUsize,
    queued: AtomicUsize,
}

/// Per-key serialization plus a global concurrency ceiling.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller allowing `max_concurrent` units to run at once.
    ///
    /// A ceiling of zero would admit nothing, so it is raised to one.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                permits: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
            }),
        }
    }

    /// Take the next position in `key`'s queue.
    ///
    /// Tickets for one key run in the order this method was called, no matter
    /// which task later awaits them or when.
    pub fn enqueue(&self, key: &str) -> Result<Ticket, AdmissionError> {
        if key.is_empty() {
            return Err(AdmissionError::EmptyKey);
        }

        let (turn, serving_rx, depth) = {
            let mut slot = self
                .inner
                .slots
                .entry(key.to_string())
                .or_insert_with(KeySlot::new);
            let turn = slot.next;
            slot.next += 1;
            slot.pending += 1;
            (turn, slot.serving_tx.subscribe(), slot.pending)
        };
        self.inner.queued.fetch_add(1, Ordering::SeqCst);

        if depth > 1 {
            debug!(key = %key, queue_depth = depth, "Queued behind in-flight work for key");
        }

        Ok(Ticket {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            turn,
            serving_rx,
            permit: None,
        })
    }

    /// Run `work` under `key`, subject to the global ceiling.
    ///
    /// Resolves with the work's own output. The only error the controller
    /// raises for a live instance is an empty key.
    /// If `work` panics or the returned future is dropped early, the permit,
    /// the turn and the counters are released before unwinding continues.
    pub async fn acquire_lock<F, Fut, T>(&self, key: &str, work: F) -> Result<T, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.enqueue(key)?.run(work).await
    }

    /// Snapshot of the live counters. Never blocks.
    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            active: self.inner.active.load(Ordering::SeqCst),
            queued: self.inner.queued.load(Ordering::SeqCst),
            active_keys: self.inner.slots.len(),
            max_concurrent: self.inner.max_concurrent,
        }
    }

    /// Number of units running or waiting under `key`.
    pub fn queue_depth(&self, key: &str) -> usize {
        self.inner
            .slots
            .get(key)
            .map(|slot| slot.pending)
            .unwrap_or(0)
    }

    /// Configured global ceiling.
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// A unit's place in its key's queue and, once running, its global permit.
///
/// All bookkeeping is undone in `Drop`, so release happens on every exit
/// path, including a ticket that is dropped without ever being run.
pub struct Ticket {
    inner: Arc<Inner>,
    key: String,
    turn: u64,
    serving_rx: watch::Receiver<u64>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Ticket {
    /// Wait for this ticket's turn and a global permit, then run `work`.
    pub async fn run<F, Fut, T>(mut self, work: F) -> Result<T, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let turn = self.turn;
        self.serving_rx
            .wait_for(|serving| *serving >= turn)
            .await
            .map_err(|_| AdmissionError::Closed)?;

        if self.inner.permits.available_permits() == 0 {
            debug!(key = %self.key, "Global concurrency ceiling reached, waiting for a slot");
        }
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)?;

        self.inner.queued.fetch_sub(1, Ordering::SeqCst);
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        self.permit = Some(permit);

        let output = work().await;
        drop(self);

        Ok(output)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        match self.permit.take() {
            Some(permit) => {
                self.inner.active.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }
            None => {
                self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let now_empty = match self.inner.slots.get_mut(&self.key) {
            Some(mut slot) => {
                if slot.serving == self.turn {
                    slot.advance();
                } else {
                    slot.abandoned.insert(self.turn);
                }
                slot.pending -= 1;
                slot.pending == 0
            }
            None => false,
        };

        // `enqueue` bumps `pending` under the same shard lock, so a racing
        // ticket keeps the slot alive.
        if now_empty {
            self.inner.slots.remove_if(&self.key, |_, slot| slot.pending == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    /// Let spawned tasks on the current-thread runtime make progress.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let admission = AdmissionController::new(2);
        let result = admission.acquire_lock("", || async { 1 }).await;
        assert_eq!(result, Err(AdmissionError::EmptyKey));
        assert_eq!(admission.stats().queued, 0);
    }

    #[tokio::test]
    async fn returns_work_output() {
        let admission = AdmissionController::new(2);
        let result = admission.acquire_lock("chat", || async { 41 + 1 }).await;
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn zero_ceiling_is_raised_to_one() {
        let admission = AdmissionController::new(0);
        assert_eq!(admission.max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_completes_in_submission_order() {
        let admission = AdmissionController::new(4);
        let finished = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let admission = admission.clone();
            let finished = Arc::clone(&finished);
            handles.push(tokio::spawn(async move {
                admission
                    .acquire_lock("chat", || async move {
                        // Earlier submissions sleep longer.
                        tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                        finished.lock().unwrap().push(i);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*finished.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_never_overlaps() {
        let admission = AdmissionController::new(8);
        let in_flight: Arc<DashMap<&'static str, usize>> = Arc::new(DashMap::new());
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..24 {
            let key = if i % 2 == 0 { "k1" } else { "k2" };
            let admission = admission.clone();
            let in_flight = Arc::clone(&in_flight);
            let overlaps = Arc::clone(&overlaps);
            handles.push(tokio::spawn(async move {
                admission
                    .acquire_lock(key, || async move {
                        let now = {
                            let mut entry = in_flight.entry(key).or_insert(0);
                            *entry += 1;
                            *entry
                        };
                        if now > 1 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        *in_flight.get_mut(key).unwrap() -= 1;
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn global_ceiling_is_never_exceeded() {
        let admission = AdmissionController::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..6 {
            let admission = admission.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let key = format!("chat-{i}");
                admission
                    .acquire_lock(&key, || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn saturated_ceiling_delays_new_key() {
        let admission = AdmissionController::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let second_ran = Arc::new(AtomicUsize::new(0));

        let first = {
            let admission = admission.clone();
            tokio::spawn(async move {
                admission
                    .acquire_lock("a", || async move {
                        let _ = release_rx.await;
                    })
                    .await
                    .unwrap();
            })
        };
        settle().await;
        assert_eq!(admission.stats().active, 1);

        let second = {
            let admission = admission.clone();
            let second_ran = Arc::clone(&second_ran);
            tokio::spawn(async move {
                admission
                    .acquire_lock("b", || async move {
                        second_ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            })
        };
        settle().await;

        let stats = admission.stats();
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.active_keys, 2);

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(second_ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let admission = AdmissionController::new(2);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocked = {
            let admission = admission.clone();
            tokio::spawn(async move {
                admission
                    .acquire_lock("a", || async move {
                        let _ = release_rx.await;
                    })
                    .await
                    .unwrap();
            })
        };
        settle().await;

        // Completes while "a" is still holding its slot.
        let result = admission.acquire_lock("b", || async { "done" }).await;
        assert_eq!(result, Ok("done"));
        assert_eq!(admission.stats().active, 1);

        release_tx.send(()).unwrap();
        blocked.await.unwrap();
    }

    #[tokio::test]
    async fn queue_depth_counts_running_and_waiting_units() {
        let admission = AdmissionController::new(4);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let admission = admission.clone();
            tokio::spawn(async move {
                admission
                    .acquire_lock("chat", || async move {
                        let _ = release_rx.await;
                    })
                    .await
                    .unwrap();
            })
        };
        let second = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire_lock("chat", || async {}).await.unwrap() })
        };
        settle().await;

        assert_eq!(admission.queue_depth("chat"), 2);
        assert_eq!(admission.queue_depth("other"), 0);
        assert_eq!(admission.stats().queued, 1);

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(admission.queue_depth("chat"), 0);
    }

    #[tokio::test]
    async fn failing_work_does_not_block_the_key() {
        let admission = AdmissionController::new(2);

        let failed: Result<Result<(), String>, _> = admission
            .acquire_lock("chat", || async { Err("backend exploded".to_string()) })
            .await;
        assert_eq!(failed, Ok(Err("backend exploded".to_string())));

        let next = admission.acquire_lock("chat", || async { "ok" }).await;
        assert_eq!(next, Ok("ok"));
    }

    #[tokio::test]
    async fn panicking_work_releases_its_slot() {
        let admission = AdmissionController::new(1);

        let panicked = {
            let admission = admission.clone();
            tokio::spawn(async move {
                admission
                    .acquire_lock("chat", || async {
                        panic!("work blew up");
                    })
                    .await
            })
        };
        let join = panicked.await;
        assert!(join.unwrap_err().is_panic());

        let next = admission.acquire_lock("chat", || async { 7 }).await;
        assert_eq!(next, Ok(7));

        let stats = admission.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.active_keys, 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_place() {
        let admission = AdmissionController::new(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let holder = {
            let admission = admission.clone();
            tokio::spawn(async move {
                admission
                    .acquire_lock("chat", || async move {
                        let _ = release_rx.await;
                    })
                    .await
                    .unwrap();
            })
        };
        let waiter = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.acquire_lock("chat", || async {}).await })
        };
        settle().await;
        assert_eq!(admission.stats().queued, 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(admission.stats().queued, 0);
        assert_eq!(admission.queue_depth("chat"), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(admission.stats().active_keys, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn enqueue_order_wins_over_run_order() {
        let admission = AdmissionController::new(4);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let tickets: Vec<_> = (0..50)
            .map(|i| (i, admission.enqueue("chat").unwrap()))
            .collect();

        // Later tickets start awaiting first.
        let mut handles = Vec::new();
        for (i, ticket) in tickets.into_iter().rev() {
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                ticket
                    .run(|| async move {
                        order.lock().unwrap().push(i);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
        assert_eq!(admission.stats().active_keys, 0);
    }

    #[tokio::test]
    async fn dropped_ticket_hands_its_turn_on() {
        let admission = AdmissionController::new(2);

        let first = admission.enqueue("chat").unwrap();
        let second = admission.enqueue("chat").unwrap();
        let third = admission.enqueue("chat").unwrap();
        assert_eq!(admission.queue_depth("chat"), 3);
        assert_eq!(admission.stats().queued, 3);

        drop(second);
        drop(first);

        assert_eq!(third.run(|| async { "ran" }).await, Ok("ran"));
        let stats = admission.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.active_keys, 0);
    }

    #[test]
    fn enqueue_rejects_empty_key() {
        let admission = AdmissionController::new(1);
        assert!(matches!(admission.enqueue(""), Err(AdmissionError::EmptyKey)));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_return_to_zero_after_all_work_settles() {
        let admission = AdmissionController::new(3);

        let mut handles = Vec::new();
        for i in 0..10u64 {
            let admission = admission.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("chat-{}", i % 4);
                admission
                    .acquire_lock(&key, || async move {
                        tokio::time::sleep(Duration::from_millis(i)).await;
                        if i % 3 == 0 { Err(i) } else { Ok(i) }
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        assert_eq!(
            admission.stats(),
            AdmissionStats {
                active: 0,
                queued: 0,
                active_keys: 0,
                max_concurrent: 3,
            }
        );
    }
}
