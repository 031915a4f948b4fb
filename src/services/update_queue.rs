//! Single-flight FIFO queue of keyed jobs with supersede-and-requeue.
//!
//! At most one job runs at a time across all keys and at most one job per
//! key is pending. Pushing a key that is already queued or running moves it
//! to the tail; the earlier caller is answered immediately with the
//! "superseded" value and a running job for it is cancelled through its
//! [`CancellationToken`].

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct ActiveJob<K, T> {
    key: K,
    token: CancellationToken,
    waiter: Option<oneshot::Sender<T>>,
}

struct QueueState<K, T> {
    order: VecDeque<K>,
    waiters: HashMap<K, oneshot::Sender<T>>,
    active: Option<ActiveJob<K, T>>,
    /// A drain loop is alive
    running: bool,
}

/// Result of [`UpdateQueue::push`]
pub struct Enqueued<T> {
    pub receiver: oneshot::Receiver<T>,
    /// The caller must start a drain loop
    pub start_drain: bool,
}

pub struct UpdateQueue<K, T> {
    state: Mutex<QueueState<K, T>>,
}

impl<K, T> Default for UpdateQueue<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> UpdateQueue<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                waiters: HashMap::new(),
                active: None,
                running: false,
            }),
        }
    }

    /// Queue a job for `key` at the tail.
    ///
    /// A queued or running job for the same key is superseded: its caller
    /// receives `superseded` and a running job is cancelled.
    pub fn push(&self, key: K, superseded: T) -> Enqueued<T> {
        let mut state = self.state.lock();
        let mut superseded = Some(superseded);

        if let Some(active) = state.active.as_mut().filter(|a| a.key == key) {
            if !active.token.is_cancelled() {
                tracing::debug!("Superseding in-flight update for {:?}", key);
                active.token.cancel();
            }
            if let (Some(waiter), Some(value)) = (active.waiter.take(), superseded.take()) {
                let _ = waiter.send(value);
            }
        }

        if let Some(pos) = state.order.iter().position(|k| *k == key) {
            tracing::debug!("Moving queued update for {:?} to the back", key);
            state.order.remove(pos);
            if let (Some(waiter), Some(value)) = (state.waiters.remove(&key), superseded.take()) {
                let _ = waiter.send(value);
            }
        }

        let (tx, rx) = oneshot::channel();
        state.order.push_back(key.clone());
        state.waiters.insert(key, tx);

        let start_drain = !state.running;
        state.running = true;
        Enqueued {
            receiver: rx,
            start_drain,
        }
    }

    /// Dequeue the next job and mark it running.
    ///
    /// Returns `None` and ends the drain loop when the queue is empty.
    pub fn begin_next(&self) -> Option<(K, CancellationToken)> {
        let mut state = self.state.lock();
        let Some(key) = state.order.pop_front() else {
            state.running = false;
            state.active = None;
            return None;
        };
        let token = CancellationToken::new();
        let waiter = state.waiters.remove(&key);
        state.active = Some(ActiveJob {
            key: key.clone(),
            token: token.clone(),
            waiter,
        });
        Some((key, token))
    }

    /// Complete the running job for `key`, answering its caller unless it was
    /// superseded.
    pub fn finish(&self, key: &K, output: T) {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|a| a.key == *key) {
            if let Some(waiter) = state.active.take().and_then(|a| a.waiter) {
                let _ = waiter.send(output);
            }
        }
    }

    /// Drop any queued or running job for `key`, answering its caller with
    /// `superseded`. Returns whether there was one.
    pub fn remove(&self, key: &K, superseded: T) -> bool {
        let mut state = self.state.lock();
        let mut superseded = Some(superseded);
        let mut found = false;

        if let Some(active) = state.active.as_mut().filter(|a| a.key == *key) {
            active.token.cancel();
            if let (Some(waiter), Some(value)) = (active.waiter.take(), superseded.take()) {
                let _ = waiter.send(value);
            }
            found = true;
        }
        if let Some(pos) = state.order.iter().position(|k| k == key) {
            state.order.remove(pos);
            if let (Some(waiter), Some(value)) = (state.waiters.remove(key), superseded.take()) {
                let _ = waiter.send(value);
            }
            found = true;
        }
        found
    }

    /// End the drain loop after it stopped without emptying the queue.
    ///
    /// The running job's caller sees its channel closed. Queued jobs stay
    /// queued and the next [`Self::push`] starts a new drain.
    pub fn abort_drain(&self) {
        let mut state = self.state.lock();
        if let Some(active) = state.active.take() {
            tracing::warn!("Drain stopped while running {:?}", active.key);
        }
        state.running = false;
    }

    pub fn is_queued(&self, key: &K) -> bool {
        self.state.lock().order.contains(key)
    }

    /// Number of jobs waiting to run
    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().order.is_empty()
    }

    /// Whether a drain loop is alive
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_single_drain() {
        let queue: UpdateQueue<&str, u32> = UpdateQueue::new();
        let a = queue.push("a", 0);
        let b = queue.push("b", 0);
        assert!(a.start_drain);
        assert!(!b.start_drain);

        let (key, _) = queue.begin_next().unwrap();
        assert_eq!(key, "a");
        queue.finish(&key, 1);
        let (key, _) = queue.begin_next().unwrap();
        assert_eq!(key, "b");
        queue.finish(&key, 2);
        assert!(queue.begin_next().is_none());
        assert!(!queue.is_running());

        assert_eq!(a.receiver.blocking_recv().unwrap(), 1);
        assert_eq!(b.receiver.blocking_recv().unwrap(), 2);
    }

    #[test]
    fn test_queued_key_moves_to_back() {
        let queue: UpdateQueue<&str, u32> = UpdateQueue::new();
        let first_a = queue.push("a", 0);
        let _b = queue.push("b", 0);
        let second_a = queue.push("a", 0);

        assert_eq!(first_a.receiver.blocking_recv().unwrap(), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.begin_next().unwrap().0, "b");
        queue.finish(&"b", 7);
        assert_eq!(queue.begin_next().unwrap().0, "a");
        queue.finish(&"a", 9);
        assert_eq!(second_a.receiver.blocking_recv().unwrap(), 9);
    }

    #[test]
    fn test_running_key_is_cancelled_and_requeued() {
        let queue: UpdateQueue<&str, u32> = UpdateQueue::new();
        let first = queue.push("a", 0);
        let (key, token) = queue.begin_next().unwrap();

        let second = queue.push("a", 0);
        assert!(token.is_cancelled());
        assert_eq!(first.receiver.blocking_recv().unwrap(), 0);

        // The cancelled run's result goes nowhere
        queue.finish(&key, 5);
        let (key, token) = queue.begin_next().unwrap();
        assert!(!token.is_cancelled());
        queue.finish(&key, 6);
        assert_eq!(second.receiver.blocking_recv().unwrap(), 6);
    }

    #[test]
    fn test_aborted_drain_restarts_on_next_push() {
        let queue: UpdateQueue<&str, u32> = UpdateQueue::new();
        let a = queue.push("a", 0);
        let _b = queue.push("b", 0);
        queue.begin_next().unwrap();

        queue.abort_drain();
        assert!(!queue.is_running());
        assert!(a.receiver.blocking_recv().is_err());
        assert!(queue.is_queued(&"b"));

        let c = queue.push("c", 0);
        assert!(c.start_drain);
        assert_eq!(queue.begin_next().unwrap().0, "b");
    }

    #[test]
    fn test_remove_answers_waiter() {
        let queue: UpdateQueue<&str, u32> = UpdateQueue::new();
        let a = queue.push("a", 0);
        assert!(queue.remove(&"a", 3));
        assert!(!queue.remove(&"a", 3));
        assert_eq!(a.receiver.blocking_recv().unwrap(), 3);
        assert!(queue.begin_next().is_none());
    }
}
