use crate::api::CallLimit;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

/// Pauses every upload worker while one of them sleeps off an API rate limit.
///
/// The worker that saw the limit holds the gate for the whole pause; the others block in
/// [`BackoffGate::wait`] before their next request.
#[derive(Debug, Default)]
pub struct BackoffGate {
    lock: Mutex<()>,
    active: AtomicBool,
}

impl BackoffGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Holds the gate for `interval`.
    pub fn pause(&self, interval: Duration) {
        let _guard = self.lock.lock();
        self.active.store(true, Ordering::SeqCst);
        std::thread::sleep(interval);
        self.active.store(false, Ordering::SeqCst);
    }

    /// Returns immediately unless another worker is backing off.
    pub fn wait(&self) {
        if self.is_active() {
            drop(self.lock.lock());
        }
    }

    /// Pauses when `limit` leaves less headroom than there are workers. Returns whether it
    /// paused.
    pub fn backoff_if_near_limit(
        &self,
        limit: CallLimit,
        workers: usize,
        interval: Duration,
    ) -> bool {
        if self.is_active() || !limit.is_near_limit(workers) {
            return false;
        }
        tracing::debug!(
            "Near API call limit ({}/{}), waiting {:?} ...",
            limit.used,
            limit.total,
            interval
        );
        self.pause(interval);
        true
    }
}
