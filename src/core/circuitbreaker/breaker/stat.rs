use crate::{
    stat::{BucketWrap, LeapArray, MetricTrait},
    Result,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Counter is the bucket of a breaker's window:
/// the calls matching the strategy (slow or failed) among all the completed ones.
#[derive(Debug, Default)]
pub struct Counter {
    pub(crate) target: AtomicU64,
    pub(crate) total: AtomicU64,
}

impl Counter {
    pub fn add(&self, is_target: bool) {
        if is_target {
            self.target.fetch_add(1, Ordering::SeqCst);
        }
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn target(&self) -> u64 {
        self.target.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

impl MetricTrait for Counter {
    fn reset(&self) {
        self.target.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
    }
}

pub type CounterLeapArray = LeapArray<Counter>;

impl CounterLeapArray {
    pub fn counter_of_time(&self, now: u64) -> Result<Arc<BucketWrap<Counter>>> {
        self.get_bucket_of_time(now)
    }

    /// Sums `(target, total)` over the window ending at `now`.
    pub fn sum_with_time(&self, now: u64) -> (u64, u64) {
        self.get_valid_values(now)
            .iter()
            .fold((0, 0), |(target, total), c| {
                (target + c.value().target(), total + c.value().total())
            })
    }

    pub fn reset_all(&self) {
        for c in &self.array {
            c.value().reset();
        }
    }
}
