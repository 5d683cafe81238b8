use super::MetricTrait;
use crate::base::TimePredicate;
use crate::utils::curr_time_millis;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// start stamp of a bucket that has never been used
const ABSENT_STAMP: u64 = 0;

pub const INVALID_LEAP_ARRAY_PARAMS_ERROR: &str =
    "Invalid sample_count or interval_ms, the interval must be evenly divided into buckets";
pub const STALE_TIMESTAMP_ERROR: &str = "the timestamp is older than the bucket it maps to";

/// BucketWrap is one time slot of a LeapArray,
/// covering `[start_stamp, start_stamp + bucket_len_ms)`.
/// The wrapped value must update itself atomically.
#[derive(Debug, Default)]
pub struct BucketWrap<T: MetricTrait> {
    start_stamp: AtomicU64,
    value: T,
}

impl<T: MetricTrait> BucketWrap<T> {
    pub fn new(start_stamp: u64) -> Self {
        BucketWrap {
            start_stamp: AtomicU64::new(start_stamp),
            value: T::default(),
        }
    }

    pub fn start_stamp(&self) -> u64 {
        self.start_stamp.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub(crate) fn reset_start_stamp(&self, start_stamp: u64) {
        self.start_stamp.store(start_stamp, Ordering::SeqCst);
    }

    /// Claims a never used bucket, only one caller wins.
    fn claim(&self, start_stamp: u64) -> bool {
        self.start_stamp
            .compare_exchange(
                ABSENT_STAMP,
                start_stamp,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn is_time_in_bucket(&self, now: u64, bucket_len_ms: u32) -> bool {
        let start = self.start_stamp();
        start <= now && now < start + bucket_len_ms as u64
    }

    /// A bucket is deprecated once it has rotated out of the window ending at `now`.
    pub fn is_deprecated(&self, now: u64, interval_ms: u64) -> bool {
        let start = self.start_stamp();
        start == ABSENT_STAMP || (now > start && now - start > interval_ms)
    }
}

/// LeapArray is a ring of `sample_count` buckets of `bucket_len_ms` each,
/// spanning `interval_ms`. The bucket of timestamp `t` lives at
/// `(t / bucket_len_ms) % sample_count` and is reused once its slot comes round again.
#[derive(Debug)]
pub struct LeapArray<T: MetricTrait> {
    bucket_len_ms: u32,
    sample_count: u32,
    interval_ms: u32,
    pub(crate) array: Vec<Arc<BucketWrap<T>>>,
    /// one reset lock per slot
    reset_locks: Vec<Mutex<()>>,
}

impl<T: MetricTrait> LeapArray<T> {
    pub fn new(sample_count: u32, interval_ms: u32) -> Result<Self> {
        if sample_count == 0 || interval_ms == 0 || interval_ms % sample_count != 0 {
            return Err(Error::msg(INVALID_LEAP_ARRAY_PARAMS_ERROR));
        }
        let array = (0..sample_count)
            .map(|_| Arc::new(BucketWrap::default()))
            .collect();
        let reset_locks = (0..sample_count).map(|_| Mutex::new(())).collect();
        Ok(LeapArray {
            bucket_len_ms: interval_ms / sample_count,
            sample_count,
            interval_ms,
            array,
            reset_locks,
        })
    }

    pub fn bucket_len_ms(&self) -> u32 {
        self.bucket_len_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub(crate) fn reset_bucket(&self, idx: usize, start_stamp: u64) {
        // the value first, writers matching the new stamp must not see old counts
        self.array[idx].value().reset();
        self.array[idx].reset_start_stamp(start_stamp);
    }

    pub fn current_bucket(&self) -> Result<Arc<BucketWrap<T>>> {
        self.get_bucket_of_time(curr_time_millis())
    }

    /// Finds the bucket holding `now`, creating or recycling it if necessary.
    pub fn get_bucket_of_time(&self, now: u64) -> Result<Arc<BucketWrap<T>>> {
        let idx = self.time2idx(now) as usize;
        let target_start = self.calculate_start_stamp(now);
        let bucket = &self.array[idx];
        loop {
            let start = bucket.start_stamp();
            if start == ABSENT_STAMP {
                if bucket.claim(target_start) {
                    return Ok(Arc::clone(bucket));
                }
                // lost the race, the winner may have claimed another window
            } else if start == target_start {
                return Ok(Arc::clone(bucket));
            } else if start < target_start {
                // the slot still holds an old window,
                // only the holder of the lock recycles it, the others retry
                match self.reset_locks[idx].try_lock() {
                    Ok(_guard) => {
                        if bucket.start_stamp() < target_start {
                            self.reset_bucket(idx, target_start);
                        }
                        return Ok(Arc::clone(bucket));
                    }
                    Err(_) => std::thread::yield_now(),
                }
            } else {
                return Err(Error::msg(STALE_TIMESTAMP_ERROR));
            }
        }
    }

    /// The bucket right before the one holding the current time.
    pub fn get_previous_bucket(&self) -> Result<Arc<BucketWrap<T>>> {
        self.get_previous_bucket_with_time(curr_time_millis())
    }

    pub fn get_previous_bucket_with_time(&self, now: u64) -> Result<Arc<BucketWrap<T>>> {
        let previous = now.saturating_sub(self.bucket_len_ms as u64);
        let idx = self.time2idx(previous) as usize;
        let bucket = self.array[idx].clone();
        if bucket.is_deprecated(now, self.interval_ms as u64) {
            return Err(Error::msg("previous bucket has been deprecated"));
        }
        if !bucket.is_time_in_bucket(previous, self.bucket_len_ms) {
            return Err(Error::msg("previous bucket has not been written"));
        }
        Ok(bucket)
    }

    pub(crate) fn calculate_start_stamp(&self, now: u64) -> u64 {
        now - now % self.bucket_len_ms as u64
    }

    pub(crate) fn time2idx(&self, now: u64) -> u64 {
        (now / self.bucket_len_ms as u64) % self.sample_count as u64
    }

    /// The value of the bucket holding `now`, if that bucket is up to date.
    pub fn get_bucket_value(&self, now: u64) -> Result<&T> {
        let bucket = &self.array[self.time2idx(now) as usize];
        if bucket.is_time_in_bucket(now, self.bucket_len_ms) {
            Ok(bucket.value())
        } else {
            Err(Error::msg("invalid time, cannot get value in the bucket"))
        }
    }

    pub fn get_current_values(&self) -> Vec<Arc<BucketWrap<T>>> {
        self.get_valid_values(curr_time_millis())
    }

    /// All the buckets within `[now - interval_ms, now]`.
    pub fn get_valid_values(&self, now: u64) -> Vec<Arc<BucketWrap<T>>> {
        self.get_valid_values_conditional(now, &|_| true)
    }

    pub fn get_valid_values_conditional(
        &self,
        now: u64,
        condition: &TimePredicate,
    ) -> Vec<Arc<BucketWrap<T>>> {
        self.array
            .iter()
            .filter(|b| {
                !b.is_deprecated(now, self.interval_ms as u64) && condition(b.start_stamp())
            })
            .cloned()
            .collect()
    }
}
