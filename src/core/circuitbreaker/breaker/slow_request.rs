use super::*;
use crate::{base::EntryContext, logging, Result};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

const IN_FLIGHT_SHARDS: u64 = 16;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    start: u64,
    /// already counted as slow while still running
    presumed: bool,
}

/// SlowRtBreaker trips on the ratio of calls slower than `max_allowed_rt_ms`.
/// A call still running past `max_allowed_rt_ms` is presumed slow without waiting for it to finish.
/// The running calls are scanned for that at most once per bucket of the window.
#[derive(Debug)]
pub struct SlowRtBreaker {
    breaker: BreakerBase,
    max_slow_request_ratio: f64,
    bucket_len_ms: u64,
    stat: Arc<CounterLeapArray>,
    /// sharded by entry id
    in_flight: Vec<Mutex<HashMap<u64, InFlight>>>,
    /// start of the bucket of the last scan
    last_scan_bucket: AtomicU64,
}

impl SlowRtBreaker {
    pub fn new(rule: Arc<Rule>) -> Result<Self> {
        let stat = CounterLeapArray::new(rule.bucket_count(), rule.stat_interval_ms)?;
        Ok(Self::new_with_stat(rule, Arc::new(stat)))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        let bucket_len_ms = (rule.stat_interval_ms / rule.bucket_count()).max(1) as u64;
        Self {
            max_slow_request_ratio: rule.threshold,
            bucket_len_ms,
            breaker: BreakerBase::new(rule),
            stat,
            in_flight: (0..IN_FLIGHT_SHARDS)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            last_scan_bucket: AtomicU64::new(0),
        }
    }

    fn shard_of(&self, entry_id: u64) -> &Mutex<HashMap<u64, InFlight>> {
        &self.in_flight[(entry_id % IN_FLIGHT_SHARDS) as usize]
    }

    pub(crate) fn track(&self, entry_id: u64, start: u64) {
        self.shard_of(entry_id).lock().unwrap().insert(
            entry_id,
            InFlight {
                start,
                presumed: false,
            },
        );
    }

    /// Counts the calls running longer than `max_allowed_rt_ms` as slow ones.
    /// Only the first caller within a bucket scans.
    fn presume_slow_with_time(&self, now: u64) {
        let bucket_start = now - now % self.bucket_len_ms;
        let last = self.last_scan_bucket.load(Ordering::SeqCst);
        if last == bucket_start
            || self
                .last_scan_bucket
                .compare_exchange(last, bucket_start, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
        {
            return;
        }
        let rule = self.breaker.bound_rule();
        let mut presumed = 0;
        for shard in &self.in_flight {
            for call in shard.lock().unwrap().values_mut() {
                if !call.presumed && rule.is_slow(now.saturating_sub(call.start)) {
                    call.presumed = true;
                    presumed += 1;
                }
            }
        }
        if presumed == 0 {
            return;
        }
        match self.stat.counter_of_time(now) {
            Ok(counter) => {
                for _ in 0..presumed {
                    counter.value().add(true);
                }
            }
            Err(err) => logging::error!(
                "[SlowRtBreaker] fail to get current counter, rule: {:?}, error: {:?}",
                rule,
                err
            ),
        }
    }

    /// Opens a Closed breaker once the slow ratio of the window reaches the threshold.
    fn evaluate_with_time(&self, now: u64) {
        if self.current_state() != State::Closed {
            return;
        }
        let (slow_count, total_count) = self.stat.sum_with_time(now);
        if !self.breaker.bound_rule().reaches_min_request_amount(total_count) {
            return;
        }
        let slow_ratio = slow_count as f64 / total_count as f64;
        if slow_ratio >= self.max_slow_request_ratio {
            self.breaker
                .from_closed_to_open_with_time(now, Arc::new(slow_ratio));
        }
    }

    pub(crate) fn try_pass_with_time(&self, now: u64, ctx: &mut EntryContext) -> bool {
        if self.current_state() == State::Closed {
            self.presume_slow_with_time(now);
            self.evaluate_with_time(now);
        }
        self.breaker.try_pass_with_time(now, ctx)
    }

    pub(crate) fn on_complete_with_time(&self, now: u64, entry_id: u64, rt: u64) {
        let presumed = self
            .shard_of(entry_id)
            .lock()
            .unwrap()
            .remove(&entry_id)
            .map_or(false, |call| call.presumed);
        let is_slow = self.breaker.bound_rule().is_slow(rt);
        if !presumed {
            match self.stat.counter_of_time(now) {
                Ok(counter) => counter.value().add(is_slow),
                Err(err) => {
                    logging::error!(
                        "[SlowRtBreaker] fail to get current counter, rule: {:?}, error: {:?}",
                        self.breaker.bound_rule(),
                        err
                    );
                    return;
                }
            }
        }

        match self.current_state() {
            State::HalfOpen => {
                if is_slow {
                    // fail to probe
                    self.breaker
                        .from_half_open_to_open_with_time(now, Arc::new(1.0));
                } else if self.breaker.from_half_open_to_closed() {
                    self.reset_metric();
                }
            }
            State::Closed => self.evaluate_with_time(now),
            State::Open => {}
        }
    }
}

impl CircuitBreakerTrait for SlowRtBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn stat(&self) -> &Arc<CounterLeapArray> {
        &self.stat
    }

    fn try_pass(&self, ctx: &mut EntryContext) -> bool {
        self.try_pass_with_time(utils::curr_time_millis(), ctx)
    }

    fn on_request_pass(&self, ctx: &EntryContext) {
        self.track(ctx.entry_id(), ctx.start_time());
    }

    fn on_request_complete(&self, ctx: &EntryContext) {
        self.on_complete_with_time(utils::curr_time_millis(), ctx.entry_id(), ctx.round_trip());
    }
}
