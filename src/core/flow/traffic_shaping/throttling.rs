//! Throttling spaces the passed requests evenly over the statistic interval,
//! pending requests wait in queue until their turn, as long as the wait stays
//! within the max queueing time.

use super::{Checker, Rule};
use crate::base::{BlockType, ReadStat, StatNode, TokenResult};
use crate::utils;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

const BLOCK_MSG_QUEUEING: &str = "flow throttling check blocked, estimated queueing time exceeds max queueing time";
const BLOCK_MSG_THRESHOLD: &str = "flow throttling check blocked, threshold is <= 0.0";

#[derive(Debug)]
pub struct ThrottlingChecker {
    max_queueing_time_ns: i64,
    stat_interval_ns: i64,
    last_passed_time: AtomicI64,
}

impl ThrottlingChecker {
    pub fn new(rule: &Arc<Rule>) -> Self {
        let stat_interval_ms = match rule.stat_interval_ms {
            0 => 1000,
            ms => ms as u64,
        };
        ThrottlingChecker {
            max_queueing_time_ns: utils::milli2nano(rule.max_queueing_time_ms as u64) as i64,
            stat_interval_ns: utils::milli2nano(stat_interval_ms) as i64,
            last_passed_time: AtomicI64::new(0),
        }
    }

    /// The time a batch takes out of the interval.
    fn interval_ns(&self, batch_count: u32, threshold: f64) -> i64 {
        (batch_count as f64 / threshold * (self.stat_interval_ns as f64)) as i64
    }

    pub fn do_check_with_time(
        &self,
        rule: &Arc<Rule>,
        batch_count: u32,
        threshold: f64,
        curr_nano: i64,
    ) -> TokenResult {
        if batch_count == 0 {
            return TokenResult::new_pass();
        }
        if threshold <= 0.0 {
            return TokenResult::new_blocked_with_cause(
                BlockType::Flow,
                BLOCK_MSG_THRESHOLD.into(),
                rule.clone(),
                Arc::new(threshold),
            );
        }
        if batch_count as f64 > threshold {
            return TokenResult::new_blocked(BlockType::Flow);
        }

        // the interval between two requests
        let interval_ns = self.interval_ns(batch_count, threshold);

        let loaded_last_passed_time = self.last_passed_time.load(Ordering::SeqCst);
        let expected_time = loaded_last_passed_time + interval_ns;
        if expected_time <= curr_nano
            && self
                .last_passed_time
                .compare_exchange(
                    loaded_last_passed_time,
                    curr_nano,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok()
        {
            return TokenResult::new_pass();
        }

        let estimated_queue_duration =
            self.last_passed_time.load(Ordering::SeqCst) + interval_ns - curr_nano;
        if estimated_queue_duration > self.max_queueing_time_ns {
            return TokenResult::new_blocked_with_cause(
                BlockType::Flow,
                BLOCK_MSG_QUEUEING.into(),
                rule.clone(),
                Arc::new(estimated_queue_duration),
            );
        }

        // reserve the slot
        let expected_time = self
            .last_passed_time
            .fetch_add(interval_ns, Ordering::SeqCst)
            + interval_ns;
        let estimated_queue_duration = expected_time - curr_nano;
        if estimated_queue_duration > self.max_queueing_time_ns {
            self.last_passed_time
                .fetch_sub(interval_ns, Ordering::SeqCst);
            return TokenResult::new_blocked_with_cause(
                BlockType::Flow,
                BLOCK_MSG_QUEUEING.into(),
                rule.clone(),
                Arc::new(estimated_queue_duration),
            );
        }
        TokenResult::new_should_wait(estimated_queue_duration.max(0) as u64)
    }
}

impl Checker for ThrottlingChecker {
    fn do_check(
        &self,
        rule: &Arc<Rule>,
        _metric: &dyn ReadStat,
        _node: &dyn StatNode,
        batch_count: u32,
        threshold: f64,
    ) -> TokenResult {
        self.do_check_with_time(rule, batch_count, threshold, utils::curr_time_nanos() as i64)
    }

    fn cancel_queued(&self, batch_count: u32, threshold: f64) {
        if batch_count == 0 || threshold <= 0.0 || batch_count as f64 > threshold {
            return;
        }
        self.last_passed_time
            .fetch_sub(self.interval_ns(batch_count, threshold), Ordering::SeqCst);
    }
}
