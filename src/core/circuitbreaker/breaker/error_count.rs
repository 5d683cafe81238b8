use super::*;
use crate::{base::EntryContext, logging, Result};
use std::sync::Arc;

/// ErrorCountBreaker trips once the errors within the window reach the threshold.
#[derive(Debug)]
pub struct ErrorCountBreaker {
    breaker: BreakerBase,
    error_count_threshold: u64,
    stat: Arc<CounterLeapArray>,
}

impl ErrorCountBreaker {
    pub fn new(rule: Arc<Rule>) -> Result<Self> {
        let stat = CounterLeapArray::new(rule.bucket_count(), rule.stat_interval_ms)?;
        Ok(Self::new_with_stat(rule, Arc::new(stat)))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        Self {
            error_count_threshold: rule.threshold as u64,
            breaker: BreakerBase::new(rule),
            stat,
        }
    }

    pub(crate) fn record_with_time(&self, now: u64, has_err: bool) {
        match self.stat.counter_of_time(now) {
            Ok(counter) => counter.value().add(has_err),
            Err(err) => {
                logging::error!(
                    "[ErrorCountBreaker] fail to get current counter, rule: {:?}, error: {:?}",
                    self.breaker.bound_rule(),
                    err
                );
                return;
            }
        }

        match self.current_state() {
            State::HalfOpen => {
                if has_err {
                    self.breaker
                        .from_half_open_to_open_with_time(now, Arc::new(1u64));
                } else if self.breaker.from_half_open_to_closed() {
                    self.reset_metric();
                }
            }
            State::Closed => {
                let (error_count, total_count) = self.stat.sum_with_time(now);
                if !self.breaker.bound_rule().reaches_min_request_amount(total_count) {
                    return;
                }
                if error_count >= self.error_count_threshold {
                    self.breaker
                        .from_closed_to_open_with_time(now, Arc::new(error_count));
                }
            }
            State::Open => {}
        }
    }
}

impl CircuitBreakerTrait for ErrorCountBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn stat(&self) -> &Arc<CounterLeapArray> {
        &self.stat
    }

    fn on_request_complete(&self, ctx: &EntryContext) {
        self.record_with_time(utils::curr_time_millis(), ctx.get_err().is_some());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const T0: u64 = 1_000_000;

    #[test]
    fn trips_on_count() {
        let cb = ErrorCountBreaker::new(Arc::new(Rule {
            resource: "error_count_trips".into(),
            strategy: BreakerStrategy::ErrorCount,
            retry_timeout_ms: 3000,
            min_request_amount: 5,
            stat_interval_ms: 10000,
            threshold: 3.0,
            ..Default::default()
        }))
        .unwrap();
        // errors before min_request_amount is reached
        for _ in 0..3 {
            cb.record_with_time(T0, true);
        }
        assert_eq!(cb.current_state(), State::Closed);
        cb.record_with_time(T0, false);
        assert_eq!(cb.current_state(), State::Closed);
        cb.record_with_time(T0 + 10, false);
        assert_eq!(cb.current_state(), State::Open);
        assert_eq!(cb.next_retry_timestamp_ms(), T0 + 3010);
    }

    #[test]
    fn window_expiry() {
        let cb = ErrorCountBreaker::new(Arc::new(Rule {
            resource: "error_count_window".into(),
            strategy: BreakerStrategy::ErrorCount,
            retry_timeout_ms: 3000,
            min_request_amount: 1,
            stat_interval_ms: 1000,
            threshold: 2.0,
            ..Default::default()
        }))
        .unwrap();
        cb.record_with_time(T0, true);
        cb.record_with_time(T0 + 2000, true);
        assert_eq!(cb.current_state(), State::Closed);
        cb.record_with_time(T0 + 2100, true);
        assert_eq!(cb.current_state(), State::Open);
    }
}
