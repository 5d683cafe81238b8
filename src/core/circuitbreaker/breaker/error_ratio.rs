use super::*;
use crate::{base::EntryContext, logging, Result};
use std::sync::Arc;

/// ErrorRatioBreaker trips on the ratio of completed calls carrying a business error.
#[derive(Debug)]
pub struct ErrorRatioBreaker {
    breaker: BreakerBase,
    error_ratio_threshold: f64,
    stat: Arc<CounterLeapArray>,
}

impl ErrorRatioBreaker {
    pub fn new(rule: Arc<Rule>) -> Result<Self> {
        let stat = CounterLeapArray::new(rule.bucket_count(), rule.stat_interval_ms)?;
        Ok(Self::new_with_stat(rule, Arc::new(stat)))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        Self {
            error_ratio_threshold: rule.threshold,
            breaker: BreakerBase::new(rule),
            stat,
        }
    }

    pub(crate) fn record_with_time(&self, now: u64, has_err: bool) {
        match self.stat.counter_of_time(now) {
            Ok(counter) => counter.value().add(has_err),
            Err(err) => {
                logging::error!(
                    "[ErrorRatioBreaker] fail to get current counter, rule: {:?}, error: {:?}",
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
                        .from_half_open_to_open_with_time(now, Arc::new(1.0));
                } else if self.breaker.from_half_open_to_closed() {
                    self.reset_metric();
                }
            }
            State::Closed => {
                let (error_count, total_count) = self.stat.sum_with_time(now);
                if !self.breaker.bound_rule().reaches_min_request_amount(total_count) {
                    return;
                }
                let error_ratio = error_count as f64 / total_count as f64;
                if error_ratio >= self.error_ratio_threshold {
                    self.breaker
                        .from_closed_to_open_with_time(now, Arc::new(error_ratio));
                }
            }
            State::Open => {}
        }
    }
}

impl CircuitBreakerTrait for ErrorRatioBreaker {
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

    fn breaker_of(resource: &str) -> ErrorRatioBreaker {
        ErrorRatioBreaker::new(Arc::new(Rule {
            resource: resource.into(),
            strategy: BreakerStrategy::ErrorRatio,
            retry_timeout_ms: 3000,
            min_request_amount: 10,
            stat_interval_ms: 10000,
            threshold: 0.5,
            ..Default::default()
        }))
        .unwrap()
    }

    #[test]
    fn trips_above_ratio() {
        let cb = breaker_of("error_ratio_trips");
        for i in 0..10 {
            cb.record_with_time(T0, i < 6);
            if i < 9 {
                // below min_request_amount
                assert_eq!(cb.current_state(), State::Closed);
            }
        }
        assert_eq!(cb.current_state(), State::Open);
        assert_eq!(cb.next_retry_timestamp_ms(), T0 + 3000);
    }

    #[test]
    fn stays_closed_below_ratio() {
        let cb = breaker_of("error_ratio_closed");
        for i in 0..10 {
            cb.record_with_time(T0, i < 4);
        }
        assert_eq!(cb.current_state(), State::Closed);
    }

    #[test]
    fn probe_outcome() {
        let cb = breaker_of("error_ratio_probe");
        cb.breaker().set_state(State::HalfOpen);
        cb.record_with_time(T0, true);
        assert_eq!(cb.current_state(), State::Open);

        cb.breaker().set_state(State::HalfOpen);
        cb.record_with_time(T0, false);
        assert_eq!(cb.current_state(), State::Closed);
        assert_eq!(cb.stat().sum_with_time(T0), (0, 0));
    }
}
