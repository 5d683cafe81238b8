use super::*;
use crate::{
    base::{BlockType, EntryInput, ParamKey, TokenResult},
    logging, utils,
};
use std::cmp::min;
use std::sync::{atomic::Ordering, Arc};

/// values tracked by a concurrency rule without `params_max_capacity`
pub const CONCURRENCY_MAX_COUNT: usize = 4000;
/// values tracked per second of `duration_in_sec` by a QPS rule without `params_max_capacity`
pub const PARAMS_CAPACITY_BASE: usize = 4000;
pub const PARAMS_MAX_CAPACITY: usize = 20000;

/// ParamsMetric holds the counters of the argument values seen by a rule.
#[derive(Debug)]
pub struct ParamsMetric {
    /// QPS rules: the last refill time of the bucket, or the last pass time when throttling
    pub rule_time_counter: ParamCounter,
    /// QPS rules: the tokens left in the bucket
    pub rule_token_counter: ParamCounter,
    /// concurrency rules: the requests in flight
    pub concurrency_counter: ParamCounter,
}

impl ParamsMetric {
    pub fn new(rule: &Rule) -> Self {
        match rule.metric_type {
            MetricType::Qps => {
                let capacity = if rule.params_max_capacity > 0 {
                    rule.params_max_capacity
                } else {
                    min(
                        PARAMS_MAX_CAPACITY,
                        PARAMS_CAPACITY_BASE * rule.duration_in_sec.max(1) as usize,
                    )
                };
                ParamsMetric {
                    rule_time_counter: ParamCounter::with_capacity(capacity),
                    rule_token_counter: ParamCounter::with_capacity(capacity),
                    concurrency_counter: ParamCounter::with_capacity(0),
                }
            }
            MetricType::Concurrency => {
                let capacity = if rule.params_max_capacity > 0 {
                    rule.params_max_capacity
                } else {
                    CONCURRENCY_MAX_COUNT
                };
                ParamsMetric {
                    rule_time_counter: ParamCounter::with_capacity(0),
                    rule_token_counter: ParamCounter::with_capacity(0),
                    concurrency_counter: ParamCounter::with_capacity(capacity),
                }
            }
        }
    }
}

/// Controller checks the requests of one param rule.
#[derive(Debug)]
pub struct Controller {
    rule: Arc<Rule>,
    metric: Arc<ParamsMetric>,
}

impl Controller {
    /// `metric` is the one of an old controller whose rule is stat reusable with `rule`.
    pub fn new(rule: Arc<Rule>, metric: Option<Arc<ParamsMetric>>) -> Self {
        let metric = metric.unwrap_or_else(|| Arc::new(ParamsMetric::new(&rule)));
        Controller { rule, metric }
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn metric(&self) -> &Arc<ParamsMetric> {
        &self.metric
    }

    /// The argument value the rule applies to: the attachment named `param_key` if any,
    /// otherwise the positional argument at `param_index`.
    pub fn extract_arg(&self, input: &EntryInput) -> Option<ParamKey> {
        let key = self.rule.param_key.trim();
        if !key.is_empty() {
            if let Some(arg) = input.attachments().and_then(|kv| kv.get(key)) {
                return Some(arg.clone());
            }
        }
        let args = input.args()?;
        let mut idx = self.rule.param_index;
        if idx < 0 {
            idx += args.len() as isize;
        }
        if idx < 0 || idx as usize >= args.len() {
            logging::debug!(
                "[HotSpotController] No argument at param_index {}, args: {:?}",
                self.rule.param_index,
                args
            );
            return None;
        }
        Some(args[idx as usize].clone())
    }

    pub fn perform_checking(&self, arg: &ParamKey, batch_count: u32) -> TokenResult {
        self.perform_checking_with_time(arg, batch_count, utils::curr_time_millis())
    }

    pub fn perform_checking_with_time(
        &self,
        arg: &ParamKey,
        batch_count: u32,
        now: u64,
    ) -> TokenResult {
        match (self.rule.metric_type, self.rule.control_strategy) {
            (MetricType::Concurrency, _) => self.check_concurrency(arg),
            (MetricType::Qps, ControlStrategy::Reject) => {
                self.check_reject(arg, batch_count as u64, now)
            }
            (MetricType::Qps, ControlStrategy::Throttling) => {
                self.check_throttling(arg, batch_count as u64, now)
            }
        }
    }

    fn blocked(&self, msg: String, value: u64) -> TokenResult {
        TokenResult::new_blocked_with_cause(
            BlockType::HotSpotParamFlow,
            msg,
            self.rule.clone(),
            Arc::new(value),
        )
    }

    fn check_concurrency(&self, arg: &ParamKey) -> TokenResult {
        let counter = match self.metric.concurrency_counter.add_if_absent(arg, 0) {
            Some(counter) => counter,
            None => return TokenResult::new_pass(),
        };
        let concurrency = counter.load(Ordering::SeqCst) + 1;
        if concurrency <= self.rule.threshold_of(arg) {
            TokenResult::new_pass()
        } else {
            self.blocked(
                format!("hotspot concurrency check blocked, arg: {}", arg),
                concurrency,
            )
        }
    }

    fn check_reject(&self, arg: &ParamKey, batch_count: u64, now: u64) -> TokenResult {
        let time_counter = &self.metric.rule_time_counter;
        let token_counter = &self.metric.rule_token_counter;
        let token_count = self.rule.threshold_of(arg);
        if token_count == 0 {
            return self.blocked(
                format!("hotspot reject check blocked, threshold of arg {} is 0", arg),
                0,
            );
        }
        let max_count = token_count + self.rule.burst_count;
        if batch_count > max_count {
            return self.blocked(
                format!(
                    "hotspot reject check blocked, batch count exceeds the bucket, arg: {}",
                    arg
                ),
                batch_count,
            );
        }
        let duration_ms = self.rule.duration_in_sec * 1000;
        loop {
            let last_add_time = match time_counter.add_if_absent(arg, now) {
                Some(t) => t,
                None => {
                    // a new value starts with a full bucket
                    token_counter.add_if_absent(arg, max_count - batch_count);
                    return TokenResult::new_pass();
                }
            };
            let pass_time = now.saturating_sub(last_add_time.load(Ordering::SeqCst));
            let rest_counter = match token_counter.add_if_absent(arg, max_count - batch_count) {
                Some(c) => c,
                None => {
                    last_add_time.store(now, Ordering::SeqCst);
                    return TokenResult::new_pass();
                }
            };
            let rest = rest_counter.load(Ordering::SeqCst);
            if pass_time > duration_ms {
                // refill for the elapsed time
                let to_add = pass_time * token_count / duration_ms;
                let available = min(max_count, rest + to_add);
                if available < batch_count {
                    return self.blocked(
                        format!("hotspot reject check blocked, no tokens left, arg: {}", arg),
                        token_count,
                    );
                }
                if rest_counter
                    .compare_exchange(
                        rest,
                        available - batch_count,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    last_add_time.store(now, Ordering::SeqCst);
                    return TokenResult::new_pass();
                }
            } else {
                if rest < batch_count {
                    return self.blocked(
                        format!("hotspot reject check blocked, no tokens left, arg: {}", arg),
                        token_count,
                    );
                }
                if rest_counter
                    .compare_exchange(
                        rest,
                        rest - batch_count,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return TokenResult::new_pass();
                }
            }
            std::thread::yield_now();
        }
    }

    fn check_throttling(&self, arg: &ParamKey, batch_count: u64, now: u64) -> TokenResult {
        let time_counter = &self.metric.rule_time_counter;
        let token_count = self.rule.threshold_of(arg);
        if token_count == 0 {
            return self.blocked(
                format!("hotspot throttling check blocked, threshold of arg {} is 0", arg),
                0,
            );
        }
        let interval = ((batch_count * self.rule.duration_in_sec * 1000) as f64
            / token_count as f64)
            .round() as u64;
        loop {
            let last_pass_time = match time_counter.add_if_absent(arg, now) {
                Some(t) => t,
                None => return TokenResult::new_pass(),
            };
            let last = last_pass_time.load(Ordering::SeqCst);
            let expected = last + interval;
            if expected <= now {
                if last_pass_time
                    .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return TokenResult::new_pass();
                }
            } else if expected - now <= self.rule.max_queueing_time_ms {
                if last_pass_time
                    .compare_exchange(last, expected, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return TokenResult::new_should_wait(utils::milli2nano(expected - now));
                }
            } else {
                return self.blocked(
                    format!(
                        "hotspot throttling check blocked, queueing time exceeds the max, arg: {}",
                        arg
                    ),
                    expected - now,
                );
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::ParamsMap;
    use crate::utils::AsAny;

    fn controller_of(rule: Rule) -> Controller {
        Controller::new(Arc::new(rule), None)
    }

    fn qps_rule(control_strategy: ControlStrategy) -> Rule {
        Rule {
            resource: "hot_controller".into(),
            metric_type: MetricType::Qps,
            control_strategy,
            threshold: 2,
            duration_in_sec: 1,
            ..Default::default()
        }
    }

    #[test]
    fn capacities() {
        let tc = controller_of(Rule {
            duration_in_sec: 10,
            ..qps_rule(ControlStrategy::Reject)
        });
        assert_eq!(tc.metric().rule_token_counter.cap(), PARAMS_MAX_CAPACITY);
        let tc = controller_of(Rule {
            params_max_capacity: 100,
            ..qps_rule(ControlStrategy::Reject)
        });
        assert_eq!(tc.metric().rule_time_counter.cap(), 100);
        let tc = controller_of(Rule {
            resource: "hot_controller".into(),
            threshold: 1,
            ..Default::default()
        });
        assert_eq!(tc.metric().concurrency_counter.cap(), CONCURRENCY_MAX_COUNT);
    }

    #[test]
    fn extract_arg() {
        let tc = controller_of(Rule {
            param_index: -1,
            ..qps_rule(ControlStrategy::Reject)
        });
        let mut input = EntryInput::new(1, 0);
        assert!(tc.extract_arg(&input).is_none());
        input.set_args(vec!["a".into(), "b".into()]);
        assert_eq!(tc.extract_arg(&input), Some("b".to_string()));

        let tc = controller_of(Rule {
            param_index: 2,
            ..qps_rule(ControlStrategy::Reject)
        });
        assert!(tc.extract_arg(&input).is_none());

        let tc = controller_of(Rule {
            param_key: "uid".into(),
            ..qps_rule(ControlStrategy::Reject)
        });
        // falls back to param_index 0
        assert_eq!(tc.extract_arg(&input), Some("a".to_string()));
        let mut attachments = ParamsMap::new();
        attachments.insert("uid".into(), "u-7".into());
        input.set_attachments(attachments);
        assert_eq!(tc.extract_arg(&input), Some("u-7".to_string()));
    }

    #[test]
    fn reject_bucket_per_value() {
        let tc = controller_of(Rule {
            burst_count: 1,
            ..qps_rule(ControlStrategy::Reject)
        });
        let (hot, cold): (ParamKey, ParamKey) = ("hot".into(), "cold".into());
        let now = 1_000_000;
        for _ in 0..3 {
            assert!(tc.perform_checking_with_time(&hot, 1, now).is_pass());
        }
        let r = tc.perform_checking_with_time(&hot, 1, now + 10);
        assert_eq!(
            r.block_err().unwrap().block_type(),
            BlockType::HotSpotParamFlow
        );
        assert!(tc.perform_checking_with_time(&cold, 1, now + 10).is_pass());
        // larger than the whole bucket
        assert!(tc.perform_checking_with_time(&cold, 4, now + 10).is_blocked());

        // refilled after the duration
        assert!(tc.perform_checking_with_time(&hot, 2, now + 1500).is_pass());
        assert!(tc.perform_checking_with_time(&hot, 1, now + 1500).is_blocked());
    }

    #[test]
    fn reject_specific_item() {
        let mut rule = qps_rule(ControlStrategy::Reject);
        rule.specific_items.insert("vip".into(), 5);
        let tc = controller_of(rule);
        let vip: ParamKey = "vip".into();
        for _ in 0..5 {
            assert!(tc.perform_checking_with_time(&vip, 1, 1000).is_pass());
        }
        assert!(tc.perform_checking_with_time(&vip, 1, 1000).is_blocked());
    }

    #[test]
    fn throttling_spaces_requests() {
        let tc = controller_of(Rule {
            max_queueing_time_ms: 600,
            ..qps_rule(ControlStrategy::Throttling)
        });
        let arg: ParamKey = "u".into();
        let now = 1_000_000;
        assert!(tc.perform_checking_with_time(&arg, 1, now).is_pass());
        let r = tc.perform_checking_with_time(&arg, 1, now);
        assert_eq!(r.nanos_to_wait(), utils::milli2nano(500));
        // 1000ms behind, over the queueing time
        assert!(tc.perform_checking_with_time(&arg, 1, now).is_blocked());
        assert!(tc.perform_checking_with_time(&arg, 1, now + 1000).is_pass());
    }

    #[test]
    fn concurrency() {
        let mut rule = Rule {
            resource: "hot_controller".into(),
            threshold: 1,
            ..Default::default()
        };
        rule.specific_items.insert("batch".into(), 3);
        let tc = controller_of(rule);
        let arg: ParamKey = "u".into();
        assert!(tc.perform_checking(&arg, 1).is_pass());
        let counter = tc.metric().concurrency_counter.get(&arg).unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
        let r = tc.perform_checking(&arg, 1);
        let value = r.block_err().unwrap().triggered_value().unwrap();
        assert_eq!((*value).as_any().downcast_ref::<u64>(), Some(&2));

        let batch: ParamKey = "batch".into();
        assert!(tc.perform_checking(&batch, 1).is_pass());
        tc.metric()
            .concurrency_counter
            .get(&batch)
            .unwrap()
            .fetch_add(2, Ordering::SeqCst);
        assert!(tc.perform_checking(&batch, 1).is_pass());
    }
}
