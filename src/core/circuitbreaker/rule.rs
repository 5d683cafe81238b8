use super::*;
use crate::{base::GuardRule, logging, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// `Rule` describes when the breaker of a resource opens and how long it stays open.
///
/// Every strategy counts the completed calls of a sliding window of `stat_interval_ms`,
/// split into `stat_sliding_window_bucket_count` buckets, and is only evaluated once
/// the window holds at least `min_request_amount` calls.
/// `threshold` is read per strategy:
///
/// - `SlowRequestRatio`: the ratio of calls slower than `max_allowed_rt_ms`, in (0, 1].
/// - `ErrorRatio`: the ratio of failed calls, in (0, 1].
/// - `ErrorCount`: the number of failed calls, at least 1.
/// - `Custom`: whatever the registered breaker makes of it, only positivity is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub id: String,
    pub resource: String,
    pub strategy: BreakerStrategy,
    /// time an open breaker waits before letting a single probe through
    pub retry_timeout_ms: u32,
    pub min_request_amount: u64,
    pub stat_interval_ms: u32,
    /// 0 or a count not dividing `stat_interval_ms` means a single bucket
    pub stat_sliding_window_bucket_count: u32,
    pub max_allowed_rt_ms: u64,
    pub threshold: f64,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            strategy: BreakerStrategy::default(),
            retry_timeout_ms: 0,
            min_request_amount: 0,
            stat_interval_ms: 0,
            stat_sliding_window_bucket_count: 0,
            max_allowed_rt_ms: 0,
            threshold: 0.0,
        }
    }
}

impl Rule {
    /// Whether a breaker of `other` can keep the window built for this rule.
    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.strategy == other.strategy
            && self.stat_interval_ms == other.stat_interval_ms
            && self.bucket_count() == other.bucket_count()
    }

    pub fn bucket_count(&self) -> u32 {
        match self.stat_sliding_window_bucket_count {
            0 => 1,
            count if self.stat_interval_ms % count != 0 => 1,
            count => count,
        }
    }

    /// A call is slow once its response time exceeds `max_allowed_rt_ms`.
    pub fn is_slow(&self, rt_ms: u64) -> bool {
        rt_ms > self.max_allowed_rt_ms
    }

    /// Whether a window of `total_count` calls is large enough to be evaluated.
    pub fn reaches_min_request_amount(&self, total_count: u64) -> bool {
        total_count > 0 && total_count >= self.min_request_amount
    }
}

impl GuardRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> crate::Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        if self.stat_interval_ms == 0 {
            return Err(Error::msg("stat_interval_ms must be positive"));
        }
        if self.retry_timeout_ms == 0 {
            return Err(Error::msg("retry_timeout_ms must be positive"));
        }
        if self.threshold <= 0.0 {
            return Err(Error::msg("threshold must be positive"));
        }
        match self.strategy {
            BreakerStrategy::Custom(_) => return Ok(()),
            BreakerStrategy::ErrorCount if self.threshold < 1.0 => {
                return Err(Error::msg("error count threshold must be at least 1"));
            }
            BreakerStrategy::SlowRequestRatio | BreakerStrategy::ErrorRatio
                if self.threshold > 1.0 =>
            {
                return Err(Error::msg(format!(
                    "{:?} threshold is a ratio in (0, 1]",
                    self.strategy
                )));
            }
            _ => {}
        }
        if self.bucket_count() != self.stat_sliding_window_bucket_count.max(1) {
            logging::warn!(
                "[CircuitBreaker] stat_interval_ms is not divisible by stat_sliding_window_bucket_count, a single bucket is used, rule {:?}",
                self
            );
        }
        Ok(())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        let rt_matches = self.strategy != BreakerStrategy::SlowRequestRatio
            || self.max_allowed_rt_ms == other.max_allowed_rt_ms;
        self.is_stat_reusable(other)
            && self.retry_timeout_ms == other.retry_timeout_ms
            && self.min_request_amount == other.min_request_amount
            && self.threshold == other.threshold
            && rt_matches
    }
}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.strategy.hash(state);
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn slow_rule() -> Rule {
        Rule {
            resource: "cb_rule".into(),
            strategy: BreakerStrategy::SlowRequestRatio,
            retry_timeout_ms: 1000,
            min_request_amount: 5,
            stat_interval_ms: 1000,
            max_allowed_rt_ms: 200,
            threshold: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn slow_call_grading() {
        let rule = slow_rule();
        assert!(!rule.is_slow(150));
        // exactly the allowed RT is not slow
        assert!(!rule.is_slow(200));
        assert!(rule.is_slow(201));

        let strict = Rule {
            max_allowed_rt_ms: 0,
            ..slow_rule()
        };
        assert!(!strict.is_slow(0));
        assert!(strict.is_slow(1));
    }

    #[test]
    fn min_request_amount_boundaries() {
        let rule = slow_rule();
        assert!(!rule.reaches_min_request_amount(4));
        assert!(rule.reaches_min_request_amount(5));
        assert!(rule.reaches_min_request_amount(50));

        // an empty window is never evaluated
        let any_amount = Rule {
            min_request_amount: 0,
            ..slow_rule()
        };
        assert!(!any_amount.reaches_min_request_amount(0));
        assert!(any_amount.reaches_min_request_amount(1));
    }

    #[test]
    fn equality_follows_strategy() {
        let faster = Rule {
            max_allowed_rt_ms: 100,
            ..slow_rule()
        };
        assert_ne!(slow_rule(), faster);
        assert!(slow_rule().is_stat_reusable(&faster));

        // the RT bound is irrelevant to error rules
        let errors = Rule {
            strategy: BreakerStrategy::ErrorRatio,
            ..slow_rule()
        };
        assert_eq!(
            errors,
            Rule {
                max_allowed_rt_ms: 100,
                ..errors.clone()
            }
        );
        assert!(!slow_rule().is_stat_reusable(&errors));

        // buckets that fall back to one window are the same window
        let odd_buckets = Rule {
            stat_sliding_window_bucket_count: 3,
            ..slow_rule()
        };
        assert_eq!(odd_buckets.bucket_count(), 1);
        assert!(odd_buckets.is_stat_reusable(&slow_rule()));
        let ten_buckets = Rule {
            stat_sliding_window_bucket_count: 10,
            ..slow_rule()
        };
        assert_eq!(ten_buckets.bucket_count(), 10);
        assert!(!ten_buckets.is_stat_reusable(&slow_rule()));
    }

    #[test]
    fn thresholds_per_strategy() {
        assert!(slow_rule().is_valid().is_ok());
        let cases = vec![
            (BreakerStrategy::SlowRequestRatio, 1.0, true),
            (BreakerStrategy::SlowRequestRatio, 1.5, false),
            (BreakerStrategy::ErrorRatio, 0.01, true),
            (BreakerStrategy::ErrorRatio, 0.0, false),
            (BreakerStrategy::ErrorCount, 1.0, true),
            (BreakerStrategy::ErrorCount, 0.5, false),
            (BreakerStrategy::ErrorCount, 30.0, true),
            // a custom breaker reads the threshold its own way
            (BreakerStrategy::Custom(7), 30.0, true),
            (BreakerStrategy::Custom(7), 0.0, false),
            (BreakerStrategy::Custom(7), -1.0, false),
        ];
        for (strategy, threshold, valid) in cases {
            let rule = Rule {
                strategy,
                threshold,
                ..slow_rule()
            };
            assert_eq!(rule.is_valid().is_ok(), valid, "{:?} {}", strategy, threshold);
        }
    }

    #[test]
    fn required_fields() {
        let cases = vec![
            (
                Rule {
                    resource: String::new(),
                    ..slow_rule()
                },
                "empty resource name",
            ),
            (
                Rule {
                    stat_interval_ms: 0,
                    ..slow_rule()
                },
                "stat_interval_ms must be positive",
            ),
            (
                Rule {
                    retry_timeout_ms: 0,
                    ..slow_rule()
                },
                "retry_timeout_ms must be positive",
            ),
            (
                Rule {
                    threshold: 0.0,
                    ..slow_rule()
                },
                "threshold must be positive",
            ),
        ];
        for (rule, msg) in cases {
            assert_eq!(rule.is_valid().unwrap_err().to_string(), msg);
        }
    }
}
