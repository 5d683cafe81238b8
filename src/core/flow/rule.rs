use crate::{base::GuardRule, logging, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

pub type Id = String;

/// MetricType is the statistic a flow rule limits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// passed requests within the statistic interval
    Qps,
    /// requests in flight
    Concurrency,
}

impl Default for MetricType {
    fn default() -> MetricType {
        MetricType::Qps
    }
}

/// RelationStrategy selects the statistics a rule is checked against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationStrategy {
    /// the statistics of the resource itself
    Current,
    /// the statistics of `ref_resource`
    Associated,
    /// the statistics of the resource under the context named `ref_resource`,
    /// the rule does not apply to entries of other contexts
    Chain,
}

impl Default for RelationStrategy {
    fn default() -> RelationStrategy {
        RelationStrategy::Current
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Hash, Eq)]
pub enum CalculateStrategy {
    Direct,
    WarmUp,
    Adaptive,
    #[serde(skip)]
    Custom(u8),
}

impl Default for CalculateStrategy {
    fn default() -> CalculateStrategy {
        CalculateStrategy::Direct
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Hash, Eq)]
pub enum ControlStrategy {
    Reject,
    /// Throttling spaces the requests out evenly,
    /// queueing them up to `max_queueing_time_ms`
    Throttling,
    #[serde(skip)]
    Custom(u8),
}

impl Default for ControlStrategy {
    fn default() -> ControlStrategy {
        ControlStrategy::Reject
    }
}

/// How the adaptive calculator adjusts its grant rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdaptiveAlgorithm {
    Gradient,
    Pid,
}

impl Default for AdaptiveAlgorithm {
    fn default() -> AdaptiveAlgorithm {
        AdaptiveAlgorithm::Gradient
    }
}

/// Rule describes how the traffic of a resource is shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// `id` represents the unique ID of the rule (optional).
    pub id: Id,
    /// `resource` represents the resource name.
    pub resource: String,
    /// the associated resource, or the context name for `RelationStrategy::Chain`
    pub ref_resource: String,
    pub metric_type: MetricType,
    pub calculate_strategy: CalculateStrategy,
    pub control_strategy: ControlStrategy,
    pub relation_strategy: RelationStrategy,
    /// `threshold` means the threshold during stat_interval_ms
    /// If `stat_interval_ms` is 1000(1 second), `threshold` means QPS
    pub threshold: f64,
    pub warm_up_period_sec: u32,
    pub warm_up_cold_factor: u32,
    /// `max_queueing_time_ms` only takes effect when `control_strategy` is Throttling.
    /// When `max_queueing_time_ms` is 0, it means Throttling only controls interval of requests,
    /// and requests exceeding the threshold will be rejected directly.
    pub max_queueing_time_ms: u32,
    /// the statistic interval of the rule, 0 for the default statistic of the resource.
    /// Intervals that cannot reuse the buckets of the resource get their own statistic.
    pub stat_interval_ms: u32,

    // parameters of `CalculateStrategy::Adaptive`
    pub adaptive_algorithm: AdaptiveAlgorithm,
    /// expected ratio of passed requests
    pub adaptive_target_ratio: f64,
    /// expected average response time, 0 ignores the response time
    pub adaptive_expected_rt_ms: u64,
    /// the grant rate never goes below it
    pub adaptive_min_threshold: f64,
}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.ref_resource.hash(state);
    }
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            ref_resource: String::default(),
            metric_type: MetricType::default(),
            calculate_strategy: CalculateStrategy::default(),
            control_strategy: ControlStrategy::default(),
            relation_strategy: RelationStrategy::default(),
            threshold: 0.0,
            warm_up_period_sec: 0,
            warm_up_cold_factor: 0,
            max_queueing_time_ms: 0,
            stat_interval_ms: 0,
            adaptive_algorithm: AdaptiveAlgorithm::default(),
            adaptive_target_ratio: 0.95,
            adaptive_expected_rt_ms: 0,
            adaptive_min_threshold: 1.0,
        }
    }
}

impl Rule {
    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.relation_strategy == other.relation_strategy
            && self.ref_resource == other.ref_resource
            && self.stat_interval_ms == other.stat_interval_ms
            && self.need_statistic()
            && other.need_statistic()
    }

    /// Whether the controller reads a windowed pass count bound at load time.
    pub fn need_statistic(&self) -> bool {
        self.metric_type == MetricType::Qps
            && (self.calculate_strategy == CalculateStrategy::WarmUp
                || self.control_strategy == ControlStrategy::Reject)
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
        if self.threshold <= 0.0 {
            return Err(Error::msg("threshold must be positive"));
        }
        if self.relation_strategy != RelationStrategy::Current && self.ref_resource.is_empty() {
            return Err(Error::msg(
                "ref_resource must be non empty when relation_strategy is Associated or Chain",
            ));
        }
        if self.metric_type == MetricType::Concurrency
            && (self.control_strategy == ControlStrategy::Throttling
                || self.calculate_strategy != CalculateStrategy::Direct)
        {
            return Err(Error::msg(
                "concurrency rules only support direct calculation with rejection",
            ));
        }
        if self.calculate_strategy == CalculateStrategy::WarmUp {
            if self.warm_up_period_sec == 0 {
                return Err(Error::msg("warm_up_period_sec must be great than 0"));
            }
            if self.warm_up_cold_factor == 1 {
                return Err(Error::msg("warm_up_cold_factor must be great than 1"));
            }
        }
        if self.calculate_strategy == CalculateStrategy::Adaptive {
            if self.adaptive_target_ratio <= 0.0 || self.adaptive_target_ratio > 1.0 {
                return Err(Error::msg("adaptive_target_ratio must be in (0, 1]"));
            }
            if self.adaptive_min_threshold <= 0.0 || self.adaptive_min_threshold > self.threshold {
                return Err(Error::msg(
                    "adaptive_min_threshold must be positive and not greater than threshold",
                ));
            }
        }
        if self.stat_interval_ms > 10 * 60 * 1000 {
            logging::info!(
                "stat_interval_ms is great than 10 minutes, less than 10 minutes is recommended."
            )
        }
        Ok(())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.ref_resource == other.ref_resource
            && self.metric_type == other.metric_type
            && self.calculate_strategy == other.calculate_strategy
            && self.control_strategy == other.control_strategy
            && self.relation_strategy == other.relation_strategy
            && self.threshold == other.threshold
            && self.warm_up_period_sec == other.warm_up_period_sec
            && self.warm_up_cold_factor == other.warm_up_cold_factor
            && self.max_queueing_time_ms == other.max_queueing_time_ms
            && self.stat_interval_ms == other.stat_interval_ms
            && self.adaptive_algorithm == other.adaptive_algorithm
            && self.adaptive_target_ratio == other.adaptive_target_ratio
            && self.adaptive_expected_rt_ms == other.adaptive_expected_rt_ms
            && self.adaptive_min_threshold == other.adaptive_min_threshold
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn need_statistic() {
        let reject = Rule {
            resource: "abc1".into(),
            threshold: 100.0,
            stat_interval_ms: 1000,
            ..Default::default()
        };
        let throttling = Rule {
            control_strategy: ControlStrategy::Throttling,
            max_queueing_time_ms: 10,
            ..reject.clone()
        };
        let warm_up_throttling = Rule {
            calculate_strategy: CalculateStrategy::WarmUp,
            ..throttling.clone()
        };
        let concurrency = Rule {
            metric_type: MetricType::Concurrency,
            ..reject.clone()
        };

        assert!(reject.need_statistic());
        assert!(!throttling.need_statistic());
        assert!(warm_up_throttling.need_statistic());
        assert!(!concurrency.need_statistic());
    }

    #[test]
    fn is_stat_reusable() {
        let base = Rule {
            resource: "abc1".into(),
            threshold: 100.0,
            stat_interval_ms: 1000,
            ..Default::default()
        };
        let other_resource = Rule {
            resource: "abc2".into(),
            ..base.clone()
        };
        let associated = Rule {
            relation_strategy: RelationStrategy::Associated,
            ref_resource: "abc3".into(),
            ..base.clone()
        };
        let other_ref = Rule {
            ref_resource: "abc4".into(),
            ..associated.clone()
        };
        let other_interval = Rule {
            stat_interval_ms: 2000,
            ..base.clone()
        };
        let throttling = Rule {
            control_strategy: ControlStrategy::Throttling,
            ..base.clone()
        };
        let other_threshold = Rule {
            threshold: 200.0,
            ..base.clone()
        };

        assert!(!base.is_stat_reusable(&other_resource));
        assert!(!base.is_stat_reusable(&associated));
        assert!(!associated.is_stat_reusable(&other_ref));
        assert!(!base.is_stat_reusable(&other_interval));
        assert!(!base.is_stat_reusable(&throttling));
        assert!(base.is_stat_reusable(&other_threshold));
    }

    #[test]
    fn equality_ignores_id() {
        let r1 = Rule {
            resource: "abc".into(),
            threshold: 10.0,
            ..Default::default()
        };
        let r2 = Rule {
            resource: "abc".into(),
            threshold: 10.0,
            ..Default::default()
        };
        assert_ne!(r1.id, r2.id);
        assert_eq!(r1, r2);
    }

    #[test]
    fn validity() {
        let bad_rules = vec![
            Rule {
                threshold: 0.0,
                resource: "test".into(),
                ..Default::default()
            },
            Rule {
                threshold: 1.0,
                ..Default::default()
            },
            Rule {
                threshold: -1.9,
                resource: "test".into(),
                ..Default::default()
            },
            Rule {
                threshold: 5.0,
                resource: "test".into(),
                calculate_strategy: CalculateStrategy::WarmUp,
                ..Default::default()
            },
            Rule {
                threshold: 5.0,
                resource: "test".into(),
                relation_strategy: RelationStrategy::Chain,
                ..Default::default()
            },
            Rule {
                threshold: 5.0,
                resource: "test".into(),
                metric_type: MetricType::Concurrency,
                control_strategy: ControlStrategy::Throttling,
                ..Default::default()
            },
            Rule {
                threshold: 5.0,
                resource: "test".into(),
                calculate_strategy: CalculateStrategy::Adaptive,
                adaptive_target_ratio: 1.5,
                ..Default::default()
            },
            Rule {
                threshold: 5.0,
                resource: "test".into(),
                calculate_strategy: CalculateStrategy::Adaptive,
                adaptive_min_threshold: 10.0,
                ..Default::default()
            },
        ];
        for rule in bad_rules {
            assert!(rule.is_valid().is_err(), "{:?}", rule);
        }

        let good_rules = vec![
            Rule {
                threshold: 10.0,
                resource: "test".into(),
                calculate_strategy: CalculateStrategy::WarmUp,
                control_strategy: ControlStrategy::Throttling,
                warm_up_period_sec: 10,
                max_queueing_time_ms: 10,
                stat_interval_ms: 1000,
                ..Default::default()
            },
            Rule {
                threshold: 10.0,
                resource: "test".into(),
                metric_type: MetricType::Concurrency,
                ..Default::default()
            },
            Rule {
                threshold: 10.0,
                resource: "test".into(),
                relation_strategy: RelationStrategy::Chain,
                ref_resource: "entrance".into(),
                ..Default::default()
            },
            Rule {
                threshold: 100.0,
                resource: "test".into(),
                calculate_strategy: CalculateStrategy::Adaptive,
                adaptive_expected_rt_ms: 20,
                ..Default::default()
            },
        ];
        for rule in good_rules {
            assert!(rule.is_valid().is_ok(), "{:?}", rule);
        }
    }
}
