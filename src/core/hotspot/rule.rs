use crate::{
    base::{GuardRule, ParamKey},
    Error,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// ControlStrategy is how a QPS param rule treats the requests over the threshold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlStrategy {
    /// token bucket per argument value, the requests without a token are rejected
    Reject,
    /// requests of an argument value are spaced evenly, queueing up to `max_queueing_time_ms`
    Throttling,
}

impl Default for ControlStrategy {
    fn default() -> Self {
        ControlStrategy::Reject
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// in-flight requests carrying the same argument value
    Concurrency,
    /// requests carrying the same argument value within `duration_in_sec`
    Qps,
}

impl Default for MetricType {
    fn default() -> Self {
        MetricType::Concurrency
    }
}

/// `Rule` limits the traffic of a resource per value of one of its arguments,
/// so that a few hot values cannot take the whole capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub id: String,
    pub resource: String,
    pub metric_type: MetricType,
    /// only used by `Qps` rules
    pub control_strategy: ControlStrategy,
    /// position of the argument in `EntryInput::args()`, negative positions count from the end
    pub param_index: isize,
    /// key of the argument in `EntryInput::attachments()`, looked up before `param_index`
    pub param_key: String,
    pub threshold: u64,
    /// only used by `Qps` rules with `Throttling`
    pub max_queueing_time_ms: u64,
    /// tokens granted on top of `threshold`, only used by `Qps` rules with `Reject`
    pub burst_count: u64,
    pub duration_in_sec: u64,
    /// how many argument values are tracked, 0 picks a default from the metric type
    pub params_max_capacity: usize,
    /// thresholds of particular argument values, overriding `threshold`
    pub specific_items: HashMap<ParamKey, u64>,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            metric_type: MetricType::default(),
            control_strategy: ControlStrategy::default(),
            param_index: 0,
            param_key: String::default(),
            threshold: 0,
            max_queueing_time_ms: 0,
            burst_count: 0,
            duration_in_sec: 0,
            params_max_capacity: 0,
            specific_items: HashMap::new(),
        }
    }
}

impl Rule {
    /// Whether a controller of `other` can keep the counters built for this rule.
    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.metric_type == other.metric_type
            && self.control_strategy == other.control_strategy
            && self.duration_in_sec == other.duration_in_sec
            && self.params_max_capacity == other.params_max_capacity
    }

    pub fn threshold_of(&self, arg: &ParamKey) -> u64 {
        self.specific_items
            .get(arg)
            .copied()
            .unwrap_or(self.threshold)
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
        if self.threshold == 0 {
            return Err(Error::msg("threshold must be positive"));
        }
        if self.metric_type == MetricType::Qps && self.duration_in_sec == 0 {
            return Err(Error::msg("duration_in_sec must be positive for QPS rules"));
        }
        if self.param_index != 0 && !self.param_key.is_empty() {
            return Err(Error::msg(
                "param_index and param_key are mutually exclusive",
            ));
        }
        Ok(())
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.is_stat_reusable(other)
            && self.param_index == other.param_index
            && self.param_key == other.param_key
            && self.threshold == other.threshold
            && self.max_queueing_time_ms == other.max_queueing_time_ms
            && self.burst_count == other.burst_count
            && self.specific_items == other.specific_items
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.param_index.hash(state);
        self.param_key.hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", fmtted)
    }
}
