//! Metric Item
//!
use super::{ResourceType, TimePredicate};
use crate::utils::format_time_millis;
use std::fmt;

pub const METRIC_PART_SEPARATOR: &str = "|";

/// MetricItem is the per-second aggregation of a resource's buckets,
/// as handed out to metric consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricItem {
    pub(crate) resource: String,
    pub(crate) resource_type: ResourceType,
    /// start of the second, in milliseconds
    pub(crate) timestamp: u64,
    pub(crate) pass_qps: u64,
    pub(crate) block_qps: u64,
    pub(crate) complete_qps: u64,
    pub(crate) error_qps: u64,
    pub(crate) avg_rt: u64,
    pub(crate) concurrency: u32,
}

impl MetricItem {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn pass_qps(&self) -> u64 {
        self.pass_qps
    }

    pub fn block_qps(&self) -> u64 {
        self.block_qps
    }

    pub fn complete_qps(&self) -> u64 {
        self.complete_qps
    }

    pub fn error_qps(&self) -> u64 {
        self.error_qps
    }

    pub fn avg_rt(&self) -> u64 {
        self.avg_rt
    }

    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }
}

/// One line: `timestamp|hh:mm:ss|resource|pass|block|complete|error|avg_rt|concurrency|type`
impl fmt::Display for MetricItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.timestamp,
            format_time_millis(self.timestamp),
            self.resource.replace(METRIC_PART_SEPARATOR, "_"),
            self.pass_qps,
            self.block_qps,
            self.complete_qps,
            self.error_qps,
            self.avg_rt,
            self.concurrency,
            self.resource_type as u8
        )
    }
}

pub trait MetricItemRetriever: Send + Sync {
    fn metrics_on_condition(&self, predicate: &TimePredicate) -> Vec<MetricItem>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let item = MetricItem {
            resource: "/foo|bar".into(),
            resource_type: ResourceType::Web,
            timestamp: 1000,
            pass_qps: 4,
            block_qps: 9,
            complete_qps: 3,
            error_qps: 0,
            avg_rt: 25,
            concurrency: 2,
        };
        assert_eq!(
            item.to_string(),
            format!("1000|00:00:01|/foo_bar|4|9|3|0|25|2|{}", ResourceType::Web as u8)
        );
    }
}
