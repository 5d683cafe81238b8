use super::{BucketLeapArray, SlidingWindowMetric};
use crate::{
    base::{
        ConcurrencyStat, MetricEvent, MetricItem, MetricItemRetriever, ReadStat, StatNode,
        TimePredicate, WriteStat, DEFAULT_INTERVAL_MS, DEFAULT_INTERVAL_MS_TOTAL,
        DEFAULT_SAMPLE_COUNT, DEFAULT_SAMPLE_COUNT_TOTAL,
    },
    config, logging, Result,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// StatisticNode is the counting core shared by every kind of node:
/// the buckets of the global window, a readonly view with the default window,
/// and the exact amount of in-flight calls.
#[derive(Debug)]
pub struct StatisticNode {
    sample_count: u32,
    interval_ms: u32,
    concurrency: AtomicU32,
    arr: Arc<BucketLeapArray>,
    metric: Arc<SlidingWindowMetric>,
}

impl Default for StatisticNode {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticNode {
    /// Uses the windows of the global configuration.
    pub fn new() -> Self {
        let params = (
            config::global_stat_sample_count_total(),
            config::global_stat_interval_ms_total(),
            config::metric_stat_sample_count(),
            config::metric_stat_interval_ms(),
        );
        match Self::with_params(params.0, params.1, params.2, params.3) {
            Ok(node) => node,
            Err(err) => {
                logging::warn!(
                    "[StatisticNode::new] invalid statistic parameters {:?}, fall back to the defaults, err: {:?}",
                    params,
                    err
                );
                Self::default_params()
            }
        }
    }

    pub fn with_params(
        sample_count_total: u32,
        interval_ms_total: u32,
        sample_count: u32,
        interval_ms: u32,
    ) -> Result<Self> {
        let arr = Arc::new(BucketLeapArray::new(sample_count_total, interval_ms_total)?);
        let metric = Arc::new(SlidingWindowMetric::new(
            sample_count,
            interval_ms,
            arr.clone(),
        )?);
        Ok(StatisticNode {
            sample_count,
            interval_ms,
            concurrency: AtomicU32::new(0),
            arr,
            metric,
        })
    }

    fn default_params() -> Self {
        let arr = Arc::new(
            BucketLeapArray::new(DEFAULT_SAMPLE_COUNT_TOTAL, DEFAULT_INTERVAL_MS_TOTAL)
                .unwrap_or_else(|_| unreachable!("default statistic window is valid")),
        );
        let metric = Arc::new(
            SlidingWindowMetric::new(DEFAULT_SAMPLE_COUNT, DEFAULT_INTERVAL_MS, arr.clone())
                .unwrap_or_else(|_| unreachable!("default statistic window is valid")),
        );
        StatisticNode {
            sample_count: DEFAULT_SAMPLE_COUNT,
            interval_ms: DEFAULT_INTERVAL_MS,
            concurrency: AtomicU32::new(0),
            arr,
            metric,
        }
    }

    pub fn default_metric(&self) -> Arc<SlidingWindowMetric> {
        self.metric.clone()
    }

    pub(crate) fn leap_array(&self) -> &Arc<BucketLeapArray> {
        &self.arr
    }

    /// Largest single bucket of the default window, scaled to a per second rate.
    pub fn max_avg(&self, event: MetricEvent) -> f64 {
        self.metric.max_of_single_bucket(event) as f64 * self.sample_count as f64
            / self.interval_ms as f64
            * 1000f64
    }

    pub fn max_concurrency(&self) -> u32 {
        self.metric.max_concurrency()
    }
}

impl MetricItemRetriever for StatisticNode {
    fn metrics_on_condition(&self, predicate: &TimePredicate) -> Vec<MetricItem> {
        self.metric.second_metrics_on_condition(predicate)
    }
}

impl ReadStat for StatisticNode {
    fn qps(&self, event: MetricEvent) -> f64 {
        self.metric.qps(event)
    }
    fn qps_previous(&self, event: MetricEvent) -> f64 {
        self.metric.qps_previous(event)
    }
    fn sum(&self, event: MetricEvent) -> u64 {
        self.metric.sum(event)
    }
    fn min_rt(&self) -> f64 {
        self.metric.min_rt()
    }
    fn avg_rt(&self) -> f64 {
        self.metric.avg_rt()
    }
}

impl WriteStat for StatisticNode {
    fn add_count(&self, event: MetricEvent, count: u64) {
        self.arr.add_count(event, count);
    }

    fn update_concurrency(&self, concurrency: u32) {
        self.arr.update_concurrency(concurrency);
    }
}

impl ConcurrencyStat for StatisticNode {
    fn current_concurrency(&self) -> u32 {
        self.concurrency.load(Ordering::SeqCst)
    }

    fn increase_concurrency(&self) {
        let curr = self.concurrency.fetch_add(1, Ordering::SeqCst) + 1;
        self.arr.update_concurrency(curr);
    }

    fn decrease_concurrency(&self) {
        // never below zero, even on unbalanced calls
        let _ = self
            .concurrency
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1));
    }
}

impl StatNode for StatisticNode {
    fn generate_read_stat(&self, sample_count: u32, interval_ms: u32) -> Result<Arc<dyn ReadStat>> {
        let stat = SlidingWindowMetric::new(sample_count, interval_ms, self.arr.clone())?;
        Ok(Arc::new(stat))
    }
}

/// Implements the statistic traits of `$ty` by forwarding to its StatisticNode field.
macro_rules! delegate_stat_node {
    ($ty:ty, $field:ident) => {
        impl $crate::base::MetricItemRetriever for $ty {
            fn metrics_on_condition(
                &self,
                predicate: &$crate::base::TimePredicate,
            ) -> Vec<$crate::base::MetricItem> {
                $crate::base::MetricItemRetriever::metrics_on_condition(&self.$field, predicate)
            }
        }

        impl $crate::base::ReadStat for $ty {
            fn qps(&self, event: $crate::base::MetricEvent) -> f64 {
                $crate::base::ReadStat::qps(&self.$field, event)
            }
            fn qps_previous(&self, event: $crate::base::MetricEvent) -> f64 {
                $crate::base::ReadStat::qps_previous(&self.$field, event)
            }
            fn sum(&self, event: $crate::base::MetricEvent) -> u64 {
                $crate::base::ReadStat::sum(&self.$field, event)
            }
            fn min_rt(&self) -> f64 {
                $crate::base::ReadStat::min_rt(&self.$field)
            }
            fn avg_rt(&self) -> f64 {
                $crate::base::ReadStat::avg_rt(&self.$field)
            }
        }

        impl $crate::base::WriteStat for $ty {
            fn add_count(&self, event: $crate::base::MetricEvent, count: u64) {
                $crate::base::WriteStat::add_count(&self.$field, event, count);
            }
            fn update_concurrency(&self, concurrency: u32) {
                $crate::base::WriteStat::update_concurrency(&self.$field, concurrency);
            }
        }

        impl $crate::base::ConcurrencyStat for $ty {
            fn current_concurrency(&self) -> u32 {
                $crate::base::ConcurrencyStat::current_concurrency(&self.$field)
            }
            fn increase_concurrency(&self) {
                $crate::base::ConcurrencyStat::increase_concurrency(&self.$field)
            }
            fn decrease_concurrency(&self) {
                $crate::base::ConcurrencyStat::decrease_concurrency(&self.$field)
            }
        }

        impl $crate::base::StatNode for $ty {
            fn generate_read_stat(
                &self,
                sample_count: u32,
                interval_ms: u32,
            ) -> $crate::Result<std::sync::Arc<dyn $crate::base::ReadStat>> {
                $crate::base::StatNode::generate_read_stat(&self.$field, sample_count, interval_ms)
            }
        }
    };
}

pub(crate) use delegate_stat_node;
