use super::{BucketLeapArray, BucketWrap, MetricBucket};
use crate::base::{
    check_validity_for_reuse_statistic, MetricEvent, MetricItem, ReadStat, TimePredicate,
    DEFAULT_STATISTIC_MAX_RT,
};
use crate::utils::curr_time_millis;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// SlidingWindowMetric is a readonly view over the buckets of a BucketLeapArray,
/// with a window that is a whole multiple of the array's buckets.
/// Several views with different windows may share one array.
/// The window always ends with the bucket holding the read time, which is still filling.
#[derive(Debug)]
pub struct SlidingWindowMetric {
    bucket_len_ms: u32,
    sample_count: u32,
    interval_ms: u32,
    inner: Arc<BucketLeapArray>,
}

impl SlidingWindowMetric {
    pub fn new(sample_count: u32, interval_ms: u32, inner: Arc<BucketLeapArray>) -> Result<Self> {
        check_validity_for_reuse_statistic(
            sample_count,
            interval_ms,
            inner.sample_count(),
            inner.interval_ms(),
        )?;
        Ok(SlidingWindowMetric {
            bucket_len_ms: interval_ms / sample_count,
            sample_count,
            interval_ms,
            inner,
        })
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn bucket_len_ms(&self) -> u32 {
        self.bucket_len_ms
    }

    pub fn interval_s(&self) -> f64 {
        self.interval_ms as f64 / 1000.0
    }

    /// Range of the start stamps of the inner buckets inside the window ending at `t_ms`,
    /// both ends included.
    pub(crate) fn bucket_start_range(&self, t_ms: u64) -> (u64, u64) {
        let end = self.inner.calculate_start_stamp(t_ms);
        let start = end + self.inner.bucket_len_ms() as u64 - self.interval_ms as u64;
        (start, end)
    }

    pub(crate) fn satisfied_buckets(&self, now: u64) -> Vec<Arc<BucketWrap<MetricBucket>>> {
        let (start, end) = self.bucket_start_range(now);
        self.inner
            .get_valid_values_conditional(now, &move |ts: u64| start <= ts && ts <= end)
    }

    pub fn sum_with_time(&self, now: u64, event: MetricEvent) -> u64 {
        self.satisfied_buckets(now)
            .iter()
            .map(|b| b.value().get(event))
            .sum()
    }

    pub fn qps_with_time(&self, now: u64, event: MetricEvent) -> f64 {
        self.sum_with_time(now, event) as f64 / self.interval_s()
    }

    pub fn avg_rt_with_time(&self, now: u64) -> f64 {
        let completed = self.sum_with_time(now, MetricEvent::Complete);
        if completed == 0 {
            0f64
        } else {
            self.sum_with_time(now, MetricEvent::Rt) as f64 / completed as f64
        }
    }

    pub fn max_of_single_bucket(&self, event: MetricEvent) -> u64 {
        self.satisfied_buckets(curr_time_millis())
            .iter()
            .map(|b| b.value().get(event))
            .max()
            .unwrap_or(0)
    }

    pub fn max_concurrency(&self) -> u32 {
        self.satisfied_buckets(curr_time_millis())
            .iter()
            .map(|b| b.value().max_concurrency())
            .max()
            .unwrap_or(0)
    }

    /// Aggregates the inner buckets whose start stamps satisfy `condition` into
    /// one MetricItem per second, sorted by time.
    pub fn second_metrics_on_condition(&self, condition: &TimePredicate) -> Vec<MetricItem> {
        self.second_metrics_on_condition_with_time(curr_time_millis(), condition)
    }

    pub fn second_metrics_on_condition_with_time(
        &self,
        now: u64,
        condition: &TimePredicate,
    ) -> Vec<MetricItem> {
        let mut seconds = BTreeMap::<u64, Vec<Arc<BucketWrap<MetricBucket>>>>::new();
        for b in self.inner.get_valid_values_conditional(now, condition) {
            let start_stamp = b.start_stamp();
            seconds
                .entry(start_stamp - start_stamp % 1000)
                .or_insert_with(Vec::new)
                .push(b);
        }
        seconds
            .into_iter()
            .map(|(timestamp, buckets)| self.metric_item_from_buckets(timestamp, &buckets))
            .collect()
    }

    pub(crate) fn metric_item_from_buckets(
        &self,
        timestamp: u64,
        buckets: &[Arc<BucketWrap<MetricBucket>>],
    ) -> MetricItem {
        let mut item = MetricItem {
            timestamp,
            ..MetricItem::default()
        };
        let mut all_rt = 0;
        for bucket in buckets {
            let b = bucket.value();
            item.pass_qps += b.get(MetricEvent::Pass);
            item.block_qps += b.get(MetricEvent::Block);
            item.error_qps += b.get(MetricEvent::Error);
            item.complete_qps += b.get(MetricEvent::Complete);
            item.concurrency = item.concurrency.max(b.max_concurrency());
            all_rt += b.get(MetricEvent::Rt);
        }
        if item.complete_qps > 0 {
            item.avg_rt = all_rt / item.complete_qps;
        }
        item
    }
}

impl ReadStat for SlidingWindowMetric {
    fn qps(&self, event: MetricEvent) -> f64 {
        self.qps_with_time(curr_time_millis(), event)
    }

    /// the same window, shifted back by one of its buckets
    fn qps_previous(&self, event: MetricEvent) -> f64 {
        self.qps_with_time(curr_time_millis() - self.bucket_len_ms as u64, event)
    }

    fn sum(&self, event: MetricEvent) -> u64 {
        self.sum_with_time(curr_time_millis(), event)
    }

    fn avg_rt(&self) -> f64 {
        self.avg_rt_with_time(curr_time_millis())
    }

    fn min_rt(&self) -> f64 {
        self.satisfied_buckets(curr_time_millis())
            .iter()
            .map(|b| b.value().min_rt())
            .min()
            .unwrap_or(DEFAULT_STATISTIC_MAX_RT) as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::WriteStat;
    use std::thread;

    const SAMPLE_COUNT: u32 = 20;
    const BUCKET_LEN_MS: u32 = 500;
    const INTERVAL_MS: u32 = BUCKET_LEN_MS * SAMPLE_COUNT;

    fn global_array() -> Arc<BucketLeapArray> {
        Arc::new(BucketLeapArray::new(SAMPLE_COUNT, INTERVAL_MS).unwrap())
    }

    #[test]
    fn new() {
        assert!(SlidingWindowMetric::new(4, 2000, global_array()).is_ok());
        assert!(SlidingWindowMetric::new(0, 0, global_array()).is_err());
        assert!(SlidingWindowMetric::new(4, 2001, global_array()).is_err());
        assert!(SlidingWindowMetric::new(2, 2002, global_array()).is_err());
        assert!(SlidingWindowMetric::new(4, 200000, global_array()).is_err());
    }

    #[test]
    fn start_range() {
        // (sample_count, interval_ms, inner_sample_count, inner_interval_ms, now, start, end)
        let cases = [
            (4, 2000, 20, 10000, 1578416556900u64, 1578416555000u64, 1578416556500u64),
            (2, 1000, 20, 10000, 1578416556900, 1578416556000, 1578416556500),
            (1, 2000, 10, 10000, 1578416556900, 1578416555000, 1578416556000),
            (1, 10000, 10, 20000, 1578416556900, 1578416548000, 1578416556000),
            (2, 1000, 20, 10000, 1578416556500, 1578416556000, 1578416556500),
        ];
        for (sc, interval, inner_sc, inner_interval, now, want_start, want_end) in cases {
            let swm = SlidingWindowMetric::new(
                sc,
                interval,
                Arc::new(BucketLeapArray::new(inner_sc, inner_interval).unwrap()),
            )
            .unwrap();
            assert_eq!(swm.bucket_start_range(now), (want_start, want_end));
        }
    }

    #[test]
    fn sum_with_time() {
        let arr = global_array();
        let now = 1678416556599u64;
        let mut handles = Vec::new();
        for _ in 0..500 {
            handles.push(thread::spawn({
                let arr = arr.clone();
                move || arr.add_count_with_time(now, MetricEvent::Pass, 1).unwrap()
            }))
        }
        for i in 0..2000u64 {
            handles.push(thread::spawn({
                let arr = arr.clone();
                move || {
                    arr.add_count_with_time(now - 100 - i, MetricEvent::Pass, 1)
                        .unwrap()
                }
            }))
        }
        for h in handles {
            h.join().unwrap();
        }
        // window [now - 2000 + 500 bucket, now]: 500 current + 1500 from the past
        let swm = SlidingWindowMetric::new(2, 2000, arr).unwrap();
        assert_eq!(swm.sum_with_time(now, MetricEvent::Pass), 2000);
    }

    #[test]
    fn current_bucket_counts() {
        let arr = global_array();
        let swm = SlidingWindowMetric::new(2, 1000, arr.clone()).unwrap();
        let now = 1678416556000u64;
        arr.add_count_with_time(now + 10, MetricEvent::Pass, 4).unwrap();
        // read within the same, unfinished bucket
        assert!((swm.qps_with_time(now + 20, MetricEvent::Pass) - 4.0).abs() < f64::EPSILON);
        // the bucket leaves a 1s window after one second
        assert!((swm.qps_with_time(now + 1010, MetricEvent::Pass)).abs() < f64::EPSILON);
    }

    #[test]
    fn stable_reads() {
        let arr = global_array();
        let swm = SlidingWindowMetric::new(4, 2000, arr.clone()).unwrap();
        let now = 1678416556000u64;
        arr.add_count_with_time(now, MetricEvent::Complete, 4).unwrap();
        arr.add_count_with_time(now, MetricEvent::Rt, 100).unwrap();
        let first = (swm.sum_with_time(now + 1, MetricEvent::Complete), swm.avg_rt_with_time(now + 1));
        let second = (swm.sum_with_time(now + 1, MetricEvent::Complete), swm.avg_rt_with_time(now + 1));
        assert_eq!(first, second);
        assert_eq!(first.0, 4);
        assert!((first.1 - 25.0).abs() < f64::EPSILON);
        assert!(swm.avg_rt_with_time(now + 100_000).abs() < f64::EPSILON);
    }

    #[test]
    fn max_of_single_bucket() {
        let arr = global_array();
        let swm = SlidingWindowMetric::new(2, 2000, arr.clone()).unwrap();
        arr.add_count(MetricEvent::Pass, 100);
        assert_eq!(swm.max_of_single_bucket(MetricEvent::Pass), 100);
    }

    #[test]
    fn min_rt() {
        let swm = SlidingWindowMetric::new(2, 2000, global_array()).unwrap();
        assert!((swm.min_rt() - DEFAULT_STATISTIC_MAX_RT as f64).abs() < f64::EPSILON);
    }

    #[test]
    fn max_concurrency() {
        let arr = global_array();
        let swm = SlidingWindowMetric::new(4, 2000, arr.clone()).unwrap();
        arr.update_concurrency(1);
        arr.update_concurrency(3);
        arr.update_concurrency(2);
        assert_eq!(swm.max_concurrency(), 3);
    }

    #[test]
    fn second_metrics() {
        let arr = global_array();
        let swm = SlidingWindowMetric::new(4, 2000, arr.clone()).unwrap();
        let now = 1678416556000u64;
        arr.add_count_with_time(now, MetricEvent::Pass, 100).unwrap();
        arr.add_count_with_time(now + 600, MetricEvent::Pass, 20).unwrap();
        arr.add_count_with_time(now + 600, MetricEvent::Complete, 2).unwrap();
        arr.add_count_with_time(now + 600, MetricEvent::Rt, 30).unwrap();
        arr.add_count_with_time(now - 1000, MetricEvent::Pass, 100).unwrap();
        let items = swm.second_metrics_on_condition_with_time(now + 700, &|_| true);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].timestamp(), now - 1000);
        assert_eq!(items[1].timestamp(), now);
        assert_eq!(items[1].pass_qps(), 120);
        assert_eq!(items[1].avg_rt(), 15);
    }
}
