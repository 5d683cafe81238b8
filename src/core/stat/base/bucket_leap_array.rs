use super::{LeapArray, MetricBucket};
use crate::base::{MetricEvent, WriteStat, DEFAULT_STATISTIC_MAX_RT};
use crate::utils::curr_time_millis;
use crate::{logging, Result};

/// The bucket storage of every statistic node.
pub type BucketLeapArray = LeapArray<MetricBucket>;

impl WriteStat for BucketLeapArray {
    fn add_count(&self, event: MetricEvent, count: u64) {
        if let Err(err) = self.add_count_with_time(curr_time_millis(), event, count) {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!("[BucketLeapArray::add_count] failed to record, err: {:?}", err);
            });
        }
    }

    fn update_concurrency(&self, concurrency: u32) {
        if let Err(err) = self.update_concurrency_with_time(curr_time_millis(), concurrency) {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!(
                    "[BucketLeapArray::update_concurrency] failed to record, err: {:?}",
                    err
                );
            });
        }
    }
}

impl BucketLeapArray {
    pub fn add_count_with_time(&self, now: u64, event: MetricEvent, count: u64) -> Result<()> {
        self.get_bucket_of_time(now)?.value().add(event, count);
        Ok(())
    }

    pub fn update_concurrency_with_time(&self, now: u64, concurrency: u32) -> Result<()> {
        self.get_bucket_of_time(now)?
            .value()
            .update_concurrency(concurrency);
        Ok(())
    }

    pub fn count(&self, event: MetricEvent) -> u64 {
        self.count_with_time(curr_time_millis(), event)
    }

    /// Sum of `event` over the whole window ending at `now`.
    pub fn count_with_time(&self, now: u64, event: MetricEvent) -> u64 {
        self.get_valid_values(now)
            .iter()
            .map(|b| b.value().get(event))
            .sum()
    }

    pub fn min_rt(&self) -> u64 {
        self.get_current_values()
            .iter()
            .map(|b| b.value().min_rt())
            .min()
            .unwrap_or(DEFAULT_STATISTIC_MAX_RT)
    }

    pub fn max_concurrency(&self) -> u32 {
        self.get_current_values()
            .iter()
            .map(|b| b.value().max_concurrency())
            .max()
            .unwrap_or(0)
    }
}
