//! Stat
//!
use super::MetricItemRetriever;
use crate::{utils::AsAny, Error, Result};
use enum_map::Enum;
use lazy_static::lazy_static;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type TimePredicate = dyn Fn(u64) -> bool;

/// Events recorded in every bucket, pass + block == total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum MetricEvent {
    /// passed all the rule checks
    Pass,
    /// rejected by some rule check
    Block,
    Complete,
    /// business error reported by the caller, used for circuit breaking
    Error,
    /// accumulated round trip time of completed calls, in milliseconds
    Rt,
}

lazy_static! {
    static ref NOP_READ_STAT: Arc<NopReadStat> = Arc::new(NopReadStat {});
    static ref NOP_WRITE_STAT: Arc<NopWriteStat> = Arc::new(NopWriteStat {});
}

#[inline]
pub fn nop_read_stat() -> Arc<NopReadStat> {
    NOP_READ_STAT.clone()
}

#[inline]
pub fn nop_write_stat() -> Arc<NopWriteStat> {
    NOP_WRITE_STAT.clone()
}

pub const ILLEGAL_GLOBAL_STATISTIC_PARAMS_ERROR: &str =
    "Invalid parameters, sample_count or interval_ms, for resource's global statistic";
pub const ILLEGAL_STATISTIC_PARAMS_ERROR: &str =
    "Invalid parameters, sample_count or interval_ms, for metric statistic";
pub const GLOBAL_STATISTIC_NON_REUSABLE_ERROR: &str =
    "The parameters, sample_count and interval_ms, cannot reuse the resource's global statistic";

pub trait ReadStat: Send + Sync + fmt::Debug {
    fn qps(&self, _event: MetricEvent) -> f64 {
        0f64
    }
    fn qps_previous(&self, _event: MetricEvent) -> f64 {
        0f64
    }
    fn sum(&self, _event: MetricEvent) -> u64 {
        0u64
    }
    fn min_rt(&self) -> f64 {
        0f64
    }
    fn avg_rt(&self) -> f64 {
        0f64
    }
}

pub trait WriteStat: Send + Sync + fmt::Debug {
    fn add_count(&self, _event: MetricEvent, _count: u64) {}
    fn update_concurrency(&self, _concurrency: u32) {}
}

pub trait ConcurrencyStat: Send + Sync + fmt::Debug {
    fn current_concurrency(&self) -> u32;
    fn increase_concurrency(&self);
    fn decrease_concurrency(&self);
}

#[derive(Debug)]
pub struct NopReadStat {}
impl ReadStat for NopReadStat {}

#[derive(Debug)]
pub struct NopWriteStat {}
impl WriteStat for NopWriteStat {}

/// StatNode holds the real-time statistics of a resource,
/// a call tree position, an origin or a context entrance.
pub trait StatNode:
    ReadStat + WriteStat + ConcurrencyStat + MetricItemRetriever + Any + AsAny
{
    /// Builds a readonly view with another window over the node's own buckets.
    /// Fails if `sample_count` and `interval_ms` cannot be derived from them.
    fn generate_read_stat(&self, sample_count: u32, interval_ms: u32) -> Result<Arc<dyn ReadStat>>;
}

/// Convenience writers with signed counts, where `n <= 0` records nothing.
pub trait StatNodeExt {
    fn add_pass(&self, n: i64);
    fn add_block(&self, n: i64);
    fn add_success(&self, n: i64, rt: u64);
    fn add_error(&self, n: i64);
}

impl<T: WriteStat + ?Sized> StatNodeExt for T {
    fn add_pass(&self, n: i64) {
        if n > 0 {
            self.add_count(MetricEvent::Pass, n as u64);
        }
    }

    fn add_block(&self, n: i64) {
        if n > 0 {
            self.add_count(MetricEvent::Block, n as u64);
        }
    }

    fn add_success(&self, n: i64, rt: u64) {
        if n > 0 {
            self.add_count(MetricEvent::Rt, rt);
            self.add_count(MetricEvent::Complete, n as u64);
        }
    }

    fn add_error(&self, n: i64) {
        if n > 0 {
            self.add_count(MetricEvent::Error, n as u64);
        }
    }
}

pub fn check_validity_for_statistic(
    sample_count: u32,
    interval_ms: u32,
    error_msg: &'static str,
) -> Result<()> {
    if interval_ms == 0 || sample_count == 0 || interval_ms % sample_count != 0 {
        return Err(Error::msg(error_msg));
    }
    Ok(())
}

/// Checks whether a readonly window of (`sample_count`, `interval_ms`) can be
/// computed from the buckets of a global statistic of
/// (`parent_sample_count`, `parent_interval_ms`).
pub fn check_validity_for_reuse_statistic(
    sample_count: u32,
    interval_ms: u32,
    parent_sample_count: u32,
    parent_interval_ms: u32,
) -> Result<()> {
    check_validity_for_statistic(sample_count, interval_ms, ILLEGAL_STATISTIC_PARAMS_ERROR)?;
    check_validity_for_statistic(
        parent_sample_count,
        parent_interval_ms,
        ILLEGAL_GLOBAL_STATISTIC_PARAMS_ERROR,
    )?;
    let bucket_len_ms = interval_ms / sample_count;
    let parent_bucket_len_ms = parent_interval_ms / parent_sample_count;
    // the view must fit into the parent window and be made of whole parent buckets
    if parent_interval_ms % interval_ms != 0 || bucket_len_ms % parent_bucket_len_ms != 0 {
        return Err(Error::msg(GLOBAL_STATISTIC_NON_REUSABLE_ERROR));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) use test::*;
