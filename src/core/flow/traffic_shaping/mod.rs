//! Traffic Shaping Policy

/// Adaptive calculator
pub mod adaptive;
/// Default calculator and checker
pub mod default;
/// Throttling checker
pub mod throttling;
/// Warm Up calculator
pub mod warmup;

pub use adaptive::*;
pub use default::*;
pub use throttling::*;
pub use warmup::*;

use super::Rule;
use crate::base::{ReadStat, StatNode, TokenResult, WriteStat};
use std::sync::Arc;

/// Traffic Shaping `Calculator` calculates the actual traffic shaping threshold
/// based on the threshold of rule and the traffic shaping strategy.
///
/// `metric` is the windowed statistic the rule is checked against,
/// `node` the node of the checked resource (or of its associated resource, or its call tree position).
pub trait Calculator: Send + Sync + std::fmt::Debug {
    fn calculate_allowed_threshold(
        &self,
        metric: &dyn ReadStat,
        node: &dyn StatNode,
        batch_count: u32,
        flag: i32,
    ) -> f64;
}

/// Traffic Shaping `Checker` performs checking according to current metrics and the traffic
/// shaping strategy, then yield the token result.
pub trait Checker: Send + Sync + std::fmt::Debug {
    fn do_check(
        &self,
        rule: &Arc<Rule>,
        metric: &dyn ReadStat,
        node: &dyn StatNode,
        batch_count: u32,
        threshold: f64,
    ) -> TokenResult;

    /// Gives back what `do_check` reserved for a queued request that is rejected after all.
    fn cancel_queued(&self, _batch_count: u32, _threshold: f64) {}
}

/// StandaloneStat is the statistic a controller reads its windowed pass count from.
#[derive(Debug)]
pub struct StandaloneStat {
    /// whether it is a view over the buckets of the resource node
    reuse_global: bool,
    read_only_metric: Arc<dyn ReadStat>,
    /// present only when the stat owns its buckets, written by the standalone stat slot
    write_only_metric: Option<Arc<dyn WriteStat>>,
}

impl StandaloneStat {
    pub fn new(
        reuse_global: bool,
        read_only_metric: Arc<dyn ReadStat>,
        write_only_metric: Option<Arc<dyn WriteStat>>,
    ) -> Self {
        StandaloneStat {
            reuse_global,
            read_only_metric,
            write_only_metric,
        }
    }

    pub fn reuse_global(&self) -> bool {
        self.reuse_global
    }

    pub fn read_only_metric(&self) -> &Arc<dyn ReadStat> {
        &self.read_only_metric
    }

    pub fn write_only_metric(&self) -> Option<&Arc<dyn WriteStat>> {
        self.write_only_metric.as_ref()
    }
}

/// Controller applies one flow rule: the calculator yields the allowed threshold
/// and the checker turns it into the decision.
#[derive(Debug)]
pub struct Controller {
    calculator: Arc<dyn Calculator>,
    checker: Arc<dyn Checker>,
    rule: Arc<Rule>,
    stat: Arc<StandaloneStat>,
}

impl Controller {
    pub fn new(
        rule: Arc<Rule>,
        stat: Arc<StandaloneStat>,
        calculator: Arc<dyn Calculator>,
        checker: Arc<dyn Checker>,
    ) -> Self {
        Controller {
            calculator,
            checker,
            rule,
            stat,
        }
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn stat(&self) -> &Arc<StandaloneStat> {
        &self.stat
    }

    pub fn calculator(&self) -> &Arc<dyn Calculator> {
        &self.calculator
    }

    pub fn checker(&self) -> &Arc<dyn Checker> {
        &self.checker
    }

    pub fn perform_checking(
        &self,
        metric: &dyn ReadStat,
        node: &dyn StatNode,
        batch_count: u32,
        flag: i32,
    ) -> TokenResult {
        let allowed_threshold =
            self.calculator
                .calculate_allowed_threshold(metric, node, batch_count, flag);
        self.checker
            .do_check(&self.rule, metric, node, batch_count, allowed_threshold)
    }

    /// Undoes the queue reservation of a request that waited but does not pass.
    pub fn cancel_queued(
        &self,
        metric: &dyn ReadStat,
        node: &dyn StatNode,
        batch_count: u32,
        flag: i32,
    ) {
        let allowed_threshold =
            self.calculator
                .calculate_allowed_threshold(metric, node, batch_count, flag);
        self.checker.cancel_queued(batch_count, allowed_threshold);
    }
}
