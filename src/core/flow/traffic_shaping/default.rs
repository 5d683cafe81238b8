use super::{Calculator, Checker, Rule};
use crate::base::{BlockType, MetricEvent, ReadStat, StatNode, TokenResult};
use crate::flow::MetricType;
use std::sync::Arc;

/// Provide a determined threshold
#[derive(Debug)]
pub struct DirectCalculator {
    threshold: f64,
}

impl DirectCalculator {
    pub fn new(rule: &Arc<Rule>) -> Self {
        DirectCalculator {
            threshold: rule.threshold,
        }
    }
}

impl Calculator for DirectCalculator {
    fn calculate_allowed_threshold(
        &self,
        _metric: &dyn ReadStat,
        _node: &dyn StatNode,
        _batch_count: u32,
        _flag: i32,
    ) -> f64 {
        self.threshold
    }
}

/// Rejects what exceeds the threshold right away
#[derive(Debug)]
pub struct RejectChecker {
    metric_type: MetricType,
}

impl RejectChecker {
    pub fn new(rule: &Arc<Rule>) -> Self {
        RejectChecker {
            metric_type: rule.metric_type,
        }
    }
}

impl Checker for RejectChecker {
    fn do_check(
        &self,
        rule: &Arc<Rule>,
        metric: &dyn ReadStat,
        node: &dyn StatNode,
        batch_count: u32,
        threshold: f64,
    ) -> TokenResult {
        let cur_count = match self.metric_type {
            MetricType::Qps => metric.sum(MetricEvent::Pass) as f64,
            MetricType::Concurrency => node.current_concurrency() as f64,
        };
        if cur_count + batch_count as f64 > threshold {
            TokenResult::new_blocked_with_cause(
                BlockType::Flow,
                "flow reject check blocked".into(),
                rule.clone(),
                Arc::new(cur_count),
            )
        } else {
            TokenResult::new_pass()
        }
    }
}
