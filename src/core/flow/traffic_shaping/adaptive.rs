//! `AdaptiveCalculator` adjusts the grant rate of a resource to its observed health.
//!
//! Once per second, the pass ratio and the average response time of the previous second
//! are compared with the targets of the rule, and the rate moves within
//! `[adaptive_min_threshold, threshold]`:
//! - Gradient: `rate * (0.8 + 0.2 * g)`, where `g` is the product of the ratio and response time gradients.
//! - Pid: `rate * (1 + u)`, where `u` is the PID output over the combined error.
//!
//! Capacity left unused in a second is stored as tokens (up to half the rate)
//! and granted on top of the rate as burst headroom.

use super::{Calculator, Rule};
use crate::base::{MetricEvent, ReadStat, StatNode};
use crate::flow::AdaptiveAlgorithm;
use crate::utils::{self, atomic_f64};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

const GRADIENT_MIN: f64 = 0.5;
const GRADIENT_MAX: f64 = 2.0;
const GRADIENT_SMOOTHING: f64 = 0.2;
const PID_KP: f64 = 0.4;
const PID_KI: f64 = 0.1;
const PID_KD: f64 = 0.05;
const PID_INTEGRAL_LIMIT: f64 = 10.0;
const MAX_TOKEN_RATIO: f64 = 0.5;

#[derive(Debug)]
pub struct AdaptiveCalculator {
    algorithm: AdaptiveAlgorithm,
    threshold: f64,
    min_threshold: f64,
    target_ratio: f64,
    expected_rt: f64,
    rate: AtomicU64,
    stored_tokens: AtomicU64,
    last_adjust_time: AtomicU64,
    integral: AtomicU64,
    last_error: AtomicU64,
}

impl AdaptiveCalculator {
    pub fn new(rule: &Arc<Rule>) -> Self {
        AdaptiveCalculator {
            algorithm: rule.adaptive_algorithm,
            threshold: rule.threshold,
            min_threshold: rule.adaptive_min_threshold.min(rule.threshold),
            target_ratio: rule.adaptive_target_ratio,
            expected_rt: rule.adaptive_expected_rt_ms as f64,
            rate: atomic_f64::new(rule.threshold),
            stored_tokens: atomic_f64::new(0.0),
            last_adjust_time: AtomicU64::new(0),
            integral: atomic_f64::new(0.0),
            last_error: atomic_f64::new(0.0),
        }
    }

    pub fn rate(&self) -> f64 {
        atomic_f64::load(&self.rate)
    }

    pub fn stored_tokens(&self) -> f64 {
        atomic_f64::load(&self.stored_tokens)
    }

    fn rt_ratio(&self, avg_rt: f64) -> Option<f64> {
        if self.expected_rt <= 0.0 || avg_rt <= 0.0 {
            None
        } else {
            Some(self.expected_rt / avg_rt)
        }
    }

    fn gradient(&self, pass_ratio: f64, avg_rt: f64) -> f64 {
        let ratio_gradient = if pass_ratio <= 0.0 {
            GRADIENT_MAX
        } else {
            (self.target_ratio / pass_ratio).max(GRADIENT_MIN).min(GRADIENT_MAX)
        };
        let rt_gradient = self
            .rt_ratio(avg_rt)
            .map_or(1.0, |r| r.max(GRADIENT_MIN).min(GRADIENT_MAX));
        (ratio_gradient * rt_gradient)
            .max(GRADIENT_MIN)
            .min(GRADIENT_MAX)
    }

    fn pid_output(&self, pass_ratio: f64, avg_rt: f64) -> f64 {
        let rt_error = self.rt_ratio(avg_rt).map_or(0.0, |_| {
            (self.expected_rt - avg_rt) / self.expected_rt
        });
        let error = (self.target_ratio - pass_ratio) + rt_error;
        let integral = (atomic_f64::load(&self.integral) + error)
            .max(-PID_INTEGRAL_LIMIT)
            .min(PID_INTEGRAL_LIMIT);
        let derivative = error - atomic_f64::load(&self.last_error);
        atomic_f64::store(&self.integral, integral);
        atomic_f64::store(&self.last_error, error);
        PID_KP * error + PID_KI * integral + PID_KD * derivative
    }

    /// Recomputes the rate from the statistics of the previous second,
    /// at most once per second. Returns whether this call did the update.
    pub fn adjust_with_time(&self, curr_time: u64, pass: f64, block: f64, avg_rt: f64) -> bool {
        let curr_second = curr_time - curr_time % 1000;
        let last = self.last_adjust_time.load(Ordering::SeqCst);
        if curr_second <= last
            || self
                .last_adjust_time
                .compare_exchange(last, curr_second, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
        {
            return false;
        }
        let rate = self.rate();
        let total = pass + block;
        let new_rate = if total <= 0.0 {
            // idle, nothing to learn from
            rate
        } else {
            let pass_ratio = pass / total;
            match self.algorithm {
                AdaptiveAlgorithm::Gradient => {
                    let g = self.gradient(pass_ratio, avg_rt);
                    rate * (1.0 - GRADIENT_SMOOTHING + GRADIENT_SMOOTHING * g)
                }
                AdaptiveAlgorithm::Pid => rate * (1.0 + self.pid_output(pass_ratio, avg_rt)),
            }
        }
        .max(self.min_threshold)
        .min(self.threshold);

        let tokens = (self.stored_tokens() + rate - pass)
            .max(0.0)
            .min(new_rate * MAX_TOKEN_RATIO);
        atomic_f64::store(&self.stored_tokens, tokens);
        atomic_f64::store(&self.rate, new_rate);
        true
    }

    pub fn allowed_threshold(&self) -> f64 {
        self.rate() + self.stored_tokens()
    }
}

impl Calculator for AdaptiveCalculator {
    fn calculate_allowed_threshold(
        &self,
        _metric: &dyn ReadStat,
        node: &dyn StatNode,
        _batch_count: u32,
        _flag: i32,
    ) -> f64 {
        self.adjust_with_time(
            utils::curr_time_millis(),
            node.qps_previous(MetricEvent::Pass),
            node.qps_previous(MetricEvent::Block),
            node.avg_rt(),
        );
        self.allowed_threshold()
    }
}
