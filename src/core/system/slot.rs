use super::*;
use crate::{
    base::{
        BaseSlot, BlockType, ConcurrencyStat, EntryContext, MetricEvent, ReadStat, RuleCheckSlot,
        Snapshot, TokenResult, TrafficType,
    },
    stat, system_metric,
};
use lazy_static::lazy_static;
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 1000;

/// AdaptiveSlot sheds inbound traffic when the process or the host is overloaded.
pub struct AdaptiveSlot {}

lazy_static! {
    pub static ref DEFAULT_ADAPTIVE_SLOT: Arc<AdaptiveSlot> = Arc::new(AdaptiveSlot {});
}

pub fn default_slot() -> Arc<AdaptiveSlot> {
    DEFAULT_ADAPTIVE_SLOT.clone()
}

impl BaseSlot for AdaptiveSlot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl RuleCheckSlot for AdaptiveSlot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        if *ctx.resource().traffic_type() == TrafficType::Outbound {
            return ctx.result().clone();
        }
        for rule in get_rules() {
            if let Err((msg, snapshot)) = can_pass_check(&rule) {
                ctx.set_result(TokenResult::new_blocked_with_cause(
                    BlockType::SystemFlow,
                    msg.into(),
                    rule.clone(),
                    snapshot,
                ));
                break;
            }
        }
        ctx.result().clone()
    }
}

/// Inbound metrics a system rule is checked against.
#[derive(Debug, Clone, Copy, Default)]
struct SystemStatus {
    qps: f64,
    concurrency: f64,
    avg_rt: f64,
    load: f64,
    cpu_usage: f64,
    min_rt: f64,
    max_complete_qps: f64,
}

impl SystemStatus {
    fn current() -> Self {
        let inbound = stat::inbound_node();
        SystemStatus {
            qps: inbound.qps(MetricEvent::Pass),
            concurrency: inbound.current_concurrency() as f64,
            avg_rt: inbound.avg_rt(),
            load: system_metric::current_load(),
            cpu_usage: system_metric::current_cpu_usage(),
            min_rt: inbound.min_rt(),
            max_complete_qps: inbound.max_avg(MetricEvent::Complete),
        }
    }

    /// The inbound concurrency stays within the estimated capacity,
    /// which is the best throughput times the lowest response time.
    fn bbr_allows(&self) -> bool {
        !(self.concurrency > 1.0 && self.concurrency > self.max_complete_qps * self.min_rt / 1000.0)
    }
}

type CheckResult = std::result::Result<(), (&'static str, Arc<Snapshot>)>;

fn can_pass_check(rule: &Rule) -> CheckResult {
    judge(rule, &SystemStatus::current())
}

fn blocked(msg: &'static str, value: f64) -> CheckResult {
    Err((msg, Arc::new(value) as Arc<Snapshot>))
}

fn judge(rule: &Rule, status: &SystemStatus) -> CheckResult {
    let threshold = rule.threshold;
    let bbr_allows = rule.strategy == AdaptiveStrategy::BBR && status.bbr_allows();
    match rule.metric_type {
        MetricType::InboundQPS if status.qps >= threshold => {
            blocked("system qps check blocked", status.qps)
        }
        MetricType::Concurrency if status.concurrency >= threshold => {
            blocked("system concurrency check blocked", status.concurrency)
        }
        MetricType::AvgRT if status.avg_rt >= threshold => {
            blocked("system avg rt check blocked", status.avg_rt)
        }
        MetricType::Load if status.load > threshold && !bbr_allows => {
            blocked("system load check blocked", status.load)
        }
        MetricType::CpuUsage if status.cpu_usage > threshold && !bbr_allows => {
            blocked("system cpu usage check blocked", status.cpu_usage)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{ResourceType, ResourceWrapper};
    use crate::utils::AsAny;

    fn rule_of(metric_type: MetricType, threshold: f64, strategy: AdaptiveStrategy) -> Rule {
        Rule {
            metric_type,
            threshold,
            strategy,
            ..Default::default()
        }
    }

    fn snapshot_value(snapshot: Arc<Snapshot>) -> f64 {
        *(*snapshot).as_any().downcast_ref::<f64>().unwrap()
    }

    #[test]
    fn outbound_is_skipped() {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            "system_slot_outbound".into(),
            ResourceType::Common,
            TrafficType::Outbound,
        ));
        assert!(default_slot().check(&mut ctx).is_pass());
    }

    #[test]
    fn inbound_metrics() {
        let status = SystemStatus {
            qps: 10.0,
            concurrency: 3.0,
            avg_rt: 20.0,
            ..Default::default()
        };
        let none = AdaptiveStrategy::NoAdaptive;
        assert!(judge(&rule_of(MetricType::InboundQPS, 11.0, none), &status).is_ok());
        let (msg, snapshot) =
            judge(&rule_of(MetricType::InboundQPS, 10.0, none), &status).unwrap_err();
        assert_eq!(msg, "system qps check blocked");
        assert!((snapshot_value(snapshot) - 10.0).abs() < f64::EPSILON);

        assert!(judge(&rule_of(MetricType::Concurrency, 4.0, none), &status).is_ok());
        assert!(judge(&rule_of(MetricType::Concurrency, 3.0, none), &status).is_err());
        assert!(judge(&rule_of(MetricType::AvgRT, 25.0, none), &status).is_ok());
        assert!(judge(&rule_of(MetricType::AvgRT, 20.0, none), &status).is_err());
    }

    #[test]
    fn load_and_cpu() {
        let status = SystemStatus {
            load: 4.5,
            cpu_usage: 80.0,
            ..Default::default()
        };
        let none = AdaptiveStrategy::NoAdaptive;
        assert!(judge(&rule_of(MetricType::Load, 5.0, none), &status).is_ok());
        let (_, snapshot) = judge(&rule_of(MetricType::Load, 4.0, none), &status).unwrap_err();
        assert!((snapshot_value(snapshot) - 4.5).abs() < f64::EPSILON);
        assert!(judge(&rule_of(MetricType::CpuUsage, 90.0, none), &status).is_ok());
        assert!(judge(&rule_of(MetricType::CpuUsage, 50.0, none), &status).is_err());
    }

    #[test]
    fn bbr() {
        // capacity: 100 qps * 20ms = 2 concurrent requests
        let mut status = SystemStatus {
            load: 8.0,
            concurrency: 2.0,
            min_rt: 20.0,
            max_complete_qps: 100.0,
            ..Default::default()
        };
        let rule = rule_of(MetricType::Load, 4.0, AdaptiveStrategy::BBR);
        assert!(judge(&rule, &status).is_ok());
        status.concurrency = 3.0;
        assert!(judge(&rule, &status).is_err());
    }

    #[test]
    fn collected_host_metrics() {
        system_metric::set_system_load(0.0);
        system_metric::set_cpu_usage(0.0);
        let status = SystemStatus::current();
        assert!(judge(
            &rule_of(MetricType::Load, 1.0, AdaptiveStrategy::NoAdaptive),
            &status
        )
        .is_ok());
    }
}
