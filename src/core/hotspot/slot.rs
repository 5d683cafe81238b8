use super::*;
use crate::{
    base::{BaseSlot, EntryContext, RuleCheckSlot, StatSlot, TokenResult},
    logging, utils,
};
use lazy_static::lazy_static;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

const RULE_CHECK_SLOT_ORDER: u32 = 4000;
const STAT_SLOT_ORDER: u32 = 4000;

/// Checks the param rules of the resource against the arguments of the entry.
pub struct Slot {}

/// Counts the in-flight requests per argument value for concurrency param rules.
pub struct ConcurrencyStatSlot {}

lazy_static! {
    pub static ref DEFAULT_SLOT: Arc<Slot> = Arc::new(Slot {});
    pub static ref DEFAULT_CONCURRENCY_STAT_SLOT: Arc<ConcurrencyStatSlot> =
        Arc::new(ConcurrencyStatSlot {});
}

pub fn default_slot() -> Arc<Slot> {
    DEFAULT_SLOT.clone()
}

pub fn default_concurrency_stat_slot() -> Arc<ConcurrencyStatSlot> {
    DEFAULT_CONCURRENCY_STAT_SLOT.clone()
}

impl BaseSlot for Slot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl RuleCheckSlot for Slot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        let batch_count = ctx.input().batch_count();
        for tc in get_traffic_controller_list_for(ctx.resource().name()) {
            let arg = match tc.extract_arg(ctx.input()) {
                Some(arg) => arg,
                None => continue,
            };
            match tc.perform_checking(&arg, batch_count) {
                TokenResult::Pass => {}
                TokenResult::Wait(nanos_to_wait) => utils::sleep_for_ns(nanos_to_wait),
                r @ TokenResult::Blocked(_) => {
                    ctx.set_result(r);
                    break;
                }
            }
        }
        ctx.result().clone()
    }
}

impl BaseSlot for ConcurrencyStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl ConcurrencyStatSlot {
    fn for_each_counter<F: Fn(&AtomicU64)>(&self, ctx: &EntryContext, f: F) {
        for tc in get_traffic_controller_list_for(ctx.resource().name()) {
            if tc.rule().metric_type != MetricType::Concurrency {
                continue;
            }
            let arg = match tc.extract_arg(ctx.input()) {
                Some(arg) => arg,
                None => continue,
            };
            match tc.metric().concurrency_counter.get(&arg) {
                Some(counter) => f(counter.as_ref()),
                None => logging::debug!(
                    "[HotSpotConcurrencyStatSlot] No concurrency counter of argument {}",
                    arg
                ),
            }
        }
    }
}

impl StatSlot for ConcurrencyStatSlot {
    fn on_entry_pass(&self, ctx: &EntryContext) {
        self.for_each_counter(ctx, |counter| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn on_completed(&self, ctx: &mut EntryContext) {
        // the counter may have been replaced by a reload since the entry passed
        self.for_each_counter(ctx, |counter| {
            let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                c.checked_sub(1)
            });
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{BlockType, EntryInput, ResourceType, ResourceWrapper, TrafficType};

    fn entry_ctx(res: &str, uid: &str) -> EntryContext {
        let mut ctx = EntryContext::new();
        let mut input = EntryInput::new(1, 0);
        input.set_args(vec![uid.into()]);
        ctx.set_input(input);
        ctx.set_resource(ResourceWrapper::new(
            res.into(),
            ResourceType::Common,
            TrafficType::Inbound,
        ));
        ctx
    }

    #[test]
    fn concurrency_per_value() {
        let res = "hotspot_slot_concurrency";
        load_rules_of_resource(
            res,
            vec![Arc::new(Rule {
                resource: res.into(),
                metric_type: MetricType::Concurrency,
                threshold: 1,
                ..Default::default()
            })],
        )
        .unwrap();
        let slot = default_slot();
        let stat_slot = default_concurrency_stat_slot();

        let mut first = entry_ctx(res, "u1");
        assert!(slot.check(&mut first).is_pass());
        stat_slot.on_entry_pass(&first);

        let mut second = entry_ctx(res, "u1");
        let r = slot.check(&mut second);
        assert_eq!(
            r.block_err().unwrap().block_type(),
            BlockType::HotSpotParamFlow
        );
        assert!(slot.check(&mut entry_ctx(res, "u2")).is_pass());

        stat_slot.on_completed(&mut first);
        assert!(slot.check(&mut entry_ctx(res, "u1")).is_pass());
        // never below zero
        stat_slot.on_completed(&mut first);
        let counter = get_traffic_controller_list_for(res)[0]
            .metric()
            .concurrency_counter
            .get(&"u1".to_string())
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        clear_rules_of_resource(res);
    }

    #[test]
    fn without_argument() {
        let res = "hotspot_slot_no_arg";
        load_rules_of_resource(
            res,
            vec![Arc::new(Rule {
                resource: res.into(),
                metric_type: MetricType::Qps,
                threshold: 1,
                duration_in_sec: 1,
                param_index: 3,
                ..Default::default()
            })],
        )
        .unwrap();
        for _ in 0..5 {
            assert!(default_slot().check(&mut entry_ctx(res, "u1")).is_pass());
        }
        clear_rules_of_resource(res);
    }
}
