use super::*;
use crate::{
    base::{BaseSlot, BlockType, EntryContext, ReadStat, RuleCheckSlot, StatNode, TokenResult},
    logging, stat, utils,
};
use lazy_static::lazy_static;
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 2000;
const BLOCK_MSG_OVERSLEPT: &str = "flow throttling check blocked, woke up after the max queueing time";

/// A RuleSlot for flow related metrics
pub struct Slot {}

lazy_static! {
    pub static ref DEFAULT_SLOT: Arc<Slot> = Arc::new(Slot {});
}

pub fn default_slot() -> Arc<Slot> {
    DEFAULT_SLOT.clone()
}

impl BaseSlot for Slot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl RuleCheckSlot for Slot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        let tcs = get_traffic_controller_list_for(ctx.resource().name());
        for tc in tcs {
            let r = can_pass_check(&tc, ctx);
            match r {
                TokenResult::Pass => {}
                TokenResult::Blocked(_) => {
                    ctx.set_result(r);
                    return ctx.result().clone();
                }
                TokenResult::Wait(nanos_to_wait) => {
                    if let Some(r) = wait_in_queue(&tc, ctx, nanos_to_wait) {
                        ctx.set_result(r);
                        return ctx.result().clone();
                    }
                }
            }
        }
        ctx.result().clone()
    }
}

/// Sleeps for the queueing time, and rejects the request
/// if it woke up past the max queueing time of the rule.
/// A rejected request gives its turn in the queue back.
fn wait_in_queue(tc: &Controller, ctx: &EntryContext, nanos_to_wait: u64) -> Option<TokenResult> {
    let deadline = utils::curr_time_nanos()
        + utils::milli2nano(tc.rule().max_queueing_time_ms as u64);
    utils::sleep_for_ns(nanos_to_wait);
    let now = utils::curr_time_nanos();
    if now <= deadline {
        return None;
    }
    let (batch_count, flag) = (ctx.input().batch_count(), ctx.input().flag());
    with_stat_of(tc, ctx, |metric, node| {
        tc.cancel_queued(metric, node, batch_count, flag);
        TokenResult::new_pass()
    });
    Some(TokenResult::new_blocked_with_cause(
        BlockType::Flow,
        BLOCK_MSG_OVERSLEPT.into(),
        tc.rule().clone(),
        Arc::new(now - deadline),
    ))
}

fn can_pass_check(tc: &Controller, ctx: &EntryContext) -> TokenResult {
    let (batch_count, flag) = (ctx.input().batch_count(), ctx.input().flag());
    with_stat_of(tc, ctx, |metric, node| {
        tc.perform_checking(metric, node, batch_count, flag)
    })
}

/// Runs `f` over the statistics the rule of `tc` is checked against,
/// the request passes if there are none.
fn with_stat_of<F>(tc: &Controller, ctx: &EntryContext, f: F) -> TokenResult
where
    F: FnOnce(&dyn ReadStat, &dyn StatNode) -> TokenResult,
{
    let rule = tc.rule();
    match rule.relation_strategy {
        RelationStrategy::Current => match ctx.stat_node() {
            Some(node) => f(&**tc.stat().read_only_metric(), &*node),
            None => pass_without_node(rule),
        },
        RelationStrategy::Associated => match stat::get_resource_node(&rule.ref_resource) {
            Some(node) => {
                let stat_node: &dyn StatNode = &*node;
                f(&**tc.stat().read_only_metric(), stat_node)
            }
            // nothing recorded on the associated resource yet
            None => TokenResult::new_pass(),
        },
        RelationStrategy::Chain => {
            if ctx.context_name() != rule.ref_resource {
                return TokenResult::new_pass();
            }
            match ctx.default_node() {
                Some(node) => {
                    let metric: &dyn ReadStat = &*node;
                    let stat_node: &dyn StatNode = &*node;
                    f(metric, stat_node)
                }
                None => TokenResult::new_pass(),
            }
        }
    }
}

fn pass_without_node(rule: &Arc<Rule>) -> TokenResult {
    logging::FREQUENT_ERROR_ONCE.call_once(|| {
        logging::error!(
            "[FlowSlot] no statistic node for flow rule in can_pass_check(), rule: {:?}",
            rule
        );
    });
    TokenResult::new_pass()
}
