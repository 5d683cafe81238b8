use super::{BlockError, EntryContext, TokenResult, SLOT_INIT};
use crate::utils::{curr_time_millis, AsAny};
use std::any::Any;
use std::sync::Arc;

/// Each bucket of a SlotChain (prepare, rule check, stat)
/// keeps its slots sorted by ascending `order()`,
/// slots with the same order keep their insertion order.
pub trait BaseSlot: Any + AsAny + Sync + Send {
    fn order(&self) -> u32 {
        0
    }
}

/// StatPrepareSlot prepares what the following slots rely on,
/// e.g., binds the statistic nodes of the invocation into the EntryContext.
/// It must not panic.
pub trait StatPrepareSlot: BaseSlot {
    fn prepare(&self, _ctx: &mut EntryContext) {}
}

/// RuleCheckSlot makes the admission decision of one kind of rule.
/// A blocking result stops the remaining checks.
pub trait RuleCheckSlot: BaseSlot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        ctx.result().clone()
    }
}

/// StatSlot records the outcome of the checks.
pub trait StatSlot: BaseSlot {
    /// invoked when all the checks passed
    fn on_entry_pass(&self, _ctx: &EntryContext) {}
    /// invoked when some check blocked the entry
    fn on_entry_blocked(&self, _ctx: &EntryContext, _block_error: BlockError) {}
    /// invoked on exit of a passed entry, blocked entries never complete
    fn on_completed(&self, _ctx: &mut EntryContext) {}
}

/// SlotChain holds the built-in slots and the customized ones.
pub struct SlotChain {
    pub(self) stat_pres: Vec<Arc<dyn StatPrepareSlot>>,
    pub(self) rule_checks: Vec<Arc<dyn RuleCheckSlot>>,
    pub(self) stats: Vec<Arc<dyn StatSlot>>,
}

impl Default for SlotChain {
    fn default() -> Self {
        Self {
            stat_pres: Vec::with_capacity(SLOT_INIT),
            rule_checks: Vec::with_capacity(SLOT_INIT),
            stats: Vec::with_capacity(SLOT_INIT),
        }
    }
}

impl SlotChain {
    pub fn new() -> Self {
        Default::default()
    }

    /// Not thread safe, build the chain before sharing it.
    pub fn add_stat_prepare_slot(&mut self, s: Arc<dyn StatPrepareSlot>) {
        self.stat_pres.push(s);
        self.stat_pres.sort_by_key(|a| a.order());
    }

    /// Not thread safe, build the chain before sharing it.
    pub fn add_rule_check_slot(&mut self, s: Arc<dyn RuleCheckSlot>) {
        self.rule_checks.push(s);
        self.rule_checks.sort_by_key(|a| a.order());
    }

    /// Not thread safe, build the chain before sharing it.
    pub fn add_stat_slot(&mut self, s: Arc<dyn StatSlot>) {
        self.stats.push(s);
        self.stats.sort_by_key(|a| a.order());
    }

    pub fn stat_prepare_slots(&self) -> &[Arc<dyn StatPrepareSlot>] {
        &self.stat_pres
    }

    pub fn rule_check_slots(&self) -> &[Arc<dyn RuleCheckSlot>] {
        &self.rule_checks
    }

    pub fn stat_slots(&self) -> &[Arc<dyn StatSlot>] {
        &self.stats
    }

    /// Walks the chain for a new invocation and returns the decision,
    /// which is also kept in the EntryContext.
    pub fn entry(&self, ctx: &mut EntryContext) -> TokenResult {
        for s in &self.stat_pres {
            s.prepare(ctx);
        }

        ctx.reset_result_to_pass();
        for s in &self.rule_checks {
            let mut res = s.check(ctx);
            if let TokenResult::Blocked(err) = &mut res {
                err.set_resource(ctx.resource().name().clone());
                ctx.set_result(res);
                break;
            }
        }

        match ctx.result().block_err() {
            None => {
                for s in &self.stats {
                    s.on_entry_pass(ctx);
                }
            }
            Some(block_err) => {
                for s in &self.stats {
                    s.on_entry_blocked(ctx, block_err.clone());
                }
            }
        }
        ctx.result().clone()
    }

    /// Unwinds the stat slots in reverse order, only for passed entries.
    /// The round trip is settled before any slot sees the completion.
    pub fn exit(&self, ctx: &mut EntryContext) {
        if ctx.is_blocked() {
            return;
        }
        ctx.set_round_trip(curr_time_millis().saturating_sub(ctx.start_time()));
        for s in self.stats.iter().rev() {
            s.on_completed(ctx);
        }
    }
}

#[cfg(test)]
pub(crate) use test::aggregation::{MockRuleCheckSlot, MockStatPrepareSlot, MockStatSlot};
