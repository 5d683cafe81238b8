use super::*;
use crate::base::{BaseSlot, BlockType, EntryContext, RuleCheckSlot, TokenResult};
use lazy_static::lazy_static;
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 500;
const BLOCK_MSG: &str = "authority check blocked";

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
        let origin = ctx.origin().to_owned();
        if origin.is_empty() {
            return ctx.result().clone();
        }
        for rule in get_rules_of_resource(ctx.resource().name()) {
            if !rule.admits(&origin) {
                ctx.set_result(TokenResult::new_blocked_with_cause(
                    BlockType::Authority,
                    BLOCK_MSG.into(),
                    rule.clone(),
                    Arc::new(origin),
                ));
                break;
            }
        }
        ctx.result().clone()
    }
}
