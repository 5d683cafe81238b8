use crate::base::{BaseSlot, BlockError, EntryContext, StatSlot};
use crate::logging;
use lazy_static::lazy_static;
use std::sync::Arc;

const STAT_SLOT_ORDER: u32 = 2000;

lazy_static! {
    pub static ref DEFAULT_STAT_SLOT: Arc<Slot> = Arc::new(Slot {});
}

pub fn default_stat_slot() -> Arc<Slot> {
    DEFAULT_STAT_SLOT.clone()
}

/// Slot logs the blocked invocations.
pub struct Slot {}

impl BaseSlot for Slot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl StatSlot for Slot {
    fn on_entry_blocked(&self, ctx: &EntryContext, block_error: BlockError) {
        logging::debug!(
            "[BlockLog] resource: {}, context: {}, origin: {}, {}",
            ctx.resource().name(),
            ctx.context_name(),
            ctx.origin(),
            block_error
        );
    }
}
