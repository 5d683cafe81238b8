use super::*;
use crate::base::{BaseSlot, EntryContext, StatSlot};
use lazy_static::lazy_static;
use std::sync::Arc;

const STAT_SLOT_ORDER: u32 = 5000;

/// MetricStatSlot feeds the breakers with the passed and the completed invocations.
/// It must be in the slot chain whenever circuit breaking rules are loaded.
pub struct MetricStatSlot {}

lazy_static! {
    pub static ref DEFAULT_METRIC_STAT_SLOT: Arc<MetricStatSlot> = Arc::new(MetricStatSlot {});
}

pub fn default_metric_stat_slot() -> Arc<MetricStatSlot> {
    DEFAULT_METRIC_STAT_SLOT.clone()
}

impl BaseSlot for MetricStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl StatSlot for MetricStatSlot {
    fn on_entry_pass(&self, ctx: &EntryContext) {
        for cb in get_breakers_of_resource(ctx.resource().name()) {
            cb.on_request_pass(ctx);
        }
    }

    fn on_completed(&self, ctx: &mut EntryContext) {
        for cb in get_breakers_of_resource(ctx.resource().name()) {
            cb.on_request_complete(ctx);
        }
    }
}
