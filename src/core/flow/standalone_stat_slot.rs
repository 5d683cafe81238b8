use super::*;
use crate::base::{BaseSlot, EntryContext, MetricEvent, StatSlot};
use lazy_static::lazy_static;
use std::sync::Arc;

const STAT_SLOT_ORDER: u32 = 3000;

/// Records the passed requests into the statistics
/// owned by flow controllers, those views over the resource node are skipped.
pub struct StandaloneStatSlot {}

lazy_static! {
    pub static ref DEFAULT_STAND_ALONE_STAT_SLOT: Arc<StandaloneStatSlot> =
        Arc::new(StandaloneStatSlot {});
}

pub fn default_stand_alone_stat_slot() -> Arc<StandaloneStatSlot> {
    DEFAULT_STAND_ALONE_STAT_SLOT.clone()
}

impl BaseSlot for StandaloneStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl StatSlot for StandaloneStatSlot {
    fn on_entry_pass(&self, ctx: &EntryContext) {
        let count = ctx.input().batch_count() as u64;
        for tc in get_traffic_controller_list_for(ctx.resource().name()) {
            if tc.stat().reuse_global() {
                continue;
            }
            if let Some(metric) = tc.stat().write_only_metric() {
                metric.add_count(MetricEvent::Pass, count);
            }
        }
    }
}
