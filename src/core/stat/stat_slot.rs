use super::inbound_node;
use crate::{
    base::{
        BaseSlot, BlockError, EntryContext, MetricEvent, StatNode, StatSlot, TrafficType,
    },
    utils::curr_time_millis,
};
use lazy_static::lazy_static;
use std::sync::Arc;

const STAT_SLOT_ORDER: u32 = 1000;

lazy_static! {
    pub static ref DEFAULT_RESOURCE_STAT_SLOT: Arc<ResourceNodeStatSlot> =
        Arc::new(ResourceNodeStatSlot {});
}

pub fn default_resource_stat_slot() -> Arc<ResourceNodeStatSlot> {
    DEFAULT_RESOURCE_STAT_SLOT.clone()
}

/// Records the outcome of every invocation on each node bound by the prepare slot,
/// and on the inbound node for inbound traffic.
pub struct ResourceNodeStatSlot {}

impl ResourceNodeStatSlot {
    fn nodes_of(&self, ctx: &EntryContext) -> Vec<Arc<dyn StatNode>> {
        let mut nodes: Vec<Arc<dyn StatNode>> = Vec::with_capacity(4);
        if let Some(node) = ctx.stat_node() {
            nodes.push(node);
        }
        if let Some(node) = ctx.default_node() {
            nodes.push(node);
        }
        if let Some(node) = ctx.origin_node() {
            nodes.push(node);
        }
        if *ctx.resource().traffic_type() == TrafficType::Inbound {
            nodes.push(inbound_node());
        }
        nodes
    }

    fn record_pass_for(&self, node: &Arc<dyn StatNode>, count: u32) {
        node.increase_concurrency();
        node.add_count(MetricEvent::Pass, count as u64);
    }

    fn record_block_for(&self, node: &Arc<dyn StatNode>, count: u32) {
        node.add_count(MetricEvent::Block, count as u64)
    }

    fn record_complete_for(
        &self,
        node: &Arc<dyn StatNode>,
        count: u32,
        round_trip: u64,
        has_err: bool,
    ) {
        node.add_count(MetricEvent::Rt, round_trip);
        node.add_count(MetricEvent::Complete, count as u64);
        if has_err {
            node.add_count(MetricEvent::Error, count as u64);
        }
        node.decrease_concurrency();
    }
}

impl BaseSlot for ResourceNodeStatSlot {
    fn order(&self) -> u32 {
        STAT_SLOT_ORDER
    }
}

impl StatSlot for ResourceNodeStatSlot {
    fn on_entry_pass(&self, ctx: &EntryContext) {
        let count = ctx.input().batch_count();
        for node in self.nodes_of(ctx) {
            self.record_pass_for(&node, count);
        }
    }

    fn on_entry_blocked(&self, ctx: &EntryContext, _block_error: BlockError) {
        let count = ctx.input().batch_count();
        for node in self.nodes_of(ctx) {
            self.record_block_for(&node, count);
        }
    }

    fn on_completed(&self, ctx: &mut EntryContext) {
        let round_trip = curr_time_millis().saturating_sub(ctx.start_time());
        ctx.set_round_trip(round_trip);
        let count = ctx.input().batch_count();
        let has_err = ctx.get_err().is_some();
        for node in self.nodes_of(ctx) {
            self.record_complete_for(&node, count, round_trip, has_err);
        }
    }
}
