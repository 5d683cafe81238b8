//! Read access to the live statistics, for metric consumers.

use super::{get_resource_node, resource_node_list, ResourceNode};
use crate::base::{ConcurrencyStat, MetricEvent, MetricItem, MetricItemRetriever, ReadStat};
use crate::utils::curr_time_millis;
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of a resource over the default window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStat {
    pub pass_qps: f64,
    pub block_qps: f64,
    pub complete_qps: f64,
    pub error_qps: f64,
    pub avg_rt: f64,
    pub concurrency: u32,
}

pub fn resource_names() -> Vec<String> {
    resource_node_list()
        .iter()
        .map(|n| n.res_name().to_owned())
        .collect()
}

pub fn read_stat_of(res_name: &str) -> Option<ResourceStat> {
    get_resource_node(res_name).map(|node| ResourceStat {
        pass_qps: node.qps(MetricEvent::Pass),
        block_qps: node.qps(MetricEvent::Block),
        complete_qps: node.qps(MetricEvent::Complete),
        error_qps: node.qps(MetricEvent::Error),
        avg_rt: node.avg_rt(),
        concurrency: node.current_concurrency(),
    })
}

/// Per-second items of the resource whose seconds start within `[start_ms, end_ms]`.
/// Only the seconds still held by the resource's global window are available.
pub fn metrics_in_range(res_name: &str, start_ms: u64, end_ms: u64) -> Vec<MetricItem> {
    match get_resource_node(res_name) {
        Some(node) => items_of(&node, start_ms, end_ms),
        None => Vec::new(),
    }
}

pub fn metrics_of_last_minute(res_name: &str) -> Vec<MetricItem> {
    let now = curr_time_millis();
    metrics_in_range(res_name, now.saturating_sub(60_000), now)
}

pub fn all_metrics_of_last_minute() -> Vec<MetricItem> {
    let now = curr_time_millis();
    let start = now.saturating_sub(60_000);
    resource_node_list()
        .iter()
        .flat_map(|node| items_of(node, start, now))
        .collect()
}

fn items_of(node: &Arc<ResourceNode>, start_ms: u64, end_ms: u64) -> Vec<MetricItem> {
    let mut items = node.metrics_on_condition(&move |ts| start_ms <= ts && ts <= end_ms);
    for item in items.iter_mut() {
        item.resource = node.res_name().to_owned();
        item.resource_type = node.resource_type();
    }
    items
}
