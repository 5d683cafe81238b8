use super::{delegate_stat_node, SlidingWindowMetric, StatisticNode};
use crate::base::{MetricEvent, ResourceType};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// ResourceNode is the resource-wide aggregation (the cluster node),
/// shared by every position of the resource in every call tree.
/// It owns the statistics of each calling origin.
#[derive(Debug)]
pub struct ResourceNode {
    pub(crate) res_name: String,
    pub(crate) resource_type: ResourceType,
    stat: StatisticNode,
    origin_nodes: RwLock<HashMap<String, Arc<StatisticNode>>>,
}

delegate_stat_node!(ResourceNode, stat);

impl ResourceNode {
    pub fn new(res_name: String, resource_type: ResourceType) -> Self {
        ResourceNode {
            res_name,
            resource_type,
            stat: StatisticNode::new(),
            origin_nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn res_name(&self) -> &str {
        &self.res_name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn default_metric(&self) -> Arc<SlidingWindowMetric> {
        self.stat.default_metric()
    }

    pub fn max_avg(&self, event: MetricEvent) -> f64 {
        self.stat.max_avg(event)
    }

    pub fn max_concurrency(&self) -> u32 {
        self.stat.max_concurrency()
    }

    /// The statistics of calls from `origin`, created on first use.
    pub fn get_or_create_origin_node(&self, origin: &str) -> Arc<StatisticNode> {
        if let Some(node) = self.origin_nodes.read().unwrap().get(origin) {
            return node.clone();
        }
        let mut nodes = self.origin_nodes.write().unwrap();
        nodes
            .entry(origin.to_owned())
            .or_insert_with(|| Arc::new(StatisticNode::new()))
            .clone()
    }

    pub fn origin_node(&self, origin: &str) -> Option<Arc<StatisticNode>> {
        self.origin_nodes.read().unwrap().get(origin).cloned()
    }

    pub fn origin_names(&self) -> Vec<String> {
        self.origin_nodes.read().unwrap().keys().cloned().collect()
    }
}
