use crate::base::{MetricEvent, ReadStat, ResourceWrapper};
use crate::stat::{delegate_stat_node, ResourceNode, StatisticNode};
use crate::utils::AsAny;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A position in the call tree of a context.
pub trait TreeNode: ReadStat + AsAny {
    fn context_name(&self) -> &str;
    fn children(&self) -> Vec<Arc<DefaultNode>>;
    /// Adds `child` unless it is already one of the children.
    fn add_child(&self, child: Arc<DefaultNode>);
}

#[derive(Default)]
struct Children(RwLock<Vec<Arc<DefaultNode>>>);

impl Children {
    fn list(&self) -> Vec<Arc<DefaultNode>> {
        self.0.read().unwrap().clone()
    }

    fn add(&self, child: Arc<DefaultNode>) {
        if self.0.read().unwrap().iter().any(|c| Arc::ptr_eq(c, &child)) {
            return;
        }
        let mut children = self.0.write().unwrap();
        if !children.iter().any(|c| Arc::ptr_eq(c, &child)) {
            children.push(child);
        }
    }

    fn names(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap()
            .iter()
            .map(|c| c.resource.name().clone())
            .collect()
    }
}

/// DefaultNode holds the statistics of one resource at one position of a call tree,
/// that is, of the resource under one context name.
pub struct DefaultNode {
    resource: ResourceWrapper,
    context_name: String,
    cluster: Arc<ResourceNode>,
    stat: StatisticNode,
    children: Children,
}

delegate_stat_node!(DefaultNode, stat);

impl DefaultNode {
    pub fn new(context_name: String, resource: ResourceWrapper, cluster: Arc<ResourceNode>) -> Self {
        DefaultNode {
            resource,
            context_name,
            cluster,
            stat: StatisticNode::new(),
            children: Children::default(),
        }
    }

    pub fn resource(&self) -> &ResourceWrapper {
        &self.resource
    }

    /// The resource-wide node this call tree position reports to.
    pub fn cluster_node(&self) -> Arc<ResourceNode> {
        self.cluster.clone()
    }
}

// children are listed by name, the call tree may contain cycles
impl fmt::Debug for DefaultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultNode")
            .field("resource", &self.resource)
            .field("context_name", &self.context_name)
            .field("children", &self.children.names())
            .finish()
    }
}

impl TreeNode for DefaultNode {
    fn context_name(&self) -> &str {
        &self.context_name
    }

    fn children(&self) -> Vec<Arc<DefaultNode>> {
        self.children.list()
    }

    fn add_child(&self, child: Arc<DefaultNode>) {
        self.children.add(child)
    }
}

/// EntranceNode is the root of the call tree of a context name.
/// It records nothing itself and reads as the sum of its children.
pub struct EntranceNode {
    context_name: String,
    children: Children,
}

impl EntranceNode {
    pub fn new(context_name: String) -> Self {
        EntranceNode {
            context_name,
            children: Children::default(),
        }
    }

    pub fn total_concurrency(&self) -> u32 {
        use crate::base::ConcurrencyStat;
        self.children
            .list()
            .iter()
            .map(|c| c.current_concurrency())
            .sum()
    }
}

impl fmt::Debug for EntranceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntranceNode")
            .field("context_name", &self.context_name)
            .field("children", &self.children.names())
            .finish()
    }
}

impl ReadStat for EntranceNode {
    fn qps(&self, event: MetricEvent) -> f64 {
        self.children.list().iter().map(|c| c.qps(event)).sum()
    }

    fn qps_previous(&self, event: MetricEvent) -> f64 {
        self.children
            .list()
            .iter()
            .map(|c| c.qps_previous(event))
            .sum()
    }

    fn sum(&self, event: MetricEvent) -> u64 {
        self.children.list().iter().map(|c| c.sum(event)).sum()
    }

    fn min_rt(&self) -> f64 {
        self.children
            .list()
            .iter()
            .map(|c| c.min_rt())
            .fold(None, |min: Option<f64>, rt| match min {
                Some(m) if m <= rt => Some(m),
                _ => Some(rt),
            })
            .unwrap_or_default()
    }

    fn avg_rt(&self) -> f64 {
        let complete = self.sum(MetricEvent::Complete);
        if complete == 0 {
            return 0f64;
        }
        self.sum(MetricEvent::Rt) as f64 / complete as f64
    }
}

impl TreeNode for EntranceNode {
    fn context_name(&self) -> &str {
        &self.context_name
    }

    fn children(&self) -> Vec<Arc<DefaultNode>> {
        self.children.list()
    }

    fn add_child(&self, child: Arc<DefaultNode>) {
        self.children.add(child)
    }
}

lazy_static! {
    static ref DEFAULT_NODES: RwLock<HashMap<(String, String), Arc<DefaultNode>>> =
        RwLock::new(HashMap::new());
}

/// The node of `res` under `context_name`, created on first use.
pub fn get_or_create_default_node(
    context_name: &str,
    res: &ResourceWrapper,
    cluster: Arc<ResourceNode>,
) -> Arc<DefaultNode> {
    let key = (context_name.to_owned(), res.name().clone());
    if let Some(node) = DEFAULT_NODES.read().unwrap().get(&key) {
        return node.clone();
    }
    let mut nodes = DEFAULT_NODES.write().unwrap();
    nodes
        .entry(key)
        .or_insert_with(|| {
            Arc::new(DefaultNode::new(
                context_name.to_owned(),
                res.clone(),
                cluster,
            ))
        })
        .clone()
}

pub(crate) fn reset_default_nodes() {
    DEFAULT_NODES.write().unwrap().clear();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{ConcurrencyStat, ResourceType, StatNodeExt, TrafficType};

    fn node_of(ctx: &str, res: &str) -> Arc<DefaultNode> {
        let res = ResourceWrapper::new(res.into(), ResourceType::Common, TrafficType::Inbound);
        let cluster = Arc::new(ResourceNode::new(res.name().clone(), ResourceType::Common));
        get_or_create_default_node(ctx, &res, cluster)
    }

    #[test]
    fn one_node_per_context_and_resource() {
        let a = node_of("node_test_ctx1", "node_test_res");
        let b = node_of("node_test_ctx1", "node_test_res");
        let c = node_of("node_test_ctx2", "node_test_res");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.context_name(), "node_test_ctx2");
    }

    #[test]
    fn children_deduplicated() {
        let entrance = EntranceNode::new("node_test_dedup".into());
        let child = node_of("node_test_dedup", "node_test_dedup_res");
        entrance.add_child(child.clone());
        entrance.add_child(child.clone());
        assert_eq!(entrance.children().len(), 1);
    }

    #[test]
    fn entrance_sums_children() {
        let entrance = EntranceNode::new("node_test_sum".into());
        let a = node_of("node_test_sum", "node_test_sum_a");
        let b = node_of("node_test_sum", "node_test_sum_b");
        entrance.add_child(a.clone());
        entrance.add_child(b.clone());
        assert_eq!(entrance.avg_rt(), 0f64);

        a.add_pass(2);
        b.add_pass(3);
        a.add_success(2, 40);
        b.add_success(3, 20);
        a.increase_concurrency();
        b.increase_concurrency();

        assert_eq!(entrance.sum(MetricEvent::Pass), 5);
        assert_eq!(entrance.sum(MetricEvent::Complete), 5);
        assert!((entrance.avg_rt() - 12.0).abs() < f64::EPSILON);
        assert_eq!(entrance.total_concurrency(), 2);
    }

    #[test]
    fn cyclic_debug() {
        let a = node_of("node_test_cycle", "node_test_cycle_a");
        let b = node_of("node_test_cycle", "node_test_cycle_b");
        a.add_child(b.clone());
        b.add_child(a.clone());
        let s = format!("{:?}", a);
        assert!(s.contains("node_test_cycle_b"));
    }
}
