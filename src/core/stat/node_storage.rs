use super::ResourceNode;
use crate::{
    base::{ResourceType, DEFAULT_MAX_RESOURCE_AMOUNT, TOTAL_IN_BOUND_RESOURCE_NAME},
    logging,
};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type ResourceNodeMap = HashMap<String, Arc<ResourceNode>>;

lazy_static! {
    /// aggregation of all the inbound traffic, read by system protection
    pub static ref INBOUND_NODE: Arc<ResourceNode> = Arc::new(ResourceNode::new(
        TOTAL_IN_BOUND_RESOURCE_NAME.into(),
        ResourceType::Common
    ));
    static ref RESOURCE_NODE_MAP: RwLock<ResourceNodeMap> = RwLock::new(ResourceNodeMap::new());
}

pub fn inbound_node() -> Arc<ResourceNode> {
    INBOUND_NODE.clone()
}

pub fn resource_node_list() -> Vec<Arc<ResourceNode>> {
    RESOURCE_NODE_MAP.read().unwrap().values().cloned().collect()
}

pub fn get_resource_node(res_name: &str) -> Option<Arc<ResourceNode>> {
    RESOURCE_NODE_MAP.read().unwrap().get(res_name).cloned()
}

/// Looks the node up under the read lock first,
/// and creates it under the write lock if it is still absent then.
pub fn get_or_create_resource_node(res_name: &str, resource_type: ResourceType) -> Arc<ResourceNode> {
    if let Some(node) = get_resource_node(res_name) {
        return node;
    }
    let mut res_map = RESOURCE_NODE_MAP.write().unwrap();
    if let Some(node) = res_map.get(res_name) {
        return node.clone();
    }
    if res_map.len() >= DEFAULT_MAX_RESOURCE_AMOUNT {
        logging::warn!(
            "[get_or_create_resource_node] Resource amount exceeds the threshold {}",
            DEFAULT_MAX_RESOURCE_AMOUNT
        );
    }
    let node = Arc::new(ResourceNode::new(res_name.to_owned(), resource_type));
    res_map.insert(res_name.to_owned(), node.clone());
    node
}

/// Drops every resource node, for tests.
pub fn reset_resource_map() {
    RESOURCE_NODE_MAP.write().unwrap().clear();
}
