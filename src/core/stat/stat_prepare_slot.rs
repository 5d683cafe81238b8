use super::get_or_create_resource_node;
use crate::base::{BaseSlot, EntryContext, StatPrepareSlot};
use crate::core::context::get_or_create_default_node;
use lazy_static::lazy_static;
use std::sync::Arc;

const PREPARE_SLOT_ORDER: u32 = 1000;

lazy_static! {
    pub static ref DEFAULT_RESOURCE_NODE_PREPARE_SLOT: Arc<ResourceNodePrepareSlot> =
        Arc::new(ResourceNodePrepareSlot {});
}

pub fn default_resource_node_prepare_slot() -> Arc<ResourceNodePrepareSlot> {
    DEFAULT_RESOURCE_NODE_PREPARE_SLOT.clone()
}

/// Binds the nodes of the invocation: the resource node,
/// the call tree node under the current node of the context,
/// and the node of the calling origin.
pub struct ResourceNodePrepareSlot {}

impl BaseSlot for ResourceNodePrepareSlot {
    fn order(&self) -> u32 {
        PREPARE_SLOT_ORDER
    }
}

impl StatPrepareSlot for ResourceNodePrepareSlot {
    fn prepare(&self, ctx: &mut EntryContext) {
        let res = ctx.resource().clone();
        let cluster = get_or_create_resource_node(res.name(), *res.resource_type());
        if let Some(call) = ctx.call_context().cloned() {
            if !call.is_null() {
                let node = get_or_create_default_node(call.name(), &res, cluster.clone());
                if let Some(parent) = call.current_node() {
                    parent.add_child(node.clone());
                }
                ctx.set_default_node(node);
            }
            if !call.origin().is_empty() {
                ctx.set_origin_node(cluster.get_or_create_origin_node(call.origin()));
            }
        }
        ctx.set_stat_node(cluster);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{ResourceType, ResourceWrapper, TrafficType};
    use crate::core::context::{new_context, TreeNode};
    use crate::stat::ResourceNode;
    use crate::utils::AsAny;

    #[test]
    fn binds_nodes() {
        let call = new_context("stat_prepare_binds_nodes", "caller-a");
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            "stat_prepare_res".into(),
            ResourceType::Common,
            TrafficType::Inbound,
        ));
        ctx.set_call_context(call.clone());
        default_resource_node_prepare_slot().prepare(&mut ctx);

        let stat_node = ctx
            .stat_node()
            .unwrap()
            .as_any_arc()
            .downcast::<ResourceNode>()
            .unwrap();
        let default_node = ctx.default_node().unwrap();
        assert!(ctx.origin_node().is_some());
        assert_eq!(default_node.context_name(), "stat_prepare_binds_nodes");
        let entrance = call.entrance_node().unwrap();
        assert_eq!(entrance.children().len(), 1);
        assert!(Arc::ptr_eq(&entrance.children()[0], &default_node));
        // the call tree node points at the resource node
        assert!(Arc::ptr_eq(&default_node.cluster_node(), &stat_node));
    }

    #[test]
    fn without_context() {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            "stat_prepare_no_ctx".into(),
            ResourceType::Common,
            TrafficType::Outbound,
        ));
        default_resource_node_prepare_slot().prepare(&mut ctx);
        assert!(ctx.stat_node().is_some());
        assert!(ctx.default_node().is_none());
        assert!(ctx.origin_node().is_none());
    }
}
