use super::{reset_default_nodes, Context, EntranceNode};
use crate::{config, logging};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Once, RwLock};

lazy_static! {
    static ref ENTRANCE_NODES: RwLock<HashMap<String, Arc<EntranceNode>>> =
        RwLock::new(HashMap::new());
    static ref OVERFLOW_ONCE: Once = Once::new();
}

/// The entrance node of `name`, created on first use.
/// `None` once the amount of context names reached the configured cap.
fn entrance_node_of(name: &str) -> Option<Arc<EntranceNode>> {
    if let Some(node) = ENTRANCE_NODES.read().unwrap().get(name) {
        return Some(node.clone());
    }
    let mut nodes = ENTRANCE_NODES.write().unwrap();
    if let Some(node) = nodes.get(name) {
        return Some(node.clone());
    }
    let cap = config::max_context_name_amount();
    if nodes.len() >= cap {
        OVERFLOW_ONCE.call_once(|| {
            logging::warn!(
                "[Context] amount of context names exceeds {}, entries of new names will not be checked or counted",
                cap
            );
        });
        return None;
    }
    let node = Arc::new(EntranceNode::new(name.to_owned()));
    nodes.insert(name.to_owned(), node.clone());
    Some(node)
}

/// Builds a context of `name`, a null one if the name cannot be registered.
pub fn new_context(name: &str, origin: &str) -> Arc<Context> {
    Arc::new(Context::new(
        name.to_owned(),
        origin.to_owned(),
        entrance_node_of(name),
    ))
}

pub fn entrance_node(name: &str) -> Option<Arc<EntranceNode>> {
    ENTRANCE_NODES.read().unwrap().get(name).cloned()
}

pub fn entrance_nodes() -> Vec<Arc<EntranceNode>> {
    ENTRANCE_NODES.read().unwrap().values().cloned().collect()
}

/// Drops every entrance node and call tree node. Contexts in use keep theirs.
pub fn reset_context_registry() {
    ENTRANCE_NODES.write().unwrap().clear();
    reset_default_nodes();
}
