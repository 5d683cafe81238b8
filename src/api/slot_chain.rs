use crate::base::{SlotChain, DEFAULT_MAX_RESOURCE_AMOUNT};
use crate::{authority, circuitbreaker, flow, hotspot, logging, stat, system};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Once, RwLock};

lazy_static! {
    pub static ref GLOBAL_SLOT_CHAIN: Arc<SlotChain> = Arc::new(build_default_slot_chain());
    static ref RESOURCE_SLOT_CHAINS: RwLock<HashMap<String, Arc<SlotChain>>> =
        RwLock::new(HashMap::new());
    static ref OVERFLOW_ONCE: Once = Once::new();
}

/// A chain of the built-in slots.
pub fn build_default_slot_chain() -> SlotChain {
    let mut sc = SlotChain::new();

    sc.add_stat_prepare_slot(stat::default_resource_node_prepare_slot()); // 1000

    sc.add_rule_check_slot(authority::default_slot()); // 500
    sc.add_rule_check_slot(system::default_slot()); // 1000
    sc.add_rule_check_slot(flow::default_slot()); // 2000
    sc.add_rule_check_slot(hotspot::default_slot()); // 4000
    sc.add_rule_check_slot(circuitbreaker::default_slot()); // 5000

    sc.add_stat_slot(stat::default_resource_stat_slot()); // 1000
    sc.add_stat_slot(crate::log::default_stat_slot()); // 2000
    sc.add_stat_slot(flow::default_stand_alone_stat_slot()); // 3000
    sc.add_stat_slot(hotspot::default_concurrency_stat_slot()); // 4000
    sc.add_stat_slot(circuitbreaker::default_metric_stat_slot()); // 5000
    sc
}

pub fn global_slot_chain() -> Arc<SlotChain> {
    GLOBAL_SLOT_CHAIN.clone()
}

/// The chain guarding `res`, created on first use.
/// Past `DEFAULT_MAX_RESOURCE_AMOUNT` resources, new ones share the global chain.
pub fn slot_chain_of(res: &str) -> Arc<SlotChain> {
    if let Some(sc) = RESOURCE_SLOT_CHAINS.read().unwrap().get(res) {
        return sc.clone();
    }
    let mut chains = RESOURCE_SLOT_CHAINS.write().unwrap();
    if let Some(sc) = chains.get(res) {
        return sc.clone();
    }
    if chains.len() >= DEFAULT_MAX_RESOURCE_AMOUNT {
        OVERFLOW_ONCE.call_once(|| {
            logging::warn!(
                "[SlotChain] amount of slot chains exceeds {}, the global one is shared",
                DEFAULT_MAX_RESOURCE_AMOUNT
            );
        });
        return global_slot_chain();
    }
    let sc = Arc::new(build_default_slot_chain());
    chains.insert(res.to_owned(), sc.clone());
    sc
}
