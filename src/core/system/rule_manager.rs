use super::*;
use crate::{base::GuardRule, logging, utils};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

pub type RuleMap = HashMap<MetricType, HashSet<Arc<Rule>>>;

lazy_static! {
    /// published snapshot of the valid rules, read on every inbound check
    static ref RULE_MAP: RwLock<Arc<RuleMap>> = RwLock::new(Arc::new(RuleMap::new()));
    /// the loaded rules, the lock also serializes the writers
    static ref CURRENT_RULES: Mutex<HashSet<Arc<Rule>>> = Mutex::new(HashSet::new());
}

fn rule_snapshot() -> Arc<RuleMap> {
    RULE_MAP.read().unwrap().clone()
}

/// `get_rules` returns all the valid rules in effect
pub fn get_rules() -> Vec<Arc<Rule>> {
    rule_snapshot()
        .values()
        .flat_map(|rules| rules.iter().cloned())
        .collect()
}

/// `get_rules_of_metric` returns the valid rules of one metric type
pub fn get_rules_of_metric(metric_type: MetricType) -> Vec<Arc<Rule>> {
    rule_snapshot()
        .get(&metric_type)
        .map(|rules| rules.iter().cloned().collect())
        .unwrap_or_default()
}

/// `load_rules` loads given system rules to the rule manager, while all previous rules will be replaced.
/// Returns false if the rules are the same with the current ones.
pub fn load_rules(rules: Vec<Arc<Rule>>) -> bool {
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut current_rules = CURRENT_RULES.lock().unwrap();
    if *current_rules == rules {
        logging::info!(
            "[SystemRuleManager] Load rules is the same with current rules, so ignore load operation."
        );
        return false;
    }

    let start = utils::curr_time_nanos();
    let rule_map = build_rule_map(rules.iter().cloned());
    logging::info!(
        "[SystemRuleManager] System rules loaded, rules {:?}",
        rule_map
    );
    *RULE_MAP.write().unwrap() = Arc::new(rule_map);
    *current_rules = rules;
    logging::debug!(
        "[SystemRuleManager] Time statistic(ns) for updating system rule, time cost {}",
        utils::curr_time_nanos() - start
    );
    true
}

/// `clear_rules` clear all the previous rules
pub fn clear_rules() {
    let mut current_rules = CURRENT_RULES.lock().unwrap();
    current_rules.clear();
    *RULE_MAP.write().unwrap() = Arc::new(RuleMap::new());
}

fn build_rule_map<I: IntoIterator<Item = Arc<Rule>>>(rules: I) -> RuleMap {
    let mut m = RuleMap::new();
    for rule in rules {
        if let Err(err) = rule.is_valid() {
            logging::warn!(
                "[SystemRuleManager] Ignoring invalid system rule, rule: {:?}, error: {:?}",
                rule,
                err
            );
            continue;
        }
        m.entry(rule.metric_type).or_default().insert(rule);
    }
    m
}
