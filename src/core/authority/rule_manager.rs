use super::*;
use crate::{base::GuardRule, logging, Error, Result};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;

lazy_static! {
    /// published snapshot of the valid rules
    static ref VALID_RULE_MAP: RwLock<Arc<HashMap<String, Vec<Arc<Rule>>>>> =
        RwLock::new(Arc::new(HashMap::new()));
    /// the loaded rules, the lock also serializes the writers
    static ref RULE_MAP: Mutex<RuleMap> = Mutex::new(HashMap::new());
}

fn rule_snapshot() -> Arc<HashMap<String, Vec<Arc<Rule>>>> {
    VALID_RULE_MAP.read().unwrap().clone()
}

fn valid_rules_of(rules: &HashSet<Arc<Rule>>) -> Vec<Arc<Rule>> {
    rules
        .iter()
        .filter(|rule| match rule.is_valid() {
            Ok(_) => true,
            Err(err) => {
                logging::warn!(
                    "[AuthorityRuleManager] Ignoring invalid authority rule {:?}, reason: {:?}",
                    rule,
                    err
                );
                false
            }
        })
        .cloned()
        .collect()
}

fn publish(rule_map: &RuleMap) {
    let valid_map = rule_map
        .iter()
        .map(|(res, rules)| (res.clone(), valid_rules_of(rules)))
        .filter(|(_, rules)| !rules.is_empty())
        .collect();
    *VALID_RULE_MAP.write().unwrap() = Arc::new(valid_map);
}

/// `load_rules` replaces all the authority rules.
/// Returns false if the rules are the same with the current ones.
pub fn load_rules(rules: Vec<Arc<Rule>>) -> bool {
    let mut rule_map: RuleMap = HashMap::new();
    for rule in rules {
        rule_map
            .entry(rule.resource.clone())
            .or_default()
            .insert(rule);
    }
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    if *global_rule_map == rule_map {
        logging::info!("[AuthorityRuleManager] Load rules is the same with current rules, so ignore load operation.");
        return false;
    }
    publish(&rule_map);
    *global_rule_map = rule_map;
    logging::info!("[AuthorityRuleManager] Authority rules were loaded");
    true
}

/// `load_rules_of_resource` replaces the authority rules of `res`, an empty `rules` clears them.
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    if res.is_empty() {
        return Err(Error::msg("empty resource"));
    }
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    if rules.is_empty() {
        if global_rule_map.remove(res).is_none() {
            return Ok(false);
        }
    } else if global_rule_map.get(res) == Some(&rules) {
        logging::info!("[AuthorityRuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
        return Ok(false);
    } else {
        global_rule_map.insert(res.to_owned(), rules);
    }
    publish(&global_rule_map);
    logging::info!(
        "[AuthorityRuleManager] load resource level rules, resource: {}",
        res
    );
    Ok(true)
}

pub fn get_rules() -> Vec<Arc<Rule>> {
    rule_snapshot().values().flatten().cloned().collect()
}

pub fn get_rules_of_resource(res: &str) -> Vec<Arc<Rule>> {
    rule_snapshot().get(res).cloned().unwrap_or_default()
}

pub fn clear_rules() {
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    global_rule_map.clear();
    publish(&global_rule_map);
}

pub fn clear_rules_of_resource(res: &str) {
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    global_rule_map.remove(res);
    publish(&global_rule_map);
}
