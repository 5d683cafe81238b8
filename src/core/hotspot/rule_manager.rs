use super::*;
use crate::{base::GuardRule, logging, Error, Result};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

pub type ControllerMap = HashMap<String, Vec<Arc<Controller>>>;
pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;

lazy_static! {
    /// published snapshot, read on every check
    static ref CONTROLLER_MAP: RwLock<Arc<ControllerMap>> = RwLock::new(Arc::new(HashMap::new()));
    /// the loaded rules, the lock also serializes the writers
    static ref RULE_MAP: Mutex<RuleMap> = Mutex::new(HashMap::new());
}

fn controller_snapshot() -> Arc<ControllerMap> {
    CONTROLLER_MAP.read().unwrap().clone()
}

fn publish(controller_map: ControllerMap) {
    *CONTROLLER_MAP.write().unwrap() = Arc::new(controller_map);
}

fn valid_rules_of(rules: &HashSet<Arc<Rule>>) -> Vec<Arc<Rule>> {
    rules
        .iter()
        .filter(|rule| match rule.is_valid() {
            Ok(_) => true,
            Err(err) => {
                logging::warn!(
                    "[HotSpotRuleManager] Ignoring invalid hotspot rule {:?}, reason: {:?}",
                    rule,
                    err
                );
                false
            }
        })
        .cloned()
        .collect()
}

/// Builds the controllers of one resource. The controller of an equal rule is kept,
/// a rule whose counters are compatible with an old controller takes them over.
fn build_controllers(rules: &[Arc<Rule>], old_tcs: &[Arc<Controller>]) -> Vec<Arc<Controller>> {
    let mut taken = vec![false; old_tcs.len()];
    let mut tcs = Vec::with_capacity(rules.len());
    for rule in rules {
        let equal = (0..old_tcs.len()).find(|&i| !taken[i] && old_tcs[i].rule() == rule);
        if let Some(idx) = equal {
            taken[idx] = true;
            tcs.push(old_tcs[idx].clone());
            continue;
        }
        let reused = (0..old_tcs.len())
            .find(|&i| !taken[i] && old_tcs[i].rule().is_stat_reusable(rule));
        let metric = reused.map(|idx| {
            taken[idx] = true;
            old_tcs[idx].metric().clone()
        });
        tcs.push(Arc::new(Controller::new(rule.clone(), metric)));
    }
    tcs
}

/// `load_rules` replaces all the hotspot rules.
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
        logging::info!("[HotSpotRuleManager] Load rules is the same with current rules, so ignore load operation.");
        return false;
    }
    let old_controller_map = controller_snapshot();
    let mut controller_map = HashMap::with_capacity(rule_map.len());
    for (res, rules) in &rule_map {
        let valid_rules = valid_rules_of(rules);
        if valid_rules.is_empty() {
            continue;
        }
        let old_tcs = old_controller_map.get(res).cloned().unwrap_or_default();
        controller_map.insert(res.clone(), build_controllers(&valid_rules, &old_tcs));
    }
    publish(controller_map);
    *global_rule_map = rule_map;
    logging::info!("[HotSpotRuleManager] Hotspot rules were loaded");
    true
}

/// `load_rules_of_resource` replaces the hotspot rules of `res`, an empty `rules` clears them.
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    if res.is_empty() {
        return Err(Error::msg("empty resource"));
    }
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    let mut controller_map = (*controller_snapshot()).clone();
    if rules.is_empty() {
        if global_rule_map.remove(res).is_none() {
            return Ok(false);
        }
        controller_map.remove(res);
        publish(controller_map);
        logging::info!(
            "[HotSpotRuleManager] clear resource level rules, resource: {}",
            res
        );
        return Ok(true);
    }
    if global_rule_map.get(res) == Some(&rules) {
        logging::info!("[HotSpotRuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
        return Ok(false);
    }
    let valid_rules = valid_rules_of(&rules);
    let old_tcs = controller_map.remove(res).unwrap_or_default();
    if !valid_rules.is_empty() {
        controller_map.insert(res.to_owned(), build_controllers(&valid_rules, &old_tcs));
    }
    publish(controller_map);
    global_rule_map.insert(res.to_owned(), rules);
    logging::info!(
        "[HotSpotRuleManager] load resource level rules, resource: {}, valid rules: {:?}",
        res,
        valid_rules
    );
    Ok(true)
}

pub fn get_rules() -> Vec<Arc<Rule>> {
    controller_snapshot()
        .values()
        .flat_map(|tcs| tcs.iter().map(|tc| Arc::clone(tc.rule())))
        .collect()
}

pub fn get_rules_of_resource(res: &str) -> Vec<Arc<Rule>> {
    get_traffic_controller_list_for(res)
        .iter()
        .map(|tc| Arc::clone(tc.rule()))
        .collect()
}

pub fn clear_rules() {
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    global_rule_map.clear();
    publish(HashMap::new());
}

pub fn clear_rules_of_resource(res: &str) {
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    global_rule_map.remove(res);
    let mut controller_map = (*controller_snapshot()).clone();
    controller_map.remove(res);
    publish(controller_map);
}

pub fn get_traffic_controller_list_for(res: &str) -> Vec<Arc<Controller>> {
    controller_snapshot().get(res).cloned().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule_of(res: &str, threshold: u64) -> Arc<Rule> {
        Arc::new(Rule {
            resource: res.into(),
            metric_type: MetricType::Qps,
            threshold,
            duration_in_sec: 1,
            ..Default::default()
        })
    }

    #[test]
    fn load_of_resource() {
        let res = "hotspot_manager_load";
        let invalid = Arc::new(Rule {
            resource: res.into(),
            ..Default::default()
        });
        assert!(load_rules_of_resource(res, vec![rule_of(res, 10), invalid]).unwrap());
        assert_eq!(get_rules_of_resource(res), vec![rule_of(res, 10)]);
        assert!(load_rules_of_resource(res, vec![rule_of(res, 10)]).unwrap());
        assert!(!load_rules_of_resource(res, vec![rule_of(res, 10)]).unwrap());
        assert!(load_rules_of_resource(res, vec![]).unwrap());
        assert!(get_traffic_controller_list_for(res).is_empty());
        assert!(load_rules_of_resource("", vec![]).is_err());
    }

    #[test]
    fn reload_keeps_counters() {
        let res = "hotspot_manager_reuse";
        load_rules_of_resource(res, vec![rule_of(res, 10)]).unwrap();
        let old = get_traffic_controller_list_for(res)[0].clone();
        let arg = "u".to_string();
        assert!(old.perform_checking(&arg, 1).is_pass());

        // a higher threshold keeps the tokens already taken
        load_rules_of_resource(res, vec![rule_of(res, 20)]).unwrap();
        let new = get_traffic_controller_list_for(res)[0].clone();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(Arc::ptr_eq(old.metric(), new.metric()));
        assert_eq!(new.metric().rule_token_counter.len(), 1);

        let throttled = Arc::new(Rule {
            control_strategy: ControlStrategy::Throttling,
            ..(*rule_of(res, 20)).clone()
        });
        load_rules_of_resource(res, vec![throttled]).unwrap();
        let fresh = get_traffic_controller_list_for(res)[0].clone();
        assert!(fresh.metric().rule_token_counter.is_empty());
        clear_rules_of_resource(res);
        assert!(get_rules_of_resource(res).is_empty());
    }
}
