use super::*;
use crate::{base::GuardRule, logging, utils, Error, Result};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// BreakerGenFn builds the circuit breaker of a rule.
/// The second argument is a statistic reused from an old breaker, if any.
pub type BreakerGenFn = dyn Send
    + Sync
    + Fn(Arc<Rule>, Option<Arc<CounterLeapArray>>) -> Result<Arc<dyn CircuitBreakerTrait>>;

pub type BreakerMap = HashMap<String, Vec<Arc<dyn CircuitBreakerTrait>>>;
pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;

macro_rules! insert_breaker_generator {
    ($map:expr, $strategy:expr, $breaker:ident) => {
        $map.insert(
            $strategy,
            Box::new(
                |rule: Arc<Rule>,
                 stat: Option<Arc<CounterLeapArray>>|
                 -> Result<Arc<dyn CircuitBreakerTrait>> {
                    let cb: Arc<dyn CircuitBreakerTrait> = match stat {
                        Some(stat) => Arc::new($breaker::new_with_stat(rule, stat)),
                        None => Arc::new($breaker::new(rule)?),
                    };
                    Ok(cb)
                },
            ),
        );
    };
}

lazy_static! {
    static ref GEN_FUN_MAP: RwLock<HashMap<BreakerStrategy, Box<BreakerGenFn>>> = {
        let mut gen_fun_map: HashMap<BreakerStrategy, Box<BreakerGenFn>> = HashMap::new();
        insert_breaker_generator!(gen_fun_map, BreakerStrategy::SlowRequestRatio, SlowRtBreaker);
        insert_breaker_generator!(gen_fun_map, BreakerStrategy::ErrorRatio, ErrorRatioBreaker);
        insert_breaker_generator!(gen_fun_map, BreakerStrategy::ErrorCount, ErrorCountBreaker);
        RwLock::new(gen_fun_map)
    };
    static ref STATE_CHANGE_LISTENERS: RwLock<Vec<Arc<dyn StateChangeListener>>> =
        RwLock::new(Vec::new());
    /// published snapshot, read on every check
    static ref BREAKER_MAP: RwLock<Arc<BreakerMap>> = RwLock::new(Arc::new(HashMap::new()));
    /// the loaded rules, the lock also serializes the writers
    static ref RULE_MAP: Mutex<RuleMap> = Mutex::new(HashMap::new());
}

fn breaker_snapshot() -> Arc<BreakerMap> {
    BREAKER_MAP.read().unwrap().clone()
}

fn publish(breaker_map: BreakerMap) {
    *BREAKER_MAP.write().unwrap() = Arc::new(breaker_map);
}

pub(crate) fn state_change_listeners() -> Vec<Arc<dyn StateChangeListener>> {
    STATE_CHANGE_LISTENERS.read().unwrap().clone()
}

/// `register_state_change_listeners` adds listeners notified on every state transformation.
pub fn register_state_change_listeners(mut listeners: Vec<Arc<dyn StateChangeListener>>) {
    if listeners.is_empty() {
        return;
    }
    STATE_CHANGE_LISTENERS
        .write()
        .unwrap()
        .append(&mut listeners);
}

pub fn clear_state_change_listeners() {
    STATE_CHANGE_LISTENERS.write().unwrap().clear();
}

fn valid_rules_of(rules: &HashSet<Arc<Rule>>) -> HashSet<Arc<Rule>> {
    rules
        .iter()
        .filter(|rule| match rule.is_valid() {
            Ok(_) => true,
            Err(err) => {
                logging::warn!(
                    "[CircuitBreaker RuleManager] Ignoring invalid circuit breaking rule {:?}, reason: {:?}",
                    rule,
                    err
                );
                false
            }
        })
        .cloned()
        .collect()
}

/// `load_rules` replaces all the circuit breaking rules.
/// Breakers of the rules unchanged keep their state and statistic.
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
        logging::info!("[CircuitBreaker RuleManager] Load rules is the same with current rules, so ignore load operation.");
        return false;
    }

    let start = utils::curr_time_nanos();
    let old_breaker_map = breaker_snapshot();
    let mut breaker_map = HashMap::with_capacity(rule_map.len());
    for (res, rules) in &rule_map {
        let valid_rules = valid_rules_of(rules);
        if valid_rules.is_empty() {
            continue;
        }
        let old_cbs = old_breaker_map.get(res).cloned().unwrap_or_default();
        let cbs = build_resource_circuit_breaker(res, &valid_rules, old_cbs);
        if !cbs.is_empty() {
            breaker_map.insert(res.clone(), cbs);
        }
    }
    publish(breaker_map);
    *global_rule_map = rule_map;
    drop(global_rule_map);

    logging::debug!(
        "[CircuitBreaker RuleManager] Time statistic(ns) for updating circuit breaker rule, time cost {}",
        utils::curr_time_nanos() - start
    );
    logging::info!("[CircuitBreaker RuleManager] Circuit breaking rules were loaded");
    true
}

/// `load_rules_of_resource` replaces the circuit breaking rules of `res` only,
/// an empty `rules` clears them.
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    if res.is_empty() {
        return Err(Error::msg("empty resource"));
    }
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    let old_breaker_map = breaker_snapshot();

    if rules.is_empty() {
        if global_rule_map.remove(res).is_none() {
            return Ok(false);
        }
        let mut breaker_map = (*old_breaker_map).clone();
        breaker_map.remove(res);
        publish(breaker_map);
        logging::info!(
            "[CircuitBreaker RuleManager] clear resource level rules, resource {}",
            res
        );
        return Ok(true);
    }
    if global_rule_map.get(res) == Some(&rules) {
        logging::info!("[CircuitBreaker RuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
        return Ok(false);
    }

    let valid_res_rules = valid_rules_of(&rules);
    let old_cbs = old_breaker_map.get(res).cloned().unwrap_or_default();
    let new_cbs = build_resource_circuit_breaker(res, &valid_res_rules, old_cbs);

    let mut breaker_map = (*old_breaker_map).clone();
    if new_cbs.is_empty() {
        breaker_map.remove(res);
    } else {
        breaker_map.insert(res.to_owned(), new_cbs);
    }
    publish(breaker_map);
    global_rule_map.insert(res.to_owned(), rules);

    logging::info!(
        "[CircuitBreaker RuleManager] load resource level rules, resource: {}, valid rules: {:?}",
        res,
        valid_res_rules
    );
    Ok(true)
}

/// `get_rules` returns the rules of all the breakers in effect
pub fn get_rules() -> Vec<Arc<Rule>> {
    breaker_snapshot()
        .values()
        .flat_map(|cbs| cbs.iter().map(|cb| Arc::clone(cb.bound_rule())))
        .collect()
}

pub fn get_rules_of_resource(res: &str) -> Vec<Arc<Rule>> {
    get_breakers_of_resource(res)
        .iter()
        .map(|cb| Arc::clone(cb.bound_rule()))
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
    let mut breaker_map = (*breaker_snapshot()).clone();
    breaker_map.remove(res);
    publish(breaker_map);
}

pub fn get_breakers_of_resource(res: &str) -> Vec<Arc<dyn CircuitBreakerTrait>> {
    breaker_snapshot().get(res).cloned().unwrap_or_default()
}

/// `set_circuit_breaker_generator` sets the breaker generator of a custom strategy.
/// The built-in strategies are not allowed to be modified.
pub fn set_circuit_breaker_generator(
    strategy: BreakerStrategy,
    generator: Box<BreakerGenFn>,
) -> Result<()> {
    match strategy {
        BreakerStrategy::Custom(_) => {
            GEN_FUN_MAP.write().unwrap().insert(strategy, generator);
            Ok(())
        }
        _ => Err(Error::msg(
            "Default circuit breakers are not allowed to be modified.",
        )),
    }
}

pub fn remove_circuit_breaker_generator(strategy: &BreakerStrategy) -> Result<()> {
    match strategy {
        BreakerStrategy::Custom(_) => {
            GEN_FUN_MAP.write().unwrap().remove(strategy);
            Ok(())
        }
        _ => Err(Error::msg(
            "Default circuit breakers are not allowed to be removed.",
        )),
    }
}

/// Returns the index of the old breaker of an equal rule,
/// and the index of the first old breaker whose statistic the rule can reuse.
fn calculate_reuse_index_for(
    r: &Arc<Rule>,
    old_res_cbs: &[Arc<dyn CircuitBreakerTrait>],
) -> (Option<usize>, Option<usize>) {
    let mut reuse_stat_idx = None;
    for (idx, old_cb) in old_res_cbs.iter().enumerate() {
        let old_rule = old_cb.bound_rule();
        if old_rule == r {
            return (Some(idx), reuse_stat_idx);
        }
        if reuse_stat_idx.is_none() && old_rule.is_stat_reusable(r) {
            reuse_stat_idx = Some(idx);
        }
    }
    (None, reuse_stat_idx)
}

/// build_resource_circuit_breaker builds the breakers of `res` from its rules.
/// The breaker of an equal rule is kept, statistics are reused where possible.
pub fn build_resource_circuit_breaker(
    res: &str,
    rules_of_res: &HashSet<Arc<Rule>>,
    mut old_res_cbs: Vec<Arc<dyn CircuitBreakerTrait>>,
) -> Vec<Arc<dyn CircuitBreakerTrait>> {
    let mut new_res_cbs = Vec::with_capacity(rules_of_res.len());
    let gen_fun_map = GEN_FUN_MAP.read().unwrap();
    for rule in rules_of_res {
        if res != rule.resource {
            logging::error!("[CircuitBreaker RuleManager] unmatched resource name expect: {}, actual: {}, rule: {:?}", res, rule.resource, rule);
            continue;
        }
        let (eq_idx, reuse_stat_idx) = calculate_reuse_index_for(rule, &old_res_cbs);
        if let Some(eq_idx) = eq_idx {
            new_res_cbs.push(old_res_cbs.remove(eq_idx));
            continue;
        }

        let generator = match gen_fun_map.get(&rule.strategy) {
            Some(generator) => generator,
            None => {
                logging::warn!("[CircuitBreaker RuleManager] Ignoring the rule due to unsupported circuit breaking strategy, rule: {:?}", rule);
                continue;
            }
        };

        let reused_stat = reuse_stat_idx.map(|idx| Arc::clone(old_res_cbs[idx].stat()));
        match generator(Arc::clone(rule), reused_stat) {
            Ok(cb) => {
                if let Some(idx) = reuse_stat_idx {
                    old_res_cbs.remove(idx);
                }
                new_res_cbs.push(cb);
            }
            Err(err) => {
                logging::warn!("[CircuitBreaker RuleManager] Ignoring the rule due to bad generated circuit breaker, rule: {:?}, error: {:?}", rule, err);
            }
        }
    }
    new_res_cbs
}
