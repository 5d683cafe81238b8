use super::*;
use crate::{
    core::{
        base,
        base::{nop_read_stat, nop_write_stat, GuardRule, StatNode},
        config, stat,
        stat::ResourceNode,
    },
    logging, utils, Error, Result,
};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// ControllerGenfn represents the Traffic Controller generator function of a specific control behavior.
/// The second argument is a statistic that may be reused, taken from an old controller.
pub type ControllerGenfn =
    dyn Send + Sync + Fn(Arc<Rule>, Option<Arc<StandaloneStat>>) -> Result<Arc<Controller>>;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ControllerGenKey {
    calculate_strategy: CalculateStrategy,
    control_strategy: ControlStrategy,
}

impl ControllerGenKey {
    pub fn new(calculate_strategy: CalculateStrategy, control_strategy: ControlStrategy) -> Self {
        ControllerGenKey {
            calculate_strategy,
            control_strategy,
        }
    }
}

/// ControllerMap represents the map storage for Controller.
pub type ControllerMap = HashMap<String, Vec<Arc<Controller>>>;
pub type RuleMap = HashMap<String, HashSet<Arc<Rule>>>;

macro_rules! insert_flow_generator {
    ($map:expr, $calculate_strategy:expr, $control_strategy:expr, $calculator:ident, $checker:ident) => {
        $map.insert(
            ControllerGenKey::new($calculate_strategy, $control_strategy),
            Box::new(
                |rule: Arc<Rule>, stat: Option<Arc<StandaloneStat>>| -> Result<Arc<Controller>> {
                    let stat = match stat {
                        None => generate_stat_for(&rule)?,
                        Some(stat) => stat,
                    };
                    let calculator = Arc::new($calculator::new(&rule));
                    let checker = Arc::new($checker::new(&rule));
                    Ok(Arc::new(Controller::new(rule, stat, calculator, checker)))
                },
            ),
        );
    };
}

lazy_static! {
    static ref GEN_FUN_MAP: RwLock<HashMap<ControllerGenKey, Box<ControllerGenfn>>> = {
        let mut gen_fun_map: HashMap<ControllerGenKey, Box<ControllerGenfn>> = HashMap::new();
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::Direct,
            ControlStrategy::Reject,
            DirectCalculator,
            RejectChecker
        );
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::Direct,
            ControlStrategy::Throttling,
            DirectCalculator,
            ThrottlingChecker
        );
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::WarmUp,
            ControlStrategy::Reject,
            WarmUpCalculator,
            RejectChecker
        );
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::WarmUp,
            ControlStrategy::Throttling,
            WarmUpCalculator,
            ThrottlingChecker
        );
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::Adaptive,
            ControlStrategy::Reject,
            AdaptiveCalculator,
            RejectChecker
        );
        insert_flow_generator!(
            gen_fun_map,
            CalculateStrategy::Adaptive,
            ControlStrategy::Throttling,
            AdaptiveCalculator,
            ThrottlingChecker
        );
        RwLock::new(gen_fun_map)
    };
    /// published snapshot, read on every check
    static ref CONTROLLER_MAP: RwLock<Arc<ControllerMap>> = RwLock::new(Arc::new(HashMap::new()));
    /// the loaded rules, the lock also serializes the writers
    static ref RULE_MAP: Mutex<RuleMap> = Mutex::new(HashMap::new());
    static ref NOP_STAT: Arc<StandaloneStat> = Arc::new(StandaloneStat::new(
        false,
        nop_read_stat(),
        Some(nop_write_stat())
    ));
}

fn controller_snapshot() -> Arc<ControllerMap> {
    CONTROLLER_MAP.read().unwrap().clone()
}

fn publish(controller_map: ControllerMap) {
    *CONTROLLER_MAP.write().unwrap() = Arc::new(controller_map);
}

fn log_rule_update(map: &RuleMap) {
    if map.is_empty() {
        logging::info!("[FlowRuleManager] Flow rules were cleared")
    } else {
        logging::info!(
            "[FlowRuleManager] Flow rules were loaded: {:?}",
            map.values()
        )
    }
}

fn valid_rules_of(rules: &HashSet<Arc<Rule>>) -> HashSet<Arc<Rule>> {
    rules
        .iter()
        .filter(|rule| match rule.is_valid() {
            Ok(_) => true,
            Err(err) => {
                logging::warn!(
                    "[FlowRuleManager] Ignoring invalid flow rule {:?}, reason: {:?}",
                    rule,
                    err
                );
                false
            }
        })
        .cloned()
        .collect()
}

/// `load_rules` loads the given flow rules to the rule manager, while all previous rules will be replaced.
/// The returned `bool` indicates whether do real load operation, if the rules is the same with previous rules, return false
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
        logging::info!(
            "[FlowRuleManager] Load rules is the same with current rules, so ignore load operation."
        );
        return false;
    }

    let start = utils::curr_time_nanos();
    let old_controller_map = controller_snapshot();
    let mut valid_rules_map = HashMap::with_capacity(rule_map.len());
    let mut controller_map = HashMap::with_capacity(rule_map.len());
    for (res, rules) in &rule_map {
        let valid_rules = valid_rules_of(rules);
        if valid_rules.is_empty() {
            continue;
        }
        let old_tcs = old_controller_map.get(res).cloned().unwrap_or_default();
        let tcs = build_resource_traffic_shaping_controller(res, &valid_rules, old_tcs);
        if !tcs.is_empty() {
            controller_map.insert(res.clone(), tcs);
        }
        valid_rules_map.insert(res.clone(), valid_rules);
    }
    publish(controller_map);
    *global_rule_map = rule_map;
    drop(global_rule_map);

    logging::debug!(
        "[FlowRuleManager] Time statistic(ns) for updating flow rule, time cost {}",
        utils::curr_time_nanos() - start
    );
    log_rule_update(&valid_rules_map);
    true
}

/// `load_rules_of_resource` loads the given resource's flow rules to the rule manager, while all previous resource's rules will be replaced.
/// The returned value indicates whether do real load operation, if the rules is the same with previous resource's rules, return false
pub fn load_rules_of_resource(res: &str, rules: Vec<Arc<Rule>>) -> Result<bool> {
    if res.is_empty() {
        return Err(Error::msg("empty resource"));
    }
    let rules: HashSet<_> = rules.into_iter().collect();
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    let old_controller_map = controller_snapshot();

    if rules.is_empty() {
        if global_rule_map.remove(res).is_none() {
            return Ok(false);
        }
        let mut controller_map = (*old_controller_map).clone();
        controller_map.remove(res);
        publish(controller_map);
        logging::info!("[FlowRuleManager] clear resource level rules, resource {}", res);
        return Ok(true);
    }
    if global_rule_map.get(res) == Some(&rules) {
        logging::info!("[FlowRuleManager] Load resource level rules is the same with current resource level rules, so ignore load operation.");
        return Ok(false);
    }

    let start = utils::curr_time_nanos();
    let valid_res_rules = valid_rules_of(&rules);
    let old_tcs = old_controller_map.get(res).cloned().unwrap_or_default();
    let new_tcs = build_resource_traffic_shaping_controller(res, &valid_res_rules, old_tcs);

    let mut controller_map = (*old_controller_map).clone();
    if new_tcs.is_empty() {
        controller_map.remove(res);
    } else {
        controller_map.insert(res.to_owned(), new_tcs);
    }
    publish(controller_map);
    global_rule_map.insert(res.to_owned(), rules);

    logging::debug!(
        "[FlowRuleManager] Time statistic(ns) for updating flow rule, time cost: {}",
        utils::curr_time_nanos() - start
    );
    logging::info!(
        "[FlowRuleManager] load resource level rules, resource: {}, valid rules: {:?}",
        res,
        valid_res_rules
    );
    Ok(true)
}

/// `get_rules` returns all the rules in effect
pub fn get_rules() -> Vec<Arc<Rule>> {
    controller_snapshot()
        .values()
        .flat_map(|tcs| tcs.iter().map(|tc| Arc::clone(tc.rule())))
        .collect()
}

/// `get_rules_of_resource` returns the rules of `res` in effect
pub fn get_rules_of_resource(res: &str) -> Vec<Arc<Rule>> {
    get_traffic_controller_list_for(res)
        .iter()
        .map(|tc| Arc::clone(tc.rule()))
        .collect()
}

/// clear_rules clears all the rules in flow module.
pub fn clear_rules() {
    let mut global_rule_map = RULE_MAP.lock().unwrap();
    global_rule_map.clear();
    publish(HashMap::new());
}

/// `clear_rules_of_resource` clears resource level rules in flow module.
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

/// `generate_stat_for` generates a `StandaloneStat` according to the rule,
/// it may generate a cloned pointer to the global `NOP_STAT`,
/// a view over the global statistic of the resource
/// or a new statistic with its own buckets.
fn generate_stat_for(rule: &Arc<Rule>) -> Result<Arc<StandaloneStat>> {
    if !rule.need_statistic() || rule.relation_strategy == RelationStrategy::Chain {
        // chain rules read the call tree node of the context at check time
        return Ok(NOP_STAT.clone());
    }

    let interval_ms = rule.stat_interval_ms;

    let res_node: Arc<ResourceNode> = {
        if rule.relation_strategy == RelationStrategy::Associated {
            stat::get_or_create_resource_node(&rule.ref_resource, base::ResourceType::Common)
        } else {
            stat::get_or_create_resource_node(&rule.resource, base::ResourceType::Common)
        }
    };

    if interval_ms == 0 || interval_ms == config::metric_stat_interval_ms() {
        let metric = res_node.default_metric();
        return Ok(Arc::new(StandaloneStat::new(true, metric, None)));
    }

    let mut sample_count: u32 = 1;
    if interval_ms > config::global_stat_bucket_length_ms()
        && interval_ms < config::global_stat_interval_ms_total()
        && interval_ms % config::global_stat_bucket_length_ms() == 0
    {
        sample_count = interval_ms / config::global_stat_bucket_length_ms();
    }

    match base::check_validity_for_reuse_statistic(
        sample_count,
        interval_ms,
        config::global_stat_sample_count_total(),
        config::global_stat_interval_ms_total(),
    ) {
        Ok(_) => {
            let metric = res_node.generate_read_stat(sample_count, interval_ms)?;
            Ok(Arc::new(StandaloneStat::new(true, metric, None)))
        }
        Err(_) => {
            logging::info!("[FlowRuleManager] Flow rule couldn't reuse global statistic and will generate independent statistic, rule: {:?}", rule);
            let write_stat = Arc::new(stat::BucketLeapArray::new(sample_count, interval_ms)?);
            let read_stat = Arc::new(stat::SlidingWindowMetric::new(
                sample_count,
                interval_ms,
                write_stat.clone(),
            )?);
            Ok(Arc::new(StandaloneStat::new(
                false,
                read_stat,
                Some(write_stat),
            )))
        }
    }
}

/// `set_traffic_shaping_generator` sets the traffic controller generator for the given CalculateStrategy and ControlStrategy.
/// Note that modifying the generator of default control strategy is not allowed.
pub fn set_traffic_shaping_generator(
    calculate_strategy: CalculateStrategy,
    control_strategy: ControlStrategy,
    generator: Box<ControllerGenfn>,
) -> Result<()> {
    match (calculate_strategy, control_strategy) {
        (CalculateStrategy::Custom(_), _) | (_, ControlStrategy::Custom(_)) => {
            GEN_FUN_MAP.write().unwrap().insert(
                ControllerGenKey::new(calculate_strategy, control_strategy),
                generator,
            );
            Ok(())
        }
        _ => Err(Error::msg(
            "Default control behaviors are not allowed to be modified.",
        )),
    }
}

pub fn remove_traffic_shaping_generator(
    calculate_strategy: CalculateStrategy,
    control_strategy: ControlStrategy,
) -> Result<()> {
    match (calculate_strategy, control_strategy) {
        (CalculateStrategy::Custom(_), _) | (_, ControlStrategy::Custom(_)) => {
            GEN_FUN_MAP
                .write()
                .unwrap()
                .remove(&ControllerGenKey::new(calculate_strategy, control_strategy));
            Ok(())
        }
        _ => Err(Error::msg(
            "Default control behaviors are not allowed to be removed.",
        )),
    }
}

/// Returns the index of the old controller of an equal rule,
/// and the index of the first old controller whose statistic the rule can reuse.
fn calculate_reuse_index_for(
    r: &Arc<Rule>,
    old_res_tcs: &[Arc<Controller>],
) -> (Option<usize>, Option<usize>) {
    let mut reuse_stat_idx = None;
    for (idx, old_tc) in old_res_tcs.iter().enumerate() {
        let old_rule = old_tc.rule();
        if old_rule == r {
            return (Some(idx), reuse_stat_idx);
        }
        if reuse_stat_idx.is_none() && old_rule.is_stat_reusable(r) {
            reuse_stat_idx = Some(idx);
        }
    }
    (None, reuse_stat_idx)
}

/// build_resource_traffic_shaping_controller builds the controllers of `res` from its rules.
/// The controller of an equal rule is kept as is, statistics are reused where possible.
pub fn build_resource_traffic_shaping_controller(
    res: &str,
    rules_of_res: &HashSet<Arc<Rule>>,
    mut old_res_tcs: Vec<Arc<Controller>>,
) -> Vec<Arc<Controller>> {
    let mut new_res_tcs = Vec::with_capacity(rules_of_res.len());
    let gen_fun_map = GEN_FUN_MAP.read().unwrap();
    for rule in rules_of_res {
        if res != rule.resource {
            logging::error!("[FlowRuleManager] unmatched resource name expect: {}, actual: {}, rule: {:?}", res, rule.resource, rule);
            continue;
        }
        let (eq_idx, reuse_stat_idx) = calculate_reuse_index_for(rule, &old_res_tcs);

        if let Some(eq_idx) = eq_idx {
            new_res_tcs.push(old_res_tcs.remove(eq_idx));
            continue;
        }

        let key = ControllerGenKey::new(rule.calculate_strategy, rule.control_strategy);
        let generator = match gen_fun_map.get(&key) {
            Some(generator) => generator,
            None => {
                logging::error!("[FlowRuleManager] Ignoring the rule due to unsupported control behavior, rule: {}", rule);
                continue;
            }
        };

        let reused_stat = reuse_stat_idx.map(|idx| Arc::clone(old_res_tcs[idx].stat()));
        match generator(Arc::clone(rule), reused_stat) {
            Ok(tc) => {
                if let Some(idx) = reuse_stat_idx {
                    old_res_tcs.remove(idx);
                }
                new_res_tcs.push(tc);
            }
            Err(err) => {
                logging::error!("[FlowRuleManager] Ignoring the rule due to bad generated traffic controller, rule: {:?}, error: {:?}", rule, err);
            }
        }
    }
    new_res_tcs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    #[should_panic(expected = "Default control behaviors are not allowed to be modified.")]
    fn illegal_set() {
        set_traffic_shaping_generator(
            CalculateStrategy::Direct,
            ControlStrategy::Reject,
            Box::new(|rule: Arc<Rule>, _: Option<Arc<StandaloneStat>>| {
                let stat = generate_stat_for(&rule)?;
                Ok(Arc::new(Controller::new(
                    rule.clone(),
                    stat,
                    Arc::new(DirectCalculator::new(&rule)),
                    Arc::new(RejectChecker::new(&rule)),
                )))
            }),
        )
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "Default control behaviors are not allowed to be removed.")]
    fn illegal_remove() {
        remove_traffic_shaping_generator(CalculateStrategy::Direct, ControlStrategy::Reject)
            .unwrap();
    }

    #[test]
    fn set_and_remove_generator() {
        const STRATEGY: u8 = 1;
        set_traffic_shaping_generator(
            CalculateStrategy::Custom(STRATEGY),
            ControlStrategy::Custom(STRATEGY),
            Box::new(|rule: Arc<Rule>, _: Option<Arc<StandaloneStat>>| {
                Ok(Arc::new(Controller::new(
                    rule.clone(),
                    NOP_STAT.clone(),
                    Arc::new(DirectCalculator::new(&rule)),
                    Arc::new(RejectChecker::new(&rule)),
                )))
            }),
        )
        .unwrap();
        let resource = "flow_manager_customized_tc";
        load_rules_of_resource(
            resource,
            vec![Arc::new(Rule {
                threshold: 20.0,
                resource: resource.into(),
                calculate_strategy: CalculateStrategy::Custom(STRATEGY),
                control_strategy: ControlStrategy::Custom(STRATEGY),
                ..Default::default()
            })],
        )
        .unwrap();
        let key = ControllerGenKey::new(
            CalculateStrategy::Custom(STRATEGY),
            ControlStrategy::Custom(STRATEGY),
        );
        assert!(GEN_FUN_MAP.read().unwrap().contains_key(&key));
        assert_eq!(get_traffic_controller_list_for(resource).len(), 1);

        remove_traffic_shaping_generator(
            CalculateStrategy::Custom(STRATEGY),
            ControlStrategy::Custom(STRATEGY),
        )
        .unwrap();
        assert!(!GEN_FUN_MAP.read().unwrap().contains_key(&key));
        clear_rules_of_resource(resource);
    }

    #[test]
    fn generate_stat_for_default_metric_stat() {
        let r1 = Arc::new(Rule {
            resource: "flow_manager_default_stat".into(),
            threshold: 100.0,
            ..Default::default()
        });
        let bound_stat = generate_stat_for(&r1).unwrap();
        assert!(bound_stat.reuse_global());

        let res_node = stat::get_resource_node("flow_manager_default_stat").unwrap();
        assert_eq!(
            Arc::as_ptr(bound_stat.read_only_metric()) as *const (),
            Arc::as_ptr(&res_node.default_metric()) as *const ()
        );
    }

    #[test]
    fn generate_stat_for_reuse_global_stat() {
        let r1 = Arc::new(Rule {
            resource: "flow_manager_reuse_stat".into(),
            stat_interval_ms: 5000,
            threshold: 100.0,
            ..Default::default()
        });
        let bound_stat = generate_stat_for(&r1).unwrap();
        assert!(bound_stat.reuse_global());
        assert!(bound_stat.write_only_metric().is_none());
    }

    #[test]
    fn generate_stat_for_standalone_stat() {
        let r1 = Arc::new(Rule {
            resource: "flow_manager_standalone_stat".into(),
            stat_interval_ms: 50000,
            threshold: 100.0,
            ..Default::default()
        });
        let stat = generate_stat_for(&r1).unwrap();
        assert!(!stat.reuse_global());
        assert!(stat.write_only_metric().is_some());
    }

    #[test]
    fn generate_stat_for_nop() {
        let throttling = Arc::new(Rule {
            resource: "flow_manager_nop_stat".into(),
            control_strategy: ControlStrategy::Throttling,
            threshold: 100.0,
            ..Default::default()
        });
        assert!(Arc::ptr_eq(&generate_stat_for(&throttling).unwrap(), &NOP_STAT));
        let chain = Arc::new(Rule {
            resource: "flow_manager_nop_stat".into(),
            relation_strategy: RelationStrategy::Chain,
            ref_resource: "some_context".into(),
            threshold: 100.0,
            ..Default::default()
        });
        assert!(Arc::ptr_eq(&generate_stat_for(&chain).unwrap(), &NOP_STAT));
    }

    #[test]
    fn build_controller_reuses() {
        let res = "flow_manager_build";
        let r1 = Arc::new(Rule {
            resource: res.into(),
            threshold: 100.0,
            stat_interval_ms: 50000,
            ..Default::default()
        });
        let r2 = Arc::new(Rule {
            resource: res.into(),
            threshold: 200.0,
            control_strategy: ControlStrategy::Throttling,
            max_queueing_time_ms: 10,
            ..Default::default()
        });
        let rules: HashSet<_> = vec![r1.clone(), r2.clone()].into_iter().collect();
        let old = build_resource_traffic_shaping_controller(res, &rules, Vec::new());
        assert_eq!(old.len(), 2);
        let old_r1 = old.iter().find(|tc| tc.rule() == &r1).cloned().unwrap();

        // an equal rule keeps its controller
        let r1_copy = Arc::new(Rule {
            id: "another".into(),
            ..(*r1).clone()
        });
        // a new threshold over the same window reuses the statistic
        let r3 = Arc::new(Rule {
            threshold: 300.0,
            ..(*r1).clone()
        });
        let rules: HashSet<_> = vec![r1_copy].into_iter().collect();
        let tcs = build_resource_traffic_shaping_controller(res, &rules, old.clone());
        assert!(Arc::ptr_eq(&tcs[0], &old_r1));

        let rules: HashSet<_> = vec![r3].into_iter().collect();
        let tcs = build_resource_traffic_shaping_controller(res, &rules, old);
        assert!(!Arc::ptr_eq(&tcs[0], &old_r1));
        assert!(Arc::ptr_eq(tcs[0].stat(), old_r1.stat()));
    }

    #[test]
    fn load_and_clear_of_resource() {
        let res = "flow_manager_load_of_resource";
        let r1 = Arc::new(Rule {
            resource: res.into(),
            threshold: 10.0,
            ..Default::default()
        });
        let r2 = Arc::new(Rule {
            resource: res.into(),
            threshold: 20.0,
            ..Default::default()
        });
        let invalid = Arc::new(Rule {
            resource: res.into(),
            threshold: -1.0,
            ..Default::default()
        });

        assert!(load_rules_of_resource("", vec![r1.clone()]).is_err());
        assert!(load_rules_of_resource(res, vec![r1.clone(), r2.clone(), invalid]).unwrap());
        assert_eq!(get_rules_of_resource(res).len(), 2);
        let tcs = get_traffic_controller_list_for(res);

        // reloading equal rules is a no-op
        let r1_copy = Arc::new(Rule {
            id: "another".into(),
            ..(*r1).clone()
        });
        let r2_copy = Arc::new(Rule {
            id: "yet another".into(),
            ..(*r2).clone()
        });
        let invalid_copy = Arc::new(Rule {
            resource: res.into(),
            threshold: -1.0,
            ..Default::default()
        });
        assert!(!load_rules_of_resource(res, vec![r1_copy, r2_copy, invalid_copy]).unwrap());
        let reloaded = get_traffic_controller_list_for(res);
        assert!(tcs.iter().zip(reloaded.iter()).all(|(a, b)| Arc::ptr_eq(a, b)));

        assert!(get_rules().len() >= 2);
        clear_rules_of_resource(res);
        assert!(get_rules_of_resource(res).is_empty());

        assert!(load_rules_of_resource(res, vec![r1]).unwrap());
        assert!(load_rules_of_resource(res, vec![]).unwrap());
        assert!(get_traffic_controller_list_for(res).is_empty());
    }
}
