use flowguard::base::{ConcurrencyStat, MetricEvent, ReadStat};
use flowguard::config::ConfigEntity;
use flowguard::{context, flow, stat, EntryBuilder};
use std::sync::Arc;

#[test]
fn overflow_degrades_to_null_context() {
    let mut entity = ConfigEntity::new();
    entity.config.context.max_context_name_amount = 3;
    flowguard::init_with_config(entity).unwrap();

    let contexts: Vec<_> = (0..5)
        .map(|i| context::new_context(&format!("it_cap_{}", i), ""))
        .collect();
    let registered = contexts.iter().filter(|c| !c.is_null()).count();
    assert_eq!(registered, 3);
    assert!(contexts[4].is_null());
    // known names are still served
    assert!(!context::new_context("it_cap_0", "").is_null());

    let res = "it_cap_res";
    flow::load_rules_of_resource(
        res,
        vec![Arc::new(flow::Rule {
            resource: res.into(),
            threshold: 1.0,
            ..Default::default()
        })],
    )
    .unwrap();
    let null_ctx = contexts[4].clone();
    let entry = EntryBuilder::new(res.into())
        .with_context(null_ctx.clone())
        .build()
        .unwrap();
    assert_eq!(null_ctx.depth(), 1);
    entry.exit().unwrap();
    assert_eq!(null_ctx.depth(), 0);
    // nothing recorded, the rule did not apply either
    let entry = EntryBuilder::new(res.into())
        .with_context(null_ctx.clone())
        .build()
        .unwrap();
    entry.exit().unwrap();
    let node = stat::get_or_create_resource_node(res, flowguard::base::ResourceType::Common);
    assert_eq!(node.sum(MetricEvent::Pass), 0);
    assert_eq!(node.sum(MetricEvent::Block), 0);
    assert_eq!(node.sum(MetricEvent::Complete), 0);
    assert_eq!(node.current_concurrency(), 0);

    // the default context cannot be registered either
    let entry = EntryBuilder::new(res.into()).build().unwrap();
    assert!(context::current().unwrap().is_null());
    entry.exit().unwrap();
}
