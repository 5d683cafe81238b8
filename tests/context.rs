use flowguard::base::{
    ConcurrencyStat, MetricEvent, ReadStat, TrafficType, DOUBLE_EXIT_ERROR,
    OUT_OF_ORDER_EXIT_ERROR,
};
use flowguard::context::{self, TreeNode};
use flowguard::{stat, EntryBuilder};
use std::sync::Arc;

fn names_of(node: &dyn TreeNode) -> Vec<String> {
    node.children()
        .iter()
        .map(|c| c.resource().name().clone())
        .collect()
}

#[test]
fn call_tree() {
    let ctx = context::enter("it_ctx_tree", "app-a");
    let outer = EntryBuilder::new("it_ctx_tree_outer".into())
        .with_traffic_type(TrafficType::Inbound)
        .build()
        .unwrap();
    let inner = EntryBuilder::new("it_ctx_tree_inner".into()).build().unwrap();
    assert_eq!(ctx.depth(), 2);
    assert_eq!(ctx.current_entry(), Some(inner.id()));
    inner.exit().unwrap();
    assert_eq!(ctx.current_entry(), Some(outer.id()));
    outer.exit().unwrap();
    // released with the last entry
    assert!(context::current().is_none());

    let entrance = context::entrance_node("it_ctx_tree").unwrap();
    assert_eq!(names_of(&*entrance), vec!["it_ctx_tree_outer"]);
    let outer_node = entrance.children()[0].clone();
    assert_eq!(names_of(&*outer_node), vec!["it_ctx_tree_inner"]);
    assert_eq!(outer_node.sum(MetricEvent::Pass), 1);
    assert_eq!(entrance.sum(MetricEvent::Complete), 1);
    assert_eq!(entrance.total_concurrency(), 0);

    let origin_node = stat::get_resource_node("it_ctx_tree_outer")
        .unwrap()
        .origin_node("app-a")
        .unwrap();
    assert_eq!(origin_node.sum(MetricEvent::Pass), 1);
}

#[test]
fn exit_errors() {
    let ctx = context::enter("it_ctx_exit_errors", "");
    let outer = EntryBuilder::new("it_ctx_exit_outer".into()).build().unwrap();
    let inner = EntryBuilder::new("it_ctx_exit_inner".into()).build().unwrap();

    let err = outer.exit().unwrap_err();
    assert_eq!(err.to_string(), OUT_OF_ORDER_EXIT_ERROR);
    // completed anyway
    let node = stat::get_resource_node("it_ctx_exit_outer").unwrap();
    assert_eq!(node.current_concurrency(), 0);
    assert_eq!(ctx.depth(), 1);

    inner.exit().unwrap();
    assert_eq!(inner.exit().unwrap_err().to_string(), DOUBLE_EXIT_ERROR);
    assert!(context::current().is_none());
}

#[test]
fn run_on_other_context() {
    let main = context::enter("it_ctx_run_main", "");
    let other = context::new_context("it_ctx_run_other", "");
    let entry = context::run_on_context(other.clone(), || {
        EntryBuilder::new("it_ctx_run_res".into()).build().unwrap()
    });
    assert!(Arc::ptr_eq(&context::current().unwrap(), &main));
    assert_eq!(other.depth(), 1);
    assert_eq!(main.depth(), 0);
    entry.exit().unwrap();
    assert_eq!(other.depth(), 0);
    context::exit();
    assert!(context::current().is_none());
}

#[tokio::test]
async fn async_context() {
    let ctx = context::enter("it_ctx_async", "");
    let parent = EntryBuilder::new("it_ctx_async_parent".into())
        .build()
        .unwrap();
    let forked = ctx.new_async_context();
    assert!(forked.is_async());

    let task = tokio::spawn(async move {
        let entry = EntryBuilder::new("it_ctx_async_task".into())
            .with_context(forked.clone())
            .build()
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        entry.exit().unwrap();
        forked.depth()
    });
    assert_eq!(task.await.unwrap(), 0);
    // the stack of the source is untouched
    assert_eq!(ctx.depth(), 1);
    assert_eq!(ctx.current_entry(), Some(parent.id()));
    parent.exit().unwrap();

    let entrance = context::entrance_node("it_ctx_async").unwrap();
    let parent_node = entrance.children()[0].clone();
    assert_eq!(names_of(&*parent_node), vec!["it_ctx_async_task"]);
}
