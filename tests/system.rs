use flowguard::base::{BlockError, BlockType, EntryStrongPtr, TrafficType};
use flowguard::utils::AsAny;
use flowguard::{system, EntryBuilder, Result};
use std::sync::Arc;

fn entry_of(res: &str, traffic_type: TrafficType) -> Result<EntryStrongPtr> {
    EntryBuilder::new(res.into())
        .with_traffic_type(traffic_type)
        .build()
}

// system rules guard the whole process, so the scenario stays in a single test
#[test]
fn inbound_concurrency() {
    assert!(system::load_rules(vec![Arc::new(system::Rule {
        metric_type: system::MetricType::Concurrency,
        threshold: 1.0,
        ..Default::default()
    })]));

    let held = entry_of("it_system_first", TrafficType::Inbound).unwrap();
    let err = entry_of("it_system_second", TrafficType::Inbound).unwrap_err();
    let block_err = BlockError::from_error(&err).unwrap();
    assert_eq!(block_err.block_type(), BlockType::SystemFlow);
    let value = block_err.triggered_value().unwrap();
    assert_eq!((*value).as_any().downcast_ref::<f64>(), Some(&1.0));

    // outbound traffic is never shed
    entry_of("it_system_outbound", TrafficType::Outbound)
        .unwrap()
        .exit()
        .unwrap();

    held.exit().unwrap();
    entry_of("it_system_second", TrafficType::Inbound)
        .unwrap()
        .exit()
        .unwrap();

    system::clear_rules();
    assert!(system::get_rules().is_empty());
}
