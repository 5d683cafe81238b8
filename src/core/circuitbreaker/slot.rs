use super::*;
use crate::base::{BaseSlot, BlockType, EntryContext, RuleCheckSlot, TokenResult};
use lazy_static::lazy_static;
use std::sync::Arc;

const RULE_CHECK_SLOT_ORDER: u32 = 5000;
const BLOCK_MSG: &str = "circuit breaker check blocked";

/// Slot rejects the invocation once any breaker of the resource refuses it.
pub struct Slot {}

lazy_static! {
    pub static ref DEFAULT_SLOT: Arc<Slot> = Arc::new(Slot {});
}

pub fn default_slot() -> Arc<Slot> {
    DEFAULT_SLOT.clone()
}

impl BaseSlot for Slot {
    fn order(&self) -> u32 {
        RULE_CHECK_SLOT_ORDER
    }
}

impl RuleCheckSlot for Slot {
    fn check(&self, ctx: &mut EntryContext) -> TokenResult {
        let res = ctx.resource().name().clone();
        if res.is_empty() {
            return ctx.result().clone();
        }
        for breaker in get_breakers_of_resource(&res) {
            if !breaker.try_pass(ctx) {
                ctx.set_result(TokenResult::new_blocked_with_cause(
                    BlockType::CircuitBreaking,
                    BLOCK_MSG.into(),
                    breaker.bound_rule().clone(),
                    Arc::new(breaker.current_state()),
                ));
                break;
            }
        }
        ctx.result().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{ResourceType, ResourceWrapper, TrafficType};
    use crate::{utils::AsAny, Result};

    fn mock_rule(res: &str, strategy: BreakerStrategy) -> Arc<Rule> {
        Arc::new(Rule {
            resource: res.into(),
            strategy,
            retry_timeout_ms: 3000,
            min_request_amount: 10,
            stat_interval_ms: 10000,
            threshold: 0.5,
            ..Default::default()
        })
    }

    fn ctx_of(res: &str) -> EntryContext {
        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            res.into(),
            ResourceType::Common,
            TrafficType::Inbound,
        ));
        ctx
    }

    fn check_with_mock(res: &str, strategy: BreakerStrategy, pass: bool) -> EntryContext {
        set_circuit_breaker_generator(
            strategy,
            Box::new(
                move |rule: Arc<Rule>,
                      _: Option<Arc<CounterLeapArray>>|
                      -> Result<Arc<dyn CircuitBreakerTrait>> {
                    let mut breaker = MockCircuitBreaker::new();
                    breaker.expect_try_pass().return_const(pass);
                    breaker.expect_bound_rule().return_const(rule);
                    breaker.expect_current_state().return_const(State::Open);
                    Ok(Arc::new(breaker))
                },
            ),
        )
        .unwrap();
        load_rules_of_resource(res, vec![mock_rule(res, strategy)]).unwrap();
        assert_eq!(get_breakers_of_resource(res).len(), 1);

        let mut ctx = ctx_of(res);
        default_slot().check(&mut ctx);
        clear_rules_of_resource(res);
        remove_circuit_breaker_generator(&strategy).unwrap();
        ctx
    }

    #[test]
    fn check_blocked() {
        let ctx = check_with_mock("cb_slot_blocked", BreakerStrategy::Custom(101), false);
        let err = ctx.result().block_err().unwrap();
        assert_eq!(err.block_type(), BlockType::CircuitBreaking);
        assert_eq!(err.block_msg(), BLOCK_MSG);
        let state = err.triggered_value().unwrap();
        assert_eq!(
            (*state).as_any().downcast_ref::<State>(),
            Some(&State::Open)
        );
    }

    #[test]
    fn check_pass() {
        let ctx = check_with_mock("cb_slot_pass", BreakerStrategy::Custom(102), true);
        assert!(ctx.result().is_pass());
    }

    #[test]
    fn no_breakers() {
        let mut ctx = ctx_of("cb_slot_no_breakers");
        assert!(default_slot().check(&mut ctx).is_pass());
    }
}
