use crate::{authority, circuitbreaker, flow, hotspot, logging, Result};
use std::sync::Arc;

/// RuleSupplier is the source of the active rules of a resource,
/// e.g. a configuration center or a file watcher.
/// Kinds the supplier does not manage keep the default, an empty rule set.
pub trait RuleSupplier {
    fn flow_rules(&self, _res: &str) -> Result<Vec<Arc<flow::Rule>>> {
        Ok(Vec::new())
    }

    fn circuit_breaker_rules(&self, _res: &str) -> Result<Vec<Arc<circuitbreaker::Rule>>> {
        Ok(Vec::new())
    }

    fn authority_rules(&self, _res: &str) -> Result<Vec<Arc<authority::Rule>>> {
        Ok(Vec::new())
    }

    fn hotspot_rules(&self, _res: &str) -> Result<Vec<Arc<hotspot::Rule>>> {
        Ok(Vec::new())
    }
}

/// Pulls the rules of `res` from `supplier` and replaces the loaded ones, kind by kind.
/// Nothing is loaded if the supplier fails on any kind.
/// Returns whether any kind of rules changed.
pub fn refresh_rules_of_resource<S>(supplier: &S, res: &str) -> Result<bool>
where
    S: RuleSupplier + ?Sized,
{
    let flow_rules = supplier.flow_rules(res)?;
    let breaker_rules = supplier.circuit_breaker_rules(res)?;
    let authority_rules = supplier.authority_rules(res)?;
    let hotspot_rules = supplier.hotspot_rules(res)?;

    let mut updated = flow::load_rules_of_resource(res, flow_rules)?;
    updated |= circuitbreaker::load_rules_of_resource(res, breaker_rules)?;
    updated |= authority::load_rules_of_resource(res, authority_rules)?;
    updated |= hotspot::load_rules_of_resource(res, hotspot_rules)?;
    logging::debug!(
        "[RuleSupplier] Refreshed rules of resource {}, updated: {}",
        res,
        updated
    );
    Ok(updated)
}
