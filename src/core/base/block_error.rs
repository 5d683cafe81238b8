use super::{BlockType, GuardRule};
use crate::{utils, Error};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The value a rule observed when it blocked, e.g. the QPS or the breaker state.
/// Recover the concrete type with `as_any().downcast_ref()`.
pub trait SnapshotTrait: Any + fmt::Debug + utils::AsAny + Send + Sync {}
impl<T: Any + fmt::Debug + utils::AsAny + Send + Sync> SnapshotTrait for T {}
pub type Snapshot = dyn SnapshotTrait;

/// BlockError is the error of a blocked invocation. `EntryBuilder::build()` returns it
/// wrapped in an `anyhow::Error`, see [`BlockError::from_error`].
#[derive(Debug, Clone, Default)]
pub struct BlockError {
    block_type: BlockType,
    block_msg: String,
    /// absent for blocks raised outside of a rule
    rule: Option<Arc<dyn GuardRule>>,
    snapshot_value: Option<Arc<Snapshot>>,
    /// filled by the slot chain
    resource: String,
}

// the rule and the snapshot are not comparable
impl PartialEq for BlockError {
    fn eq(&self, other: &BlockError) -> bool {
        self.block_type == other.block_type
            && self.block_msg == other.block_msg
            && self.resource == other.resource
    }
}

impl BlockError {
    pub fn new(block_type: BlockType) -> Self {
        BlockError {
            block_type,
            ..Default::default()
        }
    }

    pub fn new_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn GuardRule>,
        snapshot_value: Arc<Snapshot>,
    ) -> Self {
        BlockError {
            block_type,
            block_msg,
            rule: Some(rule),
            snapshot_value: Some(snapshot_value),
            resource: String::new(),
        }
    }

    /// The `BlockError` inside an error returned by `EntryBuilder::build()`,
    /// `None` if the entry failed for another reason.
    pub fn from_error(err: &Error) -> Option<&BlockError> {
        err.downcast_ref::<BlockError>()
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn block_msg(&self) -> &str {
        &self.block_msg
    }

    pub fn triggered_rule(&self) -> Option<Arc<dyn GuardRule>> {
        self.rule.clone()
    }

    pub fn triggered_value(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_value.clone()
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn set_resource(&mut self, resource: String) {
        self.resource = resource;
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocked by {}", self.resource, self.block_type)?;
        if !self.block_msg.is_empty() {
            write!(f, ": {}", self.block_msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for BlockError {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::AsAny;

    #[derive(Debug)]
    struct QuotaRule {
        resource: String,
    }

    impl GuardRule for QuotaRule {
        fn resource_name(&self) -> String {
            self.resource.clone()
        }
    }

    #[test]
    fn carries_cause() {
        let rule: Arc<dyn GuardRule> = Arc::new(QuotaRule {
            resource: "orders".into(),
        });
        let err = BlockError::new_with_cause(
            BlockType::Flow,
            "over quota".into(),
            rule.clone(),
            Arc::new(12.5f64),
        );
        assert_eq!(err.triggered_rule().unwrap().resource_name(), "orders");
        let value = err.triggered_value().unwrap();
        assert_eq!((*value).as_any().downcast_ref::<f64>(), Some(&12.5));
        assert!(BlockError::new(BlockType::Flow).triggered_rule().is_none());
    }

    #[test]
    fn equality_ignores_cause() {
        let with_cause = BlockError::new_with_cause(
            BlockType::SystemFlow,
            String::new(),
            Arc::new(QuotaRule {
                resource: "a".into(),
            }),
            Arc::new(1u64),
        );
        assert_eq!(with_cause, BlockError::new(BlockType::SystemFlow));
        assert_ne!(with_cause, BlockError::new(BlockType::Flow));
    }

    #[test]
    fn travels_in_anyhow() {
        let mut block_err = BlockError::new(BlockType::HotSpotParamFlow);
        block_err.set_resource("get_user".into());
        let err = Error::new(block_err);
        let recovered = BlockError::from_error(&err).unwrap();
        assert_eq!(recovered.block_type(), BlockType::HotSpotParamFlow);
        assert_eq!(err.to_string(), "get_user blocked by param");
        assert!(BlockError::from_error(&Error::msg("io")).is_none());

        let mut denied = BlockError::new_with_cause(
            BlockType::Authority,
            "denied".into(),
            Arc::new(QuotaRule {
                resource: "abc".into(),
            }),
            Arc::new(String::from("app-b")),
        );
        denied.set_resource("abc".into());
        assert_eq!(denied.to_string(), "abc blocked by authority: denied");
    }
}
