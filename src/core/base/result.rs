//! Decisions of the rule checking slots.

use super::{BlockError, GuardRule, Snapshot};
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type CustomBlockId = u8;

const DUPLICATE_BLOCK_TYPE_ERROR: &str = "the custom block type is already registered";

/// The kind of rule that blocked an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Unknown,
    Flow,
    HotSpotParamFlow,
    CircuitBreaking,
    SystemFlow,
    Authority,
    /// raised by a customized slot, described through `register_block_type`
    Other(CustomBlockId),
}

impl Default for BlockType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl BlockType {
    /// Short name of the kind, as shown in block errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BlockType::Unknown => "unknown",
            BlockType::Flow => "flow",
            BlockType::HotSpotParamFlow => "param",
            BlockType::CircuitBreaking => "circuit_breaking",
            BlockType::SystemFlow => "system",
            BlockType::Authority => "authority",
            BlockType::Other(_) => "other",
        }
    }
}

lazy_static! {
    static ref CUSTOM_BLOCK_TYPES: RwLock<HashMap<CustomBlockId, &'static str>> =
        RwLock::new(HashMap::new());
}

/// Names a custom block type, once per id. Built-in kinds cannot be renamed.
pub fn register_block_type(block_type: BlockType, desc: &'static str) -> Result<()> {
    let id = match block_type {
        BlockType::Other(id) => id,
        builtin => {
            return Err(Error::msg(format!(
                "{} is a built-in block type",
                builtin.kind()
            )))
        }
    };
    let mut types = CUSTOM_BLOCK_TYPES.write().unwrap();
    if types.contains_key(&id) {
        return Err(Error::msg(DUPLICATE_BLOCK_TYPE_ERROR));
    }
    types.insert(id, desc);
    Ok(())
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Other(id) => match CUSTOM_BLOCK_TYPES.read().unwrap().get(id) {
                Some(desc) => f.write_str(desc),
                None => write!(f, "other({})", id),
            },
            builtin => f.write_str(builtin.kind()),
        }
    }
}

/// TokenResult is what a rule checking slot decides for an invocation.
/// `Wait` carries the nanoseconds the invocation has to be queued for before it passes.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenResult {
    Pass,
    Blocked(BlockError),
    Wait(u64),
}

impl Default for TokenResult {
    fn default() -> Self {
        TokenResult::Pass
    }
}

impl TokenResult {
    pub fn new_pass() -> Self {
        TokenResult::Pass
    }

    pub fn new_should_wait(nanos_to_wait: u64) -> Self {
        TokenResult::Wait(nanos_to_wait)
    }

    pub fn new_blocked(block_type: BlockType) -> Self {
        TokenResult::Blocked(BlockError::new(block_type))
    }

    /// A block raised by `rule`, with the value it observed.
    pub fn new_blocked_with_cause(
        block_type: BlockType,
        block_msg: String,
        rule: Arc<dyn GuardRule>,
        snapshot_value: Arc<Snapshot>,
    ) -> Self {
        TokenResult::Blocked(BlockError::new_with_cause(
            block_type,
            block_msg,
            rule,
            snapshot_value,
        ))
    }

    pub fn reset_to_pass(&mut self) {
        *self = TokenResult::Pass;
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, TokenResult::Pass)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, TokenResult::Blocked(_))
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, TokenResult::Wait(_))
    }

    pub fn block_err(&self) -> Option<BlockError> {
        match self {
            TokenResult::Blocked(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// 0 unless the invocation has to wait.
    pub fn nanos_to_wait(&self) -> u64 {
        match self {
            TokenResult::Wait(nanos) => *nanos,
            _ => 0,
        }
    }
}

impl fmt::Display for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenResult::Pass => f.write_str("pass"),
            TokenResult::Wait(nanos) => write!(f, "wait {}ns", nanos),
            TokenResult::Blocked(err) => write!(f, "blocked, {}", err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(BlockType::HotSpotParamFlow.to_string(), "param");
        assert_eq!(BlockType::SystemFlow.to_string(), "system");
        assert_eq!(BlockType::default().kind(), "unknown");
    }

    #[test]
    fn custom_block_type() {
        register_block_type(BlockType::Other(150), "quota").unwrap();
        assert_eq!(BlockType::Other(150).to_string(), "quota");
        assert_eq!(BlockType::Other(150).kind(), "other");
        assert_eq!(BlockType::Other(151).to_string(), "other(151)");

        let err = register_block_type(BlockType::Other(150), "again").unwrap_err();
        assert_eq!(err.to_string(), DUPLICATE_BLOCK_TYPE_ERROR);
        assert_eq!(BlockType::Other(150).to_string(), "quota");
        assert!(register_block_type(BlockType::Flow, "my flow").is_err());
    }

    #[test]
    fn decisions() {
        let wait = TokenResult::new_should_wait(100);
        assert!(wait.is_wait());
        assert_eq!(wait.nanos_to_wait(), 100);
        assert!(wait.block_err().is_none());
        assert_eq!(wait.to_string(), "wait 100ns");

        let mut blocked = TokenResult::new_blocked(BlockType::Flow);
        assert!(blocked.is_blocked());
        assert_eq!(blocked.nanos_to_wait(), 0);
        assert_eq!(blocked.block_err().unwrap().block_type(), BlockType::Flow);
        blocked.reset_to_pass();
        assert_eq!(blocked, TokenResult::default());
    }
}
