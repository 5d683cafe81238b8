//! Entry Context
//!
use super::{ResourceWrapper, StatNode, TokenResult};
use crate::core::context::{Context, DefaultNode};
use crate::utils::time::curr_time_millis;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Called when the entry exits, with the final state of the invocation.
pub type ExitHandler = Box<dyn Fn(&EntryContext) -> Result<()> + Send + Sync>;

/// EntryContext carries the state of one invocation through the slot chain.
#[derive(Default)]
pub struct EntryContext {
    /// id of the entry this invocation is bound to, 0 before the entry is created
    entry_id: u64,
    /// used to calculate the round trip
    start_time: u64,
    round_trip: u64,
    resource: ResourceWrapper,
    input: EntryInput,
    /// the call chain this invocation belongs to
    call_context: Option<Arc<Context>>,
    /// resource-wide node
    stat_node: Option<Arc<dyn StatNode>>,
    /// node of this position in the call tree
    default_node: Option<Arc<DefaultNode>>,
    /// node of the calling origin, absent for an empty origin
    origin_node: Option<Arc<dyn StatNode>>,
    /// the result of rule slots check
    rule_check_result: TokenResult,
    err: Option<Error>,
    exit_handlers: Vec<ExitHandler>,
}

impl EntryContext {
    pub fn new() -> Self {
        EntryContext {
            start_time: curr_time_millis(),
            ..Default::default()
        }
    }

    pub fn set_entry_id(&mut self, entry_id: u64) {
        self.entry_id = entry_id;
    }

    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn is_blocked(&self) -> bool {
        self.rule_check_result.is_blocked()
    }

    pub fn set_round_trip(&mut self, round_trip: u64) {
        self.round_trip = round_trip
    }

    pub fn round_trip(&self) -> u64 {
        self.round_trip
    }

    pub fn set_resource(&mut self, resource: ResourceWrapper) {
        self.resource = resource;
    }

    pub fn resource(&self) -> &ResourceWrapper {
        &self.resource
    }

    pub fn set_input(&mut self, input: EntryInput) {
        self.input = input;
    }

    pub fn input(&self) -> &EntryInput {
        &self.input
    }

    pub fn set_call_context(&mut self, call_context: Arc<Context>) {
        self.call_context = Some(call_context);
    }

    pub fn call_context(&self) -> Option<&Arc<Context>> {
        self.call_context.as_ref()
    }

    /// Name of the call chain, empty when running outside of a context.
    pub fn context_name(&self) -> &str {
        self.call_context.as_ref().map_or("", |c| c.name())
    }

    pub fn origin(&self) -> &str {
        self.call_context.as_ref().map_or("", |c| c.origin())
    }

    pub fn set_stat_node(&mut self, stat_node: Arc<dyn StatNode>) {
        self.stat_node = Some(stat_node);
    }

    pub fn stat_node(&self) -> Option<Arc<dyn StatNode>> {
        self.stat_node.clone()
    }

    pub fn set_default_node(&mut self, node: Arc<DefaultNode>) {
        self.default_node = Some(node);
    }

    pub fn default_node(&self) -> Option<Arc<DefaultNode>> {
        self.default_node.clone()
    }

    pub fn set_origin_node(&mut self, node: Arc<dyn StatNode>) {
        self.origin_node = Some(node);
    }

    pub fn origin_node(&self) -> Option<Arc<dyn StatNode>> {
        self.origin_node.clone()
    }

    pub fn set_result(&mut self, result: TokenResult) {
        self.rule_check_result = result;
    }

    pub fn reset_result_to_pass(&mut self) {
        self.rule_check_result.reset_to_pass();
    }

    pub fn result(&self) -> &TokenResult {
        &self.rule_check_result
    }

    pub fn set_err(&mut self, err: Error) {
        self.err = Some(err);
    }

    pub fn get_err(&self) -> &Option<Error> {
        &self.err
    }

    /// Registers a handler invoked once when the entry exits,
    /// whether the entry passed or was blocked by a later slot.
    pub fn when_exit(&mut self, handler: ExitHandler) {
        self.exit_handlers.push(handler);
    }

    pub(crate) fn take_exit_handlers(&mut self) -> Vec<ExitHandler> {
        std::mem::take(&mut self.exit_handlers)
    }
}

/// A parameter value checked by the hot-spot parameter rules.
pub type ParamKey = String;
pub type ParamsList = Vec<ParamKey>;
pub type ParamsMap = HashMap<String, ParamKey>;

/// Input of the rule checking algorithms
#[derive(Debug, Clone)]
pub struct EntryInput {
    batch_count: u32,
    flag: i32,
    /// positional arguments of the invocation
    args: Option<ParamsList>,
    /// named arguments of the invocation
    attachments: Option<ParamsMap>,
}

impl Default for EntryInput {
    fn default() -> Self {
        EntryInput {
            batch_count: 1,
            flag: 0,
            args: None,
            attachments: None,
        }
    }
}

impl EntryInput {
    pub fn new(batch_count: u32, flag: i32) -> Self {
        EntryInput {
            batch_count,
            flag,
            ..Default::default()
        }
    }

    pub fn set_batch_count(&mut self, batch_count: u32) {
        self.batch_count = batch_count;
    }

    pub fn batch_count(&self) -> u32 {
        self.batch_count
    }

    pub fn set_flag(&mut self, flag: i32) {
        self.flag = flag;
    }

    pub fn flag(&self) -> i32 {
        self.flag
    }

    pub fn set_args(&mut self, args: ParamsList) {
        self.args = Some(args);
    }

    pub fn args(&self) -> Option<&ParamsList> {
        self.args.as_ref()
    }

    pub fn set_attachments(&mut self, attachments: ParamsMap) {
        self.attachments = Some(attachments);
    }

    pub fn attachments(&self) -> Option<&ParamsMap> {
        self.attachments.as_ref()
    }
}
