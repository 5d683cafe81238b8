use super::slot_chain_of;
use crate::base::{
    next_entry_id, EntryContext, EntryInput, EntryStrongPtr, ParamsList, ParamsMap, ResourceEntry,
    ResourceType, ResourceWrapper, SlotChain, TokenResult, TrafficType, DEFAULT_CONTEXT_NAME,
};
use crate::core::context::{self, Context};
use crate::{logging, Error, Result};
use std::sync::Arc;

/// EntryBuilder is the basic API of flowguard.
/// `build()` guards one invocation of the resource, a blocked invocation is returned as an `Err`
/// wrapping a [`BlockError`](crate::base::BlockError).
pub struct EntryBuilder {
    resource_name: String,
    resource_type: ResourceType,
    traffic_type: TrafficType,
    batch_count: u32,
    flag: i32,
    args: Option<ParamsList>,
    attachments: Option<ParamsMap>,
    slot_chain: Option<Arc<SlotChain>>,
    /// explicit call chain, the one of the current thread when absent
    context: Option<Arc<Context>>,
}

impl EntryBuilder {
    pub fn new(resource_name: String) -> Self {
        EntryBuilder {
            resource_name,
            resource_type: ResourceType::default(),
            traffic_type: TrafficType::default(),
            batch_count: 1,
            flag: 0,
            args: None,
            attachments: None,
            slot_chain: None,
            context: None,
        }
    }

    /// `build()` consumes the EntryBuilder.
    pub fn build(self) -> Result<EntryStrongPtr> {
        let call = match self.context {
            Some(call) => call,
            None => context::enter(DEFAULT_CONTEXT_NAME, ""),
        };
        let sc = match self.slot_chain {
            Some(sc) => sc,
            None => slot_chain_of(&self.resource_name),
        };

        let mut ctx = EntryContext::new();
        ctx.set_resource(ResourceWrapper::new(
            self.resource_name,
            self.resource_type,
            self.traffic_type,
        ));
        let mut input = EntryInput::new(self.batch_count, self.flag);
        if let Some(args) = self.args {
            input.set_args(args);
        }
        if let Some(attachments) = self.attachments {
            input.set_attachments(attachments);
        }
        ctx.set_input(input);
        ctx.set_call_context(call.clone());
        let id = next_entry_id();
        ctx.set_entry_id(id);

        if call.is_null() {
            // neither checked nor counted
            call.push_entry(id, None);
            return Ok(Arc::new(ResourceEntry::new(id, ctx, None, call)));
        }

        // the prepare slot links the node under the current one, so the entry is pushed after
        let r = sc.entry(&mut ctx);
        call.push_entry(id, ctx.default_node());
        let entry = Arc::new(ResourceEntry::new(id, ctx, Some(sc), call));
        match r {
            TokenResult::Blocked(block_err) => {
                // runs the exit handlers of the slots that passed and pops the entry
                if let Err(err) = entry.exit() {
                    logging::error!(
                        "[EntryBuilder::build] failed to exit the blocked entry of {}, err: {:?}",
                        block_err.resource(),
                        err
                    );
                }
                Err(Error::new(block_err))
            }
            _ => Ok(entry),
        }
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_traffic_type(mut self, traffic_type: TrafficType) -> Self {
        self.traffic_type = traffic_type;
        self
    }

    pub fn with_batch_count(mut self, batch_count: u32) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_flag(mut self, flag: i32) -> Self {
        self.flag = flag;
        self
    }

    /// Arguments of the invocation, checked by the hot-spot parameter rules by index.
    pub fn with_args(mut self, args: ParamsList) -> Self {
        self.args = Some(args);
        self
    }

    /// Named arguments of the invocation, checked by the hot-spot parameter rules by key.
    pub fn with_attachments(mut self, attachments: ParamsMap) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn with_slot_chain(mut self, slot_chain: Arc<SlotChain>) -> Self {
        self.slot_chain = Some(slot_chain);
        self
    }

    /// Runs the entry on `ctx` instead of the context of the current thread,
    /// e.g. one built by `Context::new_async_context()` for a spawned task.
    pub fn with_context(mut self, ctx: Arc<Context>) -> Self {
        self.context = Some(ctx);
        self
    }
}

/// Reports a business error of the invocation, read by the error-based circuit breakers on exit.
pub fn trace_error(entry: &EntryStrongPtr, err: Error) {
    entry.set_err(err);
}
