use super::{EntryContext, SlotChain};
use crate::core::context::{self, Context};
use crate::logging;
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const DOUBLE_EXIT_ERROR: &str = "the entry has already exited";
pub const OUT_OF_ORDER_EXIT_ERROR: &str = "the entry is not the current entry of its context";

lazy_static! {
    static ref ENTRY_ID: AtomicU64 = AtomicU64::new(1);
}

pub(crate) fn next_entry_id() -> u64 {
    ENTRY_ID.fetch_add(1, Ordering::Relaxed)
}

pub type EntryStrongPtr = Arc<ResourceEntry>;

/// ResourceEntry is one live invocation of a resource.
/// It must be exited exactly once, in the reverse order of creation within its context.
pub struct ResourceEntry {
    id: u64,
    ctx: Mutex<EntryContext>,
    /// absent when the entry runs under the null context
    sc: Option<Arc<SlotChain>>,
    call: Arc<Context>,
    exited: AtomicBool,
}

impl ResourceEntry {
    pub(crate) fn new(
        id: u64,
        ctx: EntryContext,
        sc: Option<Arc<SlotChain>>,
        call: Arc<Context>,
    ) -> Self {
        ResourceEntry {
            id,
            ctx: Mutex::new(ctx),
            sc,
            call,
            exited: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource_name(&self) -> String {
        self.ctx.lock().unwrap().resource().name().clone()
    }

    /// The call chain this entry was pushed onto.
    pub fn call_context(&self) -> &Arc<Context> {
        &self.call
    }

    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Reports a business error, recorded on exit and consumed by circuit breakers.
    pub fn set_err(&self, err: Error) {
        self.ctx.lock().unwrap().set_err(err);
    }

    pub fn round_trip(&self) -> u64 {
        self.ctx.lock().unwrap().round_trip()
    }

    /// Completes the invocation: runs the exit handlers, unwinds the slot chain
    /// and pops the entry from its context. The statistics are completed even if
    /// the entry is not the current one, but an error is returned in that case.
    pub fn exit(&self) -> Result<()> {
        if self.exited.swap(true, Ordering::SeqCst) {
            return Err(Error::msg(DOUBLE_EXIT_ERROR));
        }
        {
            let mut ctx = self.ctx.lock().unwrap();
            for handler in ctx.take_exit_handlers() {
                if let Err(err) = handler(&*ctx) {
                    logging::error!(
                        "[ResourceEntry::exit] exit handler failed on resource {}, err: {:?}",
                        ctx.resource().name(),
                        err
                    );
                }
            }
            if let Some(sc) = &self.sc {
                sc.exit(&mut *ctx);
            }
        }
        let popped = self.call.pop_entry(self.id);
        context::release_if_idle(&self.call);
        popped
    }
}

impl fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the context may be locked by an exit in progress
        let resource = self
            .ctx
            .try_lock()
            .map(|ctx| ctx.resource().name().clone())
            .unwrap_or_default();
        f.debug_struct("ResourceEntry")
            .field("id", &self.id)
            .field("resource", &resource)
            .field("context", &self.call.name())
            .field("exited", &self.is_exited())
            .finish()
    }
}
