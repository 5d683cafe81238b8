//! mod `context` tracks call chains.
//!
//! A [`Context`] belongs to one logical flow of execution. Entries pushed onto it form a call tree
//! rooted at the [`EntranceNode`] of the context name, with a [`DefaultNode`] per resource
//! under that name. The implicit API keeps the context of the current thread in a thread-local,
//! while [`Context::new_async_context`] and [`run_on_context`] hand a call chain over to other tasks.
//!
//! Context names are capped by `config::max_context_name_amount()`, beyond which
//! a null context is returned: its entries pass without any check and record nothing.

mod call;
mod holder;
mod node;
mod origin;
mod registry;

pub use call::*;
pub use holder::*;
pub use node::*;
pub use origin::*;
pub use registry::*;
