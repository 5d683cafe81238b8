//! mod `base` holds the types shared by every other module:
//! resources, entries, block signals, statistic traits and the slot chain.

pub mod block_error;
pub mod constant;
pub mod context;
pub mod entry;
pub mod metric_item;
pub mod resource;
pub mod result;
pub mod rule;
pub mod slot_chain;
pub mod stat;

pub use block_error::*;
pub use constant::*;
pub use context::*;
pub use entry::*;
pub use metric_item::*;
pub use resource::*;
pub use result::*;
pub use rule::*;
pub use slot_chain::*;
pub use stat::*;
