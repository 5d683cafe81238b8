//! mod `stat` implements the statistic structures, the sliding window over a
//! LeapArray of buckets, the nodes built on them, and the slots recording into the nodes.

mod base;
mod node_storage;
pub mod reader;
mod resource_node;
mod stat_prepare_slot;
mod stat_slot;
mod statistic_node;

pub use base::*;
pub use node_storage::*;
pub use resource_node::*;
pub use stat_prepare_slot::*;
pub use stat_slot::*;
pub use statistic_node::*;
