//! mod `hotspot` limits the traffic of a resource per value of one of its arguments.
//!
//! The arguments are passed with `EntryBuilder::with_args()` or `with_attachments()`.
//! A rule picks one of them and keeps counters per value in LRU caches:
//! in-flight requests for `Concurrency` rules, a token bucket or the last pass time for `Qps` rules.
//! Entries without the argument are not checked.

pub mod cache;
pub mod rule;
pub mod rule_manager;
pub mod slot;
pub mod traffic_shaping;

pub use cache::*;
pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use traffic_shaping::*;
