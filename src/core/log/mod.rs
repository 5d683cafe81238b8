//! `log` records the blocked invocations.

pub mod slot;

pub use slot::*;
