//! `authority` admits or denies an invocation by the origin of its context.
//!
//! A white list rule lets only the listed origins in, a black list rule denies them.
//! Invocations without an origin are never checked.

pub mod rule;
pub mod rule_manager;
pub mod slot;

pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
