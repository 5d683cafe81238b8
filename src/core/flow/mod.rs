//! mod `flow` shapes the traffic of resources.
//!
//! Each flow rule is turned into a `Controller` made of two parts:
//!
//!  1. a `Calculator` yields the allowed threshold: `Direct`, `WarmUp` or `Adaptive`.
//!  2. a `Checker` compares the current statistic with it and decides: `Reject` or `Throttling`.
//!
//! A rule limits either the QPS or the concurrency of the resource itself (`Current`),
//! of another resource (`Associated`), or of the resource entered from one context (`Chain`).
//!
//! Customized controllers are registered with `set_traffic_shaping_generator()`
//! under `CalculateStrategy::Custom` or `ControlStrategy::Custom` keys,
//! the built-in pairs cannot be overridden.

pub mod rule;
pub mod rule_manager;
pub mod slot;
pub mod standalone_stat_slot;
pub mod traffic_shaping;

pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use standalone_stat_slot::*;
pub use traffic_shaping::*;
