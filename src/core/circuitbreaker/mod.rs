//! `circuitbreaker` cuts the traffic of an unstable resource and probes for its recovery.
//!
//! Each circuit breaking `Rule` turns into one breaker with its own sliding window.
//! Three strategies are built in:
//!
//!  1. SlowRequestRatio: the ratio of calls slower than `max_allowed_rt_ms` reaches the threshold.
//!     Calls still running past `max_allowed_rt_ms` already count as slow.
//!
//!  2. ErrorRatio: the ratio of calls completed with an error reaches the threshold.
//!
//!  3. ErrorCount: the number of calls completed with an error reaches the threshold.
//!
//! More strategies are added by `set_circuit_breaker_generator` under `BreakerStrategy::Custom`.
//!
//! A breaker is a state machine:
//!
//!  1. Closed: every invocation passes, the statistic is evaluated.
//!
//!  2. Open: every invocation is blocked until `retry_timeout_ms` elapsed,
//!     then the first invocation becomes the probe and the breaker turns Half-Open.
//!
//!  3. Half-Open: only the probe runs. A good probe closes the breaker and resets its statistic,
//!     a bad one reopens it. A probe blocked by a later check reopens it too.
//!
//! `StateChangeListener`s observe every transformation.

pub mod breaker;
pub mod rule;
pub mod rule_manager;
pub mod slot;
pub mod stat_slot;

pub use breaker::*;
pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use stat_slot::*;
