//!  Circuit Breaker State Machine:
//!
//!                                switch to open based on rule
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |   Probe succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!
//! The state is a single `AtomicU8`, every transition is a compare-and-swap,
//! and the listeners are notified by the caller that won it.

#![allow(clippy::wrong_self_convention)]

/// Error count
pub mod error_count;
/// Error ratio
pub mod error_ratio;
/// Slow round trip time
pub mod slow_request;
pub mod stat;

pub use error_count::*;
pub use error_ratio::*;
pub use slow_request::*;
pub use stat::*;

use super::*;
use crate::{
    base::{EntryContext, Snapshot},
    logging, utils,
};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc,
};

/// `BreakerStrategy` represents the strategy of circuit breaker.
/// Each strategy is associated with one rule type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum BreakerStrategy {
    /// `SlowRequestRatio` strategy changes the circuit breaker state based on slow request ratio
    SlowRequestRatio,
    /// `ErrorRatio` strategy changes the circuit breaker state based on error request ratio
    ErrorRatio,
    /// `ErrorCount` strategy changes the circuit breaker state based on error amount
    ErrorCount,
    #[serde(skip)]
    Custom(u8),
}

impl Default for BreakerStrategy {
    fn default() -> BreakerStrategy {
        BreakerStrategy::SlowRequestRatio
    }
}

/// States of Circuit Breaker State Machine
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            1 => State::HalfOpen,
            2 => State::Open,
            _ => State::Closed,
        }
    }
}

/// `StateChangeListener` listens on the circuit breaker state change event
pub trait StateChangeListener: Sync + Send {
    /// `on_transform_to_closed` is triggered when circuit breaker state transformed to Closed.
    fn on_transform_to_closed(&self, prev: State, rule: Arc<Rule>);

    /// `on_transform_to_open` is triggered when circuit breaker state transformed to Open.
    /// The "snapshot" indicates the triggered value when the transformation occurs.
    fn on_transform_to_open(&self, prev: State, rule: Arc<Rule>, snapshot: Option<Arc<Snapshot>>);

    /// `on_transform_to_half_open` is triggered when circuit breaker state transformed to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, rule: Arc<Rule>);
}

/// `CircuitBreakerTrait` is the basic trait of circuit breaker
pub trait CircuitBreakerTrait: Send + Sync {
    /// `breaker` returns the associated state machine.
    fn breaker(&self) -> &BreakerBase;

    /// `stat` returns the associated statistic data structure.
    fn stat(&self) -> &Arc<CounterLeapArray>;

    /// `try_pass` acquires permission of an invocation only if it is available at the time of invocation.
    /// An Open breaker whose retry timeout arrived lets the caller through as the probe.
    fn try_pass(&self, ctx: &mut EntryContext) -> bool {
        self.breaker()
            .try_pass_with_time(utils::curr_time_millis(), ctx)
    }

    /// `on_request_pass` is called when an invocation passed all the checks.
    fn on_request_pass(&self, _ctx: &EntryContext) {}

    /// `on_request_complete` records a completed invocation, with its response time and business error,
    /// and handles the state transformation of the circuit breaker.
    /// It is called only when a passed invocation finished.
    fn on_request_complete(&self, ctx: &EntryContext);

    /// `bound_rule` returns the associated circuit breaking rule.
    fn bound_rule(&self) -> &Arc<Rule> {
        self.breaker().bound_rule()
    }

    /// `current_state` returns current state of the circuit breaker.
    fn current_state(&self) -> State {
        self.breaker().current_state()
    }

    fn next_retry_timestamp_ms(&self) -> u64 {
        self.breaker().next_retry_timestamp_ms()
    }

    fn reset_metric(&self) {
        self.stat().reset_all()
    }
}

fn notify_listeners<F: Fn(&dyn StateChangeListener)>(f: F) {
    for listener in state_change_listeners() {
        f(&*listener);
    }
}

/// BreakerBase is the state machine shared by the built-in circuit breakers.
#[derive(Debug)]
pub struct BreakerBase {
    rule: Arc<Rule>,
    /// retry_timeout_ms represents recovery timeout (in milliseconds) before the circuit breaker opens.
    /// During the open period, no requests are permitted until the timeout has elapsed.
    /// After that, the circuit breaker will transform to half-open state for trying a "trial" request.
    retry_timeout_ms: u32,
    /// next_retry_timestamp_ms is the time circuit breaker could probe
    next_retry_timestamp_ms: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
}

impl BreakerBase {
    pub fn new(rule: Arc<Rule>) -> Self {
        BreakerBase {
            retry_timeout_ms: rule.retry_timeout_ms,
            rule,
            next_retry_timestamp_ms: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(State::Closed as u8)),
        }
    }

    pub fn bound_rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn current_state(&self) -> State {
        State::from(self.state.load(Ordering::SeqCst))
    }

    /// Forces the state, no listener is notified.
    pub fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn next_retry_timestamp_ms(&self) -> u64 {
        self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    pub fn retry_timeout_arrived_with_time(&self, now: u64) -> bool {
        now >= self.next_retry_timestamp_ms()
    }

    fn update_next_retry_timestamp_with_time(&self, now: u64) {
        self.next_retry_timestamp_ms
            .store(now + self.retry_timeout_ms as u64, Ordering::SeqCst);
    }

    fn cas_state(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn try_pass_with_time(&self, now: u64, ctx: &mut EntryContext) -> bool {
        match self.current_state() {
            State::Closed => true,
            State::Open => {
                self.retry_timeout_arrived_with_time(now) && self.from_open_to_half_open(ctx)
            }
            State::HalfOpen => false,
        }
    }

    /// from_closed_to_open updates circuit breaker state machine from closed to open.
    /// Return true only if current caller successfully accomplished the transformation.
    pub fn from_closed_to_open_with_time(&self, now: u64, snapshot: Arc<Snapshot>) -> bool {
        if !self.cas_state(State::Closed, State::Open) {
            return false;
        }
        self.update_next_retry_timestamp_with_time(now);
        logging::debug!(
            "[CircuitBreaker] resource {} Closed -> Open, snapshot: {:?}",
            self.rule.resource,
            snapshot
        );
        notify_listeners(|l| {
            l.on_transform_to_open(State::Closed, Arc::clone(&self.rule), Some(snapshot.clone()))
        });
        true
    }

    /// from_open_to_half_open updates circuit breaker state machine from open to half-open.
    /// Return true only if current caller successfully accomplished the transformation,
    /// the caller becomes the probe. If the probe ends up blocked by a later check,
    /// its exit handler turns the breaker back to Open.
    pub fn from_open_to_half_open(&self, ctx: &mut EntryContext) -> bool {
        if !self.cas_state(State::Open, State::HalfOpen) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] resource {} Open -> HalfOpen",
            self.rule.resource
        );
        notify_listeners(|l| l.on_transform_to_half_open(State::Open, Arc::clone(&self.rule)));

        let state = Arc::clone(&self.state);
        let next_retry_timestamp_ms = Arc::clone(&self.next_retry_timestamp_ms);
        let retry_timeout_ms = self.retry_timeout_ms as u64;
        let rule = Arc::clone(&self.rule);
        ctx.when_exit(Box::new(move |ctx: &EntryContext| {
            if ctx.is_blocked()
                && state
                    .compare_exchange(
                        State::HalfOpen as u8,
                        State::Open as u8,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            {
                next_retry_timestamp_ms.store(
                    utils::curr_time_millis() + retry_timeout_ms,
                    Ordering::SeqCst,
                );
                logging::debug!(
                    "[CircuitBreaker] resource {} HalfOpen -> Open, the probe was blocked",
                    rule.resource
                );
                notify_listeners(|l| {
                    l.on_transform_to_open(State::HalfOpen, Arc::clone(&rule), Some(Arc::new(1.0)))
                });
            }
            Ok(())
        }));
        true
    }

    /// from_half_open_to_open updates circuit breaker state machine from half-open to open.
    /// Return true only if current caller successfully accomplished the transformation.
    pub fn from_half_open_to_open_with_time(&self, now: u64, snapshot: Arc<Snapshot>) -> bool {
        if !self.cas_state(State::HalfOpen, State::Open) {
            return false;
        }
        self.update_next_retry_timestamp_with_time(now);
        logging::debug!(
            "[CircuitBreaker] resource {} HalfOpen -> Open, snapshot: {:?}",
            self.rule.resource,
            snapshot
        );
        notify_listeners(|l| {
            l.on_transform_to_open(
                State::HalfOpen,
                Arc::clone(&self.rule),
                Some(snapshot.clone()),
            )
        });
        true
    }

    /// from_half_open_to_closed updates circuit breaker state machine from half-open to closed
    /// Return true only if current caller successfully accomplished the transformation.
    pub fn from_half_open_to_closed(&self) -> bool {
        if !self.cas_state(State::HalfOpen, State::Closed) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] resource {} HalfOpen -> Closed",
            self.rule.resource
        );
        notify_listeners(|l| l.on_transform_to_closed(State::HalfOpen, Arc::clone(&self.rule)));
        true
    }
}

#[cfg(test)]
pub(crate) use test::{MockCircuitBreaker, RecordingListener};
