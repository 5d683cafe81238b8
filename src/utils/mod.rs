use std::any::Any;
use std::sync::Arc;

pub mod time;

pub use self::time::*;

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// not a general implememtation,
/// only used in `core::flow::WarmUpCalculator`,
/// which won't overflow as long as parameter in rule is rational
pub(crate) fn next_after(x: f64) -> f64 {
    let x = x.to_bits();
    let x = if (x >> 63) == 0 { x + 1 } else { x - 1 };
    f64::from_bits(x)
}

/// Atomic load/store of an `f64` kept in an `AtomicU64` as its bit pattern.
pub(crate) mod atomic_f64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    #[inline]
    pub fn new(v: f64) -> AtomicU64 {
        AtomicU64::new(v.to_bits())
    }

    #[inline]
    pub fn load(a: &AtomicU64) -> f64 {
        f64::from_bits(a.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn store(a: &AtomicU64, v: f64) {
        a.store(v.to_bits(), Ordering::SeqCst)
    }
}

/// Trait for upcast/downcast
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

// impl the required AsAny trait for structs
impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
