use super::{new_context, Context, OriginParser};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Context>>> = RefCell::new(None);
}

/// The context of the calling thread.
pub fn current() -> Option<Arc<Context>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Sets the context of the calling thread, returning the previous one.
pub fn replace(ctx: Option<Arc<Context>>) -> Option<Arc<Context>> {
    CURRENT.with(|c| c.replace(ctx))
}

/// Enters the context `name` on the calling thread.
/// If the thread already runs in a context, that one is returned unchanged.
pub fn enter(name: &str, origin: &str) -> Arc<Context> {
    if let Some(ctx) = current() {
        return ctx;
    }
    let ctx = new_context(name, origin);
    replace(Some(ctx.clone()));
    ctx
}

/// Like `enter`, with the origin parsed from `request`.
pub fn enter_with_parser<R, P>(name: &str, request: &R, parser: &P) -> Arc<Context>
where
    R: ?Sized,
    P: OriginParser<R> + ?Sized,
{
    if let Some(ctx) = current() {
        return ctx;
    }
    enter(name, &parser.parse_origin(request))
}

/// Leaves the context of the calling thread, unless some entry is still active in it.
pub fn exit() {
    CURRENT.with(|c| {
        let mut c = c.borrow_mut();
        if c.as_ref().map_or(false, |ctx| ctx.is_idle()) {
            *c = None;
        }
    })
}

/// Clears the thread-local context once its last entry exited.
pub(crate) fn release_if_idle(ctx: &Arc<Context>) {
    CURRENT.with(|c| {
        let mut c = c.borrow_mut();
        let same = c.as_ref().map_or(false, |cur| Arc::ptr_eq(cur, ctx));
        if same && ctx.is_idle() {
            *c = None;
        }
    })
}

struct RestoreGuard(Option<Option<Arc<Context>>>);

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(prev) = self.0.take() {
            replace(prev);
        }
    }
}

/// Runs `f` with `ctx` as the context of the calling thread.
/// The previous context is restored afterwards, also when `f` panics.
pub fn run_on_context<F, T>(ctx: Arc<Context>, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = RestoreGuard(Some(replace(Some(ctx))));
    f()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::panic;

    // every test runs on its own thread, so the thread-local starts empty

    #[test]
    fn enter_keeps_existing() {
        let a = enter("holder_enter_a", "o1");
        let b = enter("holder_enter_b", "o2");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.name(), "holder_enter_a");
        exit();
        assert!(current().is_none());
    }

    #[test]
    fn exit_keeps_busy_context() {
        let ctx = enter("holder_busy", "");
        ctx.push_entry(1, None);
        exit();
        assert!(current().is_some());
        ctx.pop_entry(1).unwrap();
        release_if_idle(&ctx);
        assert!(current().is_none());
    }

    #[test]
    fn parse_origin() {
        let ctx = enter_with_parser("holder_parser", "10.0.0.1:app-a", &|req: &str| {
            req.split(':').nth(1).unwrap_or_default().to_owned()
        });
        assert_eq!(ctx.origin(), "app-a");
        exit();
    }

    #[test]
    fn restored_after_panic() {
        let outer = enter("holder_outer", "");
        let inner = new_context("holder_inner", "");
        let inner_clone = inner.clone();
        let res = panic::catch_unwind(panic::AssertUnwindSafe(move || {
            run_on_context(inner_clone, || {
                assert_eq!(current().unwrap().name(), "holder_inner");
                panic!("boom");
            })
        }));
        assert!(res.is_err());
        assert!(Arc::ptr_eq(&current().unwrap(), &outer));

        let name = run_on_context(inner, || current().unwrap().name().to_owned());
        assert_eq!(name, "holder_inner");
        assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        exit();
    }
}
