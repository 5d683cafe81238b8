use lazy_static::lazy_static;
use time::{macros::format_description, Duration, OffsetDateTime};

lazy_static! {
    static ref UNIX_TIME_UNIT_OFFSET: u64 = (Duration::MILLISECOND / Duration::NANOSECOND) as u64;
}

#[inline]
pub fn unix_time_unit_offset() -> u64 {
    *UNIX_TIME_UNIT_OFFSET
}

#[inline]
pub fn sleep_for_ms(ms: u64) {
    std::thread::sleep(std::time::Duration::from_millis(ms));
}

#[inline]
pub fn sleep_for_ns(ns: u64) {
    std::thread::sleep(std::time::Duration::from_nanos(ns));
}

#[inline]
fn cal_curr_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / (*UNIX_TIME_UNIT_OFFSET as i128)) as u64
}

/// Formats a millisecond timestamp as `hh:mm:ss`,
/// falls back to the raw number if the timestamp is out of range.
pub fn format_time_millis(ts_millis: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(milli2nano(ts_millis) as i128)
        .ok()
        .and_then(|t| {
            t.format(format_description!("[hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_else(|| ts_millis.to_string())
}

pub fn format_time_nanos_curr() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

pub fn curr_time_millis() -> u64 {
    let ticker_time = curr_time_millis_with_ticker();
    if ticker_time > 0 {
        ticker_time
    } else {
        cal_curr_time_millis()
    }
}

#[inline]
pub fn curr_time_nanos() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as u64
}

#[inline]
pub fn milli2nano(t: u64) -> u64 {
    *UNIX_TIME_UNIT_OFFSET * t
}

pub use ticker::*;

// provide cached time by a ticker
pub mod ticker {
    use super::*;
    use lazy_static::lazy_static;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Once;

    lazy_static! {
        static ref NOW_IN_MS: AtomicU64 = AtomicU64::new(0);
        static ref TICKER_ONCE: Once = Once::new();
    }

    /// `start_time_ticker()` starts a background thread that caches current timestamp per millisecond,
    /// which may provide better performance in high-concurrency scenarios.
    /// Calling it more than once has no effect.
    pub fn start_time_ticker() {
        TICKER_ONCE.call_once(|| {
            update_time();
            std::thread::spawn(move || loop {
                update_time();
                std::thread::sleep(std::time::Duration::from_millis(1));
            });
        });
    }

    #[inline]
    fn update_time() {
        let curr = cal_curr_time_millis();
        NOW_IN_MS.store(curr, Ordering::SeqCst);
    }

    #[inline]
    pub(super) fn curr_time_millis_with_ticker() -> u64 {
        NOW_IN_MS.load(Ordering::SeqCst)
    }
}
