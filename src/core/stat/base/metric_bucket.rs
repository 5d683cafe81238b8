use crate::base::{MetricEvent, DEFAULT_STATISTIC_MAX_RT};
use enum_map::EnumMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// The value held by a bucket of a LeapArray,
/// shared among threads, so it updates itself atomically.
pub trait MetricTrait: fmt::Debug + Default + Send + Sync {
    fn reset(&self);
}

/// MetricBucket holds the counters of one bucket.
#[derive(Debug)]
pub struct MetricBucket {
    counter: EnumMap<MetricEvent, AtomicU64>,
    min_rt: AtomicU64,
    max_concurrency: AtomicU32,
}

impl MetricTrait for MetricBucket {
    fn reset(&self) {
        for (_, item) in &self.counter {
            item.store(0, Ordering::SeqCst);
        }
        self.min_rt.store(DEFAULT_STATISTIC_MAX_RT, Ordering::SeqCst);
        self.max_concurrency.store(0, Ordering::SeqCst);
    }
}

impl Default for MetricBucket {
    fn default() -> Self {
        MetricBucket {
            counter: EnumMap::default(),
            min_rt: AtomicU64::new(DEFAULT_STATISTIC_MAX_RT),
            max_concurrency: AtomicU32::new(0),
        }
    }
}

impl MetricBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: MetricEvent, count: u64) {
        match event {
            MetricEvent::Rt => self.add_rt(count),
            _ => self.add_count(event, count),
        }
    }

    pub fn add_count(&self, event: MetricEvent, count: u64) {
        self.counter[event].fetch_add(count, Ordering::SeqCst);
    }

    pub fn add_rt(&self, round_trip: u64) {
        self.add_count(MetricEvent::Rt, round_trip);
        self.min_rt.fetch_min(round_trip, Ordering::SeqCst);
    }

    pub fn get(&self, event: MetricEvent) -> u64 {
        self.counter[event].load(Ordering::SeqCst)
    }

    pub fn min_rt(&self) -> u64 {
        self.min_rt.load(Ordering::SeqCst)
    }

    pub fn update_concurrency(&self, concurrency: u32) {
        self.max_concurrency.fetch_max(concurrency, Ordering::SeqCst);
    }

    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread::spawn;

    #[test]
    fn single() {
        let mb = MetricBucket::new();
        for i in 0..120 {
            match i % 6 {
                0 => mb.add(MetricEvent::Pass, 1),
                1 => mb.add(MetricEvent::Block, 1),
                2 => mb.add(MetricEvent::Complete, 1),
                3 => mb.add(MetricEvent::Error, 1),
                4 => mb.add_rt(100 + i as u64),
                _ => mb.update_concurrency(i),
            }
        }
        assert_eq!(mb.get(MetricEvent::Pass), 20);
        assert_eq!(mb.get(MetricEvent::Block), 20);
        assert_eq!(mb.get(MetricEvent::Complete), 20);
        assert_eq!(mb.get(MetricEvent::Error), 20);
        // rt 104, 110, ..., 218
        assert_eq!(mb.get(MetricEvent::Rt), (0..20).map(|k| 104 + 6 * k).sum::<u64>());
        assert_eq!(mb.min_rt(), 104);
        assert_eq!(mb.max_concurrency(), 119);
    }

    #[test]
    fn concurrent() {
        let mb = Arc::new(MetricBucket::new());
        let mut handles = Vec::new();
        for i in 0..1000u64 {
            let mb = mb.clone();
            handles.push(spawn(move || {
                mb.add(MetricEvent::Pass, 1);
                mb.add(MetricEvent::Block, 2);
                mb.add(MetricEvent::Error, 4);
                mb.add(MetricEvent::Rt, i);
                mb.update_concurrency(i as u32);
            }))
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mb.get(MetricEvent::Pass), 1000);
        assert_eq!(mb.get(MetricEvent::Block), 2000);
        assert_eq!(mb.get(MetricEvent::Error), 4000);
        assert_eq!(mb.get(MetricEvent::Rt), 499_500);
        assert_eq!(mb.min_rt(), 0);
        assert_eq!(mb.max_concurrency(), 999);
    }

    #[test]
    fn reset() {
        let mb = MetricBucket::new();
        mb.add_rt(100);
        mb.add(MetricEvent::Pass, 3);
        mb.update_concurrency(4);
        mb.reset();
        assert_eq!(mb.get(MetricEvent::Pass), 0);
        assert_eq!(mb.get(MetricEvent::Rt), 0);
        assert_eq!(mb.min_rt(), DEFAULT_STATISTIC_MAX_RT);
        assert_eq!(mb.max_concurrency(), 0);
    }
}
