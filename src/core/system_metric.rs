//! Background collectors of the process and host metrics read by the system rules.

use crate::{logging, utils, utils::atomic_f64};
use lazy_static::lazy_static;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, Once,
};
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

lazy_static! {
    static ref SYSTEM: Mutex<System> = Mutex::new(System::new());
    /// process cpu usage in percent
    static ref CURRENT_CPU: AtomicU64 = atomic_f64::new(0.0);
    /// process resident memory in KBytes
    static ref CURRENT_MEMORY: AtomicU64 = AtomicU64::new(0);
    static ref CURRENT_LOAD: AtomicU64 = atomic_f64::new(0.0);
    static ref LOAD_ONCE: Once = Once::new();
    static ref CPU_ONCE: Once = Once::new();
    static ref MEMORY_ONCE: Once = Once::new();
}

/// Spawns a thread refreshing a metric every `interval_ms`, at most once per `once`.
/// A zero interval disables the collector.
fn spawn_collector<F>(once: &'static Once, name: &'static str, interval_ms: u32, collect: F)
where
    F: Fn() + Send + 'static,
{
    if interval_ms == 0 {
        return;
    }
    once.call_once(move || {
        let spawned = std::thread::Builder::new()
            .name(format!("flowguard-{}-collector", name))
            .spawn(move || loop {
                collect();
                utils::sleep_for_ms(interval_ms as u64);
            });
        if let Err(err) = spawned {
            logging::error!(
                "[SystemMetric] Failed to start the {} collector, error: {:?}",
                name,
                err
            );
        }
    });
}

/// get_total_memory_size returns the current machine's memory in KBytes
pub fn get_total_memory_size() -> u64 {
    let mut system = SYSTEM.lock().unwrap();
    system.refresh_memory();
    system.total_memory()
}

pub fn init_memory_collector(interval_ms: u32) {
    spawn_collector(&MEMORY_ONCE, "memory", interval_ms, || {
        CURRENT_MEMORY.store(process_memory(), Ordering::SeqCst)
    });
}

pub fn init_cpu_collector(interval_ms: u32) {
    spawn_collector(&CPU_ONCE, "cpu", interval_ms, || {
        atomic_f64::store(&CURRENT_CPU, process_cpu_usage())
    });
}

pub fn init_load_collector(interval_ms: u32) {
    spawn_collector(&LOAD_ONCE, "load", interval_ms, || {
        atomic_f64::store(&CURRENT_LOAD, system_load())
    });
}

fn process_memory() -> u64 {
    let mut system = SYSTEM.lock().unwrap();
    match get_current_pid() {
        Ok(pid) => {
            system.refresh_process(pid);
            system.process(pid).map_or(0, |p| p.memory())
        }
        Err(err) => {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!("[SystemMetric] Failed to get the current pid, error: {}", err)
            });
            0
        }
    }
}

fn process_cpu_usage() -> f64 {
    let mut system = SYSTEM.lock().unwrap();
    match get_current_pid() {
        Ok(pid) => {
            system.refresh_process(pid);
            system.process(pid).map_or(0.0, |p| p.cpu_usage() as f64)
        }
        Err(err) => {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!("[SystemMetric] Failed to get the current pid, error: {}", err)
            });
            0.0
        }
    }
}

fn system_load() -> f64 {
    SYSTEM.lock().unwrap().load_average().one
}

/// load1 of the host, 0 before the load collector ran
#[inline]
pub fn current_load() -> f64 {
    atomic_f64::load(&CURRENT_LOAD)
}

#[inline]
pub fn current_cpu_usage() -> f64 {
    atomic_f64::load(&CURRENT_CPU)
}

#[inline]
pub fn current_memory_usage() -> u64 {
    CURRENT_MEMORY.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn set_system_load(load: f64) {
    atomic_f64::store(&CURRENT_LOAD, load);
}

#[cfg(test)]
pub(crate) fn set_cpu_usage(usage: f64) {
    atomic_f64::store(&CURRENT_CPU, usage);
}
