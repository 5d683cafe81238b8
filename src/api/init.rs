//! Initialization of the flowguard runtime:
//! 1. resolve the global config, from a hand-built entity or a yaml file, overridden by the environment
//! 2. initialize the global logger
//! 3. start the background collectors of the system metrics and the time ticker

use crate::{config, config::ConfigEntity, system_metric, utils, Result};

/// `init_default` initializes flowguard using the configuration from the
/// environment and the default values.
#[inline]
pub fn init_default() -> Result<()> {
    init_with_config_file(&mut String::new())
}

/// `init_with_config` initializes flowguard using the given config.
#[inline]
pub fn init_with_config(config_entity: ConfigEntity) -> Result<()> {
    config::init_config_with_entity(config_entity)?;
    init_core_components();
    Ok(())
}

/// `init_with_config_file` loads the configuration from the given YAML file
/// and initializes flowguard. A blank path is resolved from `FLOWGUARD_CONFIG_FILE_PATH`.
#[inline]
pub fn init_with_config_file(config_path: &mut String) -> Result<()> {
    config::init_config_with_yaml(config_path)?;
    init_core_components();
    Ok(())
}

// `init_core_components` starts the components configured by the global config,
// every collector starts at most once per process
fn init_core_components() {
    let system_interval = config::system_stat_collect_interval_ms();
    let mut load_interval = system_interval;
    let mut cpu_interval = system_interval;

    if config::load_stat_collect_interval_ms() > 0 {
        load_interval = config::load_stat_collect_interval_ms();
    }
    if config::cpu_stat_collect_interval_ms() > 0 {
        cpu_interval = config::cpu_stat_collect_interval_ms();
    }

    system_metric::init_load_collector(load_interval);
    system_metric::init_cpu_collector(cpu_interval);
    system_metric::init_memory_collector(system_interval);

    if config::use_cache_time() {
        utils::start_time_ticker();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_entity() {
        let mut entity = ConfigEntity::new();
        entity.version = String::new();
        assert!(init_with_config(entity).is_err());
    }
}
