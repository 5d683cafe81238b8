use super::{constant::*, ConfigEntity};
use crate::{base::ResourceType, logging, utils, Error, Result};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<ConfigEntity> = RwLock::new(ConfigEntity::new());
}

pub fn reset_global_config(entity: ConfigEntity) {
    *GLOBAL_CONFIG.write().unwrap() = entity;
}

/// A copy of the effective configuration.
pub fn global_config() -> ConfigEntity {
    GLOBAL_CONFIG.read().unwrap().clone()
}

/// Loads the configuration with the priority:
/// environment > YAML file > defaults.
/// A blank `config_path` is resolved from `FLOWGUARD_CONFIG_FILE_PATH`,
/// when that is absent too, the defaults are kept.
pub fn init_config_with_yaml(config_path: &mut String) -> Result<()> {
    if utils::is_blank(config_path) {
        *config_path = env::var(CONF_FILE_PATH_ENV_KEY).unwrap_or_else(|_| CONFIG_FILENAME.into());
    }
    load_global_config_from_yaml_file(config_path)?;
    override_items_from_system_env()?;
    init_log();
    Ok(())
}

/// Uses the given entity, environment variables still take priority.
pub fn init_config_with_entity(entity: ConfigEntity) -> Result<()> {
    entity.check()?;
    reset_global_config(entity);
    override_items_from_system_env()?;
    init_log();
    Ok(())
}

fn load_global_config_from_yaml_file(path_str: &str) -> Result<()> {
    if path_str == CONFIG_FILENAME {
        return Ok(());
    }
    let path = Path::new(path_str);
    if !path.exists() {
        return Err(Error::msg(CONFIG_FILE_NOT_EXIST_ERROR));
    }
    let content = fs::read_to_string(path)?;
    let entity: ConfigEntity = serde_yaml::from_str(&content)?;
    entity.check()?;
    logging::info!("[Config] Resolving config from file, file {}", path_str);
    reset_global_config(entity);
    Ok(())
}

fn override_items_from_system_env() -> Result<()> {
    let app_name = env::var(APP_NAME_ENV_KEY).ok();
    let app_type = env::var(APP_TYPE_ENV_KEY)
        .ok()
        .and_then(|t| t.parse::<u8>().ok())
        .map(ResourceType::from);

    let mut cfg = GLOBAL_CONFIG.write().unwrap();
    let mut updated = cfg.clone();
    if let Some(app_name) = app_name {
        if !utils::is_blank(&app_name) {
            updated.config.app.app_name = app_name;
        }
    }
    if let Some(app_type) = app_type {
        updated.config.app.app_type = app_type;
    }
    updated.check()?;
    *cfg = updated;
    Ok(())
}

fn init_log() {
    let log_file = log_config_file();
    logging::logger_init(if utils::is_blank(&log_file) {
        None
    } else {
        Some(log_file)
    });
    logging::info!("[Config] App name resolved, app_name {}", app_name());
    logging::info!(
        "[Config] Print effective global config, global_config {}",
        GLOBAL_CONFIG.read().unwrap()
    );
}

#[inline]
pub fn log_config_file() -> String {
    GLOBAL_CONFIG.read().unwrap().config.log.config_file.clone()
}

#[inline]
pub fn app_name() -> String {
    GLOBAL_CONFIG.read().unwrap().config.app.app_name.clone()
}

#[inline]
pub fn app_type() -> ResourceType {
    GLOBAL_CONFIG.read().unwrap().config.app.app_type
}

#[inline]
pub fn system_stat_collect_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.system.system_interval_ms
}

#[inline]
pub fn load_stat_collect_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.system.load_interval_ms
}

#[inline]
pub fn cpu_stat_collect_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.system.cpu_interval_ms
}

#[inline]
pub fn use_cache_time() -> bool {
    GLOBAL_CONFIG.read().unwrap().config.use_cache_time
}

#[inline]
pub fn global_stat_interval_ms_total() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.interval_ms_total
}

#[inline]
pub fn global_stat_sample_count_total() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.sample_count_total
}

#[inline]
pub fn global_stat_bucket_length_ms() -> u32 {
    let cfg = GLOBAL_CONFIG.read().unwrap();
    cfg.config.stat.interval_ms_total / cfg.config.stat.sample_count_total
}

#[inline]
pub fn metric_stat_interval_ms() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.interval_ms
}

#[inline]
pub fn metric_stat_sample_count() -> u32 {
    GLOBAL_CONFIG.read().unwrap().config.stat.sample_count
}

#[inline]
pub fn max_context_name_amount() -> usize {
    GLOBAL_CONFIG
        .read()
        .unwrap()
        .config
        .context
        .max_context_name_amount
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_file() {
        let mut path = String::from("testdata/config/not_exist.yaml");
        assert_eq!(
            init_config_with_yaml(&mut path).unwrap_err().to_string(),
            CONFIG_FILE_NOT_EXIST_ERROR
        );
    }

    #[test]
    fn yaml_file() {
        let mut path = String::from("testdata/config/flowguard.yaml");
        load_global_config_from_yaml_file(&path).unwrap();
        let cfg = global_config();
        assert_eq!(cfg.config.app.app_name, "flowguard-demo");
        assert_eq!(cfg.config.app.app_type, ResourceType::Web);
        assert_eq!(cfg.config.stat, super::super::StatConfig::default());
        // the placeholder keeps whatever is loaded
        path = CONFIG_FILENAME.into();
        load_global_config_from_yaml_file(&path).unwrap();
        assert_eq!(app_name(), "flowguard-demo");
        reset_global_config(ConfigEntity::new());
        assert_eq!(app_name(), DEFAULT_APP_NAME);
    }
}
