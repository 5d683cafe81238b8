use super::constant::*;
use crate::{
    base::{check_validity_for_reuse_statistic, constant::*, ResourceType},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// name of the running service
    pub app_name: String,
    /// kind of the service, e.g. web service or API gateway
    pub app_type: ResourceType,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
            app_type: DEFAULT_APP_TYPE.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// log4rs configuration, only read with the `logger_log4rs` feature
    pub config_file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            config_file: LOG_CONFIG_FILE.into(),
        }
    }
}

/// Collecting intervals of the system metric collectors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SystemStatConfig {
    pub system_interval_ms: u32,
    pub load_interval_ms: u32,
    pub cpu_interval_ms: u32,
}

impl Default for SystemStatConfig {
    fn default() -> Self {
        SystemStatConfig {
            system_interval_ms: SYSTEM_INTERVAL_MS,
            load_interval_ms: LOAD_INTERVAL_MS,
            cpu_interval_ms: CPU_INTERVAL_MS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StatConfig {
    /// window of the buckets kept per resource
    pub sample_count_total: u32,
    pub interval_ms_total: u32,
    /// default readonly window, must be derivable from the one above
    pub sample_count: u32,
    pub interval_ms: u32,
    pub system: SystemStatConfig,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            sample_count_total: DEFAULT_SAMPLE_COUNT_TOTAL,
            interval_ms_total: DEFAULT_INTERVAL_MS_TOTAL,
            sample_count: DEFAULT_SAMPLE_COUNT,
            interval_ms: DEFAULT_INTERVAL_MS,
            system: SystemStatConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// beyond this amount of distinct context names, entries run under the null context
    pub max_context_name_amount: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            max_context_name_amount: DEFAULT_MAX_CONTEXT_NAME_AMOUNT,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlowguardConfig {
    pub app: AppConfig,
    pub log: LogConfig,
    pub stat: StatConfig,
    pub context: ContextConfig,
    /// read the time from a background ticker instead of the system clock
    pub use_cache_time: bool,
}

impl Default for FlowguardConfig {
    fn default() -> Self {
        FlowguardConfig {
            app: AppConfig::default(),
            log: LogConfig::default(),
            stat: StatConfig::default(),
            context: ContextConfig::default(),
            use_cache_time: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConfigEntity {
    pub version: String,
    pub config: FlowguardConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: CONFIG_VERSION.into(),
            config: FlowguardConfig::default(),
        }
    }
}

impl ConfigEntity {
    pub fn new() -> Self {
        ConfigEntity::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::msg("empty version"));
        }
        if self.config.app.app_name.is_empty() {
            return Err(Error::msg("empty app name"));
        }
        if self.config.context.max_context_name_amount == 0 {
            return Err(Error::msg(
                "illegal context configuration: max_context_name_amount == 0",
            ));
        }
        let system = &self.config.stat.system;
        if system.system_interval_ms == 0 || system.load_interval_ms == 0 || system.cpu_interval_ms == 0
        {
            return Err(Error::msg(
                "illegal system statistic configuration: zero collecting interval",
            ));
        }
        check_validity_for_reuse_statistic(
            self.config.stat.sample_count,
            self.config.stat.interval_ms,
            self.config.stat.sample_count_total,
            self.config.stat.interval_ms_total,
        )?;
        Ok(())
    }
}

impl fmt::Display for ConfigEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}
