use crate::base::ResourceType;

// app settings
pub const CONFIG_VERSION: &str = "v1";
pub const DEFAULT_APP_NAME: &str = "unknown_service";
pub const DEFAULT_APP_TYPE: u8 = ResourceType::Common as _;
pub const APP_NAME_ENV_KEY: &str = "FLOWGUARD_APP_NAME";
pub const APP_TYPE_ENV_KEY: &str = "FLOWGUARD_APP_TYPE";
pub const CONF_FILE_PATH_ENV_KEY: &str = "FLOWGUARD_CONFIG_FILE_PATH";
/// placeholder path meaning "no file, keep the defaults"
pub const CONFIG_FILENAME: &str = "USE_DEFAULT_CONFIGURATION";

// system statistic settings
pub const SYSTEM_INTERVAL_MS: u32 = 1000;
pub const LOAD_INTERVAL_MS: u32 = 1000;
pub const CPU_INTERVAL_MS: u32 = 1000;

// log settings
pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const LOG_CONFIG_FILE: &str = "testdata/config/log4rs.yaml";

pub const CONFIG_FILE_NOT_EXIST_ERROR: &str = "YAML configuration file does not exist";

// flow settings
pub const WARM_UP_COLD_FACTOR: u32 = 3;
