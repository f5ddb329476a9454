use serde::{Deserialize, Serialize};
use strbridge_logging::LoggingConfig;

use crate::BridgeConfig;

/// 全局配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Render as TOML, e.g. to seed a config file.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
