use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::AppConfig;

pub const ENV_PREFIX: &str = "STRBRIDGE";

/// 配置加载器
///
/// Layers, lowest priority first: built-in defaults, the TOML file (if it
/// exists), then `STRBRIDGE__SECTION__KEY` environment variables.
pub struct ConfigLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 加载配置，文件不存在时使用默认值
    pub fn load(&self) -> Result<AppConfig> {
        let path = self
            .config_path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid config path"))?;

        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {:?}", self.config_path))?;

        let app: AppConfig = config
            .try_deserialize()
            .with_context(|| format!("Invalid config {:?}", self.config_path))?;
        Self::validate(&app)?;
        Ok(app)
    }

    /// 验证配置
    pub fn validate(app: &AppConfig) -> Result<()> {
        let bridge = &app.bridge;

        if bridge.max_string_len == 0 {
            return Err(anyhow!("bridge.max_string_len must be greater than 0"));
        }

        let exports = &bridge.exports;
        for (key, name) in [
            ("allocate", &exports.allocate),
            ("free", &exports.free),
            ("free_result", &exports.free_result),
            ("memory", &exports.memory),
        ] {
            if name.trim().is_empty() {
                return Err(anyhow!("bridge.exports.{} must not be empty", key));
            }
        }

        Ok(())
    }
}
