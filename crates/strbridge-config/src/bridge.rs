use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strbridge_types::{ConventionKind, ExportNames};

/// Default cap on a single marshaled string: 16 MiB.
pub const DEFAULT_MAX_STRING_LEN: u32 = 16 * 1024 * 1024;

/// 桥接配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Guest module loaded by the `strbridge` binary.
    pub module_path: Option<PathBuf>,
    pub exports: ExportNames,
    pub convention: ConventionKind,
    /// Longest string (in UTF-8 bytes) the host will copy into the guest.
    pub max_string_len: u32,
    pub engine: EngineConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_path: None,
            exports: ExportNames::default(),
            convention: ConventionKind::Descriptor,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevelSetting {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

/// Wasm 引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub opt_level: OptLevelSetting,
    /// Per-instance linear memory cap. `None` means no host-side limit.
    pub max_memory_bytes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevelSetting::Speed,
            max_memory_bytes: None,
        }
    }
}
