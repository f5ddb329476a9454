pub mod app;
pub mod bridge;
pub mod loader;

pub use app::AppConfig;
pub use bridge::{BridgeConfig, EngineConfig, OptLevelSetting};
pub use loader::ConfigLoader;
