use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use strbridge_config::BridgeConfig;

use crate::{BridgeError, BridgeStats, Result, StringBridge, WasmHost};

/// Named bridges, one guest instance each.
///
/// Guest linear memory and allocator state are not synchronised, so each
/// instance sits behind its own mutex. The map lock is only taken for
/// writing when instances are added or removed.
pub struct BridgeManager {
    host: WasmHost,
    config: BridgeConfig,
    bridges: RwLock<HashMap<String, Mutex<StringBridge>>>,
}

impl BridgeManager {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Ok(Self {
            host: WasmHost::with_config(&config.engine)?,
            config,
            bridges: RwLock::new(HashMap::new()),
        })
    }

    pub fn host(&self) -> &WasmHost {
        &self.host
    }

    /// Instantiate `wasm_bytes` under `bridge_id`, replacing any previous instance.
    pub fn load_bridge(&self, bridge_id: &str, wasm_bytes: &[u8]) -> Result<()> {
        let bridge = StringBridge::from_bytes(&self.host, wasm_bytes, &self.config)?;
        self.insert(bridge_id, bridge)
    }

    pub async fn load_bridge_file(&self, bridge_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let bridge = StringBridge::load(&self.host, path, &self.config).await?;
        self.insert(bridge_id, bridge)
    }

    pub fn call(&self, bridge_id: &str, function: &str, args: &[&str]) -> Result<String> {
        self.with_bridge(bridge_id, |bridge| bridge.call(function, args))
    }

    pub fn stats(&self, bridge_id: &str) -> Result<BridgeStats> {
        self.with_bridge(bridge_id, |bridge| Ok(bridge.stats()))
    }

    /// Drop the instance registered as `bridge_id`; returns whether one existed.
    pub fn unload(&self, bridge_id: &str) -> Result<bool> {
        let mut map = self
            .bridges
            .write()
            .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
        Ok(map.remove(bridge_id).is_some())
    }

    pub fn bridge_ids(&self) -> Result<Vec<String>> {
        let map = self
            .bridges
            .read()
            .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Run `f` against one instance, holding only that instance's lock.
    fn with_bridge<T>(&self, bridge_id: &str, f: impl FnOnce(&mut StringBridge) -> Result<T>) -> Result<T> {
        let map = self
            .bridges
            .read()
            .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
        let entry = map
            .get(bridge_id)
            .ok_or_else(|| BridgeError::NotFound(bridge_id.to_string()))?;
        let mut bridge = entry
            .lock()
            .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
        f(&mut *bridge)
    }

    fn insert(&self, bridge_id: &str, bridge: StringBridge) -> Result<()> {
        let mut map = self
            .bridges
            .write()
            .map_err(|e| BridgeError::LockPoisoned(e.to_string()))?;
        if map.insert(bridge_id.to_string(), Mutex::new(bridge)).is_some() {
            tracing::info!("Replaced guest instance '{}'", bridge_id);
        }
        Ok(())
    }
}
