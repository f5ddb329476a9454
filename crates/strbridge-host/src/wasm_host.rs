use std::path::Path;
use strbridge_config::{EngineConfig, OptLevelSetting};
use strbridge_logging::GUEST_TARGET;
use strbridge_types::{GuestSlice, MAX_LOG_MESSAGE_LEN};
use wasmtime::{
    Caller, Config, Engine, Extern, Linker, Module, OptLevel, Store, StoreLimits,
    StoreLimitsBuilder,
};

use crate::memory::checked_range;
use crate::{BridgeError, Result};

/// Per-instance data carried by every store.
#[derive(Default)]
pub struct HostState {
    limits: StoreLimits,
}

/// Owns the wasmtime engine shared by every guest instance.
pub struct WasmHost {
    engine: Engine,
    config: EngineConfig,
}

impl WasmHost {
    pub fn new() -> Result<Self> {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(engine_config: &EngineConfig) -> Result<Self> {
        let mut config = Config::new();
        config.cranelift_opt_level(match engine_config.opt_level {
            OptLevelSetting::None => OptLevel::None,
            OptLevelSetting::Speed => OptLevel::Speed,
            OptLevelSetting::SpeedAndSize => OptLevel::SpeedAndSize,
        });

        let engine = Engine::new(&config)
            .map_err(|e| BridgeError::Load(format!("Failed to create engine: {e:#}")))?;
        Ok(Self {
            engine,
            config: engine_config.clone(),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a module from binary or text bytes.
    pub fn load_module(&self, wasm_bytes: &[u8]) -> Result<Module> {
        Module::new(&self.engine, wasm_bytes).map_err(|e| BridgeError::Load(format!("{e:#}")))
    }

    /// Read and compile a module without blocking the async runtime.
    pub async fn load_module_file(&self, path: impl AsRef<Path>) -> Result<Module> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| BridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Compiling guest module {:?} ({} bytes)", path, bytes.len());

        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
            .await
            .map_err(|e| BridgeError::Load(format!("Compilation task failed: {e}")))?
            .map_err(|e| BridgeError::Load(format!("{e:#}")))
    }

    /// prepare a fresh store for a new instance
    pub fn create_store(&self) -> Store<HostState> {
        let mut state = HostState::default();
        if let Some(max) = self.config.max_memory_bytes {
            state.limits = StoreLimitsBuilder::new().memory_size(max).build();
        }

        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);
        store
    }

    /// Linker with the host imports every guest may use
    pub fn create_linker(&self) -> Linker<HostState> {
        let mut linker = Linker::new(&self.engine);
        Self::register_log_functions(&mut linker);
        linker
    }

    fn register_log_functions(linker: &mut Linker<HostState>) {
        macro_rules! register_log {
            ($name:literal, $level:expr) => {
                if let Err(e) = linker.func_wrap(
                    "env",
                    $name,
                    move |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| {
                        Self::handle_log(&mut caller, ptr, len, $level);
                    },
                ) {
                    tracing::error!("Failed to register {}: {}", $name, e);
                }
            };
        }

        register_log!("log_trace", tracing::Level::TRACE);
        register_log!("log_debug", tracing::Level::DEBUG);
        register_log!("log_info", tracing::Level::INFO);
        register_log!("log_warn", tracing::Level::WARN);
        register_log!("log_error", tracing::Level::ERROR);
    }

    /// Forward a guest log line. Bad ranges or encodings are reported on the
    /// host side and never trap the guest.
    fn handle_log(caller: &mut Caller<'_, HostState>, ptr: u32, len: u32, level: tracing::Level) {
        let Some(Extern::Memory(memory)) = caller.get_export("memory") else {
            tracing::error!("Guest log call without a memory export");
            return;
        };

        let slice = GuestSlice::new(ptr, len.min(MAX_LOG_MESSAGE_LEN));
        if slice.is_empty() {
            return;
        }

        let data = memory.data(&*caller);
        let bytes = match checked_range(data.len(), slice) {
            Ok(range) => &data[range],
            Err(e) => {
                tracing::error!("Dropping guest log message: {}", e);
                return;
            }
        };

        match std::str::from_utf8(bytes) {
            Ok(msg) => match level {
                tracing::Level::TRACE => tracing::trace!(target: GUEST_TARGET, "{}", msg),
                tracing::Level::DEBUG => tracing::debug!(target: GUEST_TARGET, "{}", msg),
                tracing::Level::INFO => tracing::info!(target: GUEST_TARGET, "{}", msg),
                tracing::Level::WARN => tracing::warn!(target: GUEST_TARGET, "{}", msg),
                tracing::Level::ERROR => tracing::error!(target: GUEST_TARGET, "{}", msg),
            },
            Err(e) => tracing::warn!("Guest log message of {} bytes is not UTF-8: {}", slice.len, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Memory, MemoryType};

    const LOGGING_GUEST: &str = r#"
        (module
          (import "env" "log_info" (func $log_info (param i32 i32)))
          (import "env" "log_warn" (func $log_warn (param i32 i32)))
          (memory (export "memory") 1)
          (data (i32.const 8) "hello from guest")
          (data (i32.const 32) "\ff\fe")
          (func (export "run")
            (call $log_info (i32.const 8) (i32.const 16))
            ;; out of range: must be ignored, not trap
            (call $log_warn (i32.const 65530) (i32.const 100))
            ;; pointer past the end of memory
            (call $log_warn (i32.const -8) (i32.const 16))
            ;; longer than the cap, truncated to 4096 bytes
            (call $log_info (i32.const 0) (i32.const 60000))
            (call $log_info (i32.const 32) (i32.const 2))))
    "#;

    #[test]
    fn test_wasm_host_new() {
        assert!(WasmHost::new().is_ok());
    }

    #[test]
    fn test_load_invalid_wasm() {
        let host = WasmHost::new().unwrap();
        let result = host.load_module(&[0x00, 0x61, 0x73, 0x6d]);
        assert!(matches!(result, Err(BridgeError::Load(_))));
    }

    #[test]
    fn test_guest_logging_imports() {
        let host = WasmHost::new().unwrap();
        let module = host.load_module(LOGGING_GUEST.as_bytes()).unwrap();
        let linker = host.create_linker();
        let mut store = host.create_store();

        let instance = linker.instantiate(&mut store, &module).unwrap();
        let run = instance
            .get_typed_func::<(), ()>(&mut store, "run")
            .unwrap();
        assert!(run.call(&mut store, ()).is_ok());
    }

    #[test]
    fn test_store_memory_limit() {
        let host = WasmHost::with_config(&EngineConfig {
            max_memory_bytes: Some(2 * 65536),
            ..Default::default()
        })
        .unwrap();
        let mut store = host.create_store();

        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();
        assert!(memory.grow(&mut store, 1).is_ok());
        assert!(memory.grow(&mut store, 1).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_module_file() {
        let host = WasmHost::new().unwrap();
        let result = host.load_module_file("does/not/exist.wasm").await;
        assert!(matches!(result, Err(BridgeError::Io { .. })));
    }
}
