//! The string marshaling bridge.
//!
//! One `StringBridge` owns exactly one guest instance. A call runs
//! encode → invoke → copy result out → release result → decode, and the
//! argument buffers are released on every exit path.

use std::path::Path;
use std::sync::Arc;
use strbridge_config::BridgeConfig;
use strbridge_types::{ConventionKind, ExportNames, GuestSlice, OOM_SENTINEL};
use wasmtime::{Instance, Module, Store, TypedFunc, Val, ValType, WasmParams, WasmResults};

use crate::convention::{convention_for, CallingConvention, GuestResult};
use crate::{AllocationLedger, BridgeError, GuestMemory, HostState, Result, WasmHost};

/// Counters for the guest calls a bridge has made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub allocations: u64,
    pub frees: u64,
    pub result_frees: u64,
    pub invocations: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

pub struct StringBridge {
    store: Store<HostState>,
    instance: Instance,
    exports: ExportNames,
    allocate: TypedFunc<u32, u32>,
    free: TypedFunc<(u32, u32), ()>,
    free_result: Option<TypedFunc<u32, ()>>,
    memory: GuestMemory,
    convention: Arc<dyn CallingConvention>,
    ledger: AllocationLedger,
    stats: BridgeStats,
    max_string_len: u32,
    poisoned: Option<String>,
}

impl StringBridge {
    /// Read, compile and instantiate the guest module at `path`.
    pub async fn load(host: &WasmHost, path: impl AsRef<Path>, config: &BridgeConfig) -> Result<Self> {
        let path = path.as_ref();
        let module = host.load_module_file(path).await?;
        let bridge = Self::from_module(host, &module, config)?;
        tracing::info!("Guest module {:?} loaded", path);
        Ok(bridge)
    }

    pub fn from_bytes(host: &WasmHost, wasm_bytes: &[u8], config: &BridgeConfig) -> Result<Self> {
        let module = host.load_module(wasm_bytes)?;
        Self::from_module(host, &module, config)
    }

    pub fn from_module(host: &WasmHost, module: &Module, config: &BridgeConfig) -> Result<Self> {
        let linker = host.create_linker();
        let mut store = host.create_store();
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| BridgeError::Load(format!("Failed to instantiate guest: {e:#}")))?;

        let exports = config.exports.clone();
        let allocate = typed_export::<u32, u32>(&instance, &mut store, &exports.allocate)?;
        let free = typed_export::<(u32, u32), ()>(&instance, &mut store, &exports.free)?;

        // free_result 只在描述符约定下是必需的
        let free_result = match typed_export::<u32, ()>(&instance, &mut store, &exports.free_result) {
            Ok(func) => Some(func),
            Err(e) if config.convention == ConventionKind::Descriptor => return Err(e),
            Err(_) => None,
        };

        let memory = instance
            .get_memory(&mut store, &exports.memory)
            .map(GuestMemory::new)
            .ok_or_else(|| BridgeError::missing_export(&exports.memory, "no memory export with this name"))?;

        Ok(Self {
            store,
            instance,
            exports,
            allocate,
            free,
            free_result,
            memory,
            convention: convention_for(config.convention),
            ledger: AllocationLedger::new(),
            stats: BridgeStats::default(),
            max_string_len: config.max_string_len,
            poisoned: None,
        })
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn outstanding_allocations(&self) -> usize {
        self.ledger.outstanding()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn convention(&self) -> &dyn CallingConvention {
        self.convention.as_ref()
    }

    pub fn memory_size(&self) -> usize {
        self.memory.size(&self.store)
    }

    /// Marshal `args`, call `function` with the configured convention and
    /// return its decoded result.
    pub fn call(&mut self, function: &str, args: &[&str]) -> Result<String> {
        let convention = Arc::clone(&self.convention);
        self.call_with(function, args, convention.as_ref())
    }

    pub fn call_with(
        &mut self,
        function: &str,
        args: &[&str],
        convention: &dyn CallingConvention,
    ) -> Result<String> {
        self.ensure_usable()?;
        let result = self.call_inner(function, args, convention);
        self.track(result)
    }

    /// Copy `input` into a fresh guest buffer. The caller owns the buffer and
    /// must hand it back to [`StringBridge::free`].
    pub fn encode(&mut self, input: &str) -> Result<GuestSlice> {
        self.ensure_usable()?;
        let result = self.encode_inner(input);
        self.track(result)
    }

    /// Call `function` with already encoded arguments, using the configured
    /// convention. The returned result must be released by the caller.
    pub fn invoke(&mut self, function: &str, args: &[GuestSlice]) -> Result<GuestResult> {
        self.ensure_usable()?;
        let convention = Arc::clone(&self.convention);
        let result = self.invoke_inner(function, args, convention.as_ref());
        self.track(result)
    }

    pub fn resolve_descriptor(&mut self, address: u32) -> Result<GuestSlice> {
        self.ensure_usable()?;
        let result = self.memory.read_descriptor(&self.store, address);
        self.track(result)
    }

    /// Copy `slice` out of guest memory and decode it as strict UTF-8.
    pub fn decode(&mut self, slice: GuestSlice) -> Result<String> {
        self.ensure_usable()?;
        let result = self
            .memory
            .read(&self.store, slice)
            .and_then(|bytes| Ok(String::from_utf8(bytes)?));
        self.track(result)
    }

    pub fn free(&mut self, slice: GuestSlice) -> Result<()> {
        self.ensure_usable()?;
        let result = self.free_inner(slice);
        self.track(result)
    }

    pub fn free_result(&mut self, address: u32) -> Result<()> {
        self.ensure_usable()?;
        let result = self.free_result_inner(address);
        self.track(result)
    }

    /// Release a result returned by [`StringBridge::invoke`].
    pub fn release(&mut self, result: GuestResult) -> Result<()> {
        self.ensure_usable()?;
        let released = self.release_result(result);
        self.track(released)
    }

    /// Call an export that only takes and returns primitives.
    pub fn call_scalar<P, R>(&mut self, function: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.ensure_usable()?;
        let result = self.call_scalar_inner(function, params);
        self.track(result)
    }

    fn call_inner(
        &mut self,
        function: &str,
        args: &[&str],
        convention: &dyn CallingConvention,
    ) -> Result<String> {
        let mut encoded = Vec::with_capacity(args.len());
        for arg in args {
            match self.encode_inner(arg) {
                Ok(slice) => encoded.push(slice),
                Err(e) => {
                    let released = self.release_all(&encoded);
                    return Err(Self::prefer(e, released));
                }
            }
        }

        let outcome = self
            .invoke_inner(function, &encoded, convention)
            .and_then(|result| self.take_result(result));

        // 无论调用成功与否，都必须释放参数内存
        let released = self.release_all(&encoded);
        match outcome {
            Ok(output) => released.map(|_| output),
            Err(e) => Err(Self::prefer(e, released)),
        }
    }

    fn encode_inner(&mut self, input: &str) -> Result<GuestSlice> {
        let bytes = input.as_bytes();
        let len = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len <= self.max_string_len)
            .ok_or(BridgeError::InputTooLarge {
                len: bytes.len(),
                limit: self.max_string_len,
            })?;

        let ptr = self
            .allocate
            .call(&mut self.store, len)
            .map_err(|e| guest_trap(&self.exports.allocate, e))?;
        self.stats.allocations += 1;

        if ptr == OOM_SENTINEL && len > 0 {
            tracing::warn!("Guest allocator failed to provide {} bytes", len);
            return Err(BridgeError::Allocation { requested: len });
        }

        let slice = GuestSlice::new(ptr, len);
        self.ledger.record_buffer(slice)?;

        // 确保即使写入失败也能释放内存
        if let Err(e) = self.memory.write(&mut self.store, slice, bytes) {
            if let Err(free_err) = self.free_inner(slice) {
                tracing::error!("Failed to free guest buffer after write error: {}", free_err);
            }
            return Err(e);
        }

        self.stats.bytes_in += len as u64;
        Ok(slice)
    }

    fn invoke_inner(
        &mut self,
        function: &str,
        args: &[GuestSlice],
        convention: &dyn CallingConvention,
    ) -> Result<GuestResult> {
        let func = self
            .instance
            .get_func(&mut self.store, function)
            .ok_or_else(|| BridgeError::missing_export(function, "no function export with this name"))?;

        let ty = func.ty(&self.store);
        let expected_params = args.len() * 2;
        if ty.params().len() != expected_params || !ty.params().all(|t| matches!(t, ValType::I32)) {
            return Err(BridgeError::Signature {
                name: function.to_string(),
                reason: format!(
                    "expected {} i32 params for {} string argument(s), found {}",
                    expected_params,
                    args.len(),
                    ty.params().len()
                ),
            });
        }
        if ty.results().len() != convention.result_arity()
            || !ty.results().all(|t| matches!(t, ValType::I32))
        {
            return Err(BridgeError::Signature {
                name: function.to_string(),
                reason: format!(
                    "{} convention needs {} i32 result(s), found {}",
                    convention.name(),
                    convention.result_arity(),
                    ty.results().len()
                ),
            });
        }
        // 调用前检查，避免结果无法释放而泄漏
        if convention.releases_with_free_result() && self.free_result.is_none() {
            return Err(BridgeError::missing_export(
                &self.exports.free_result,
                "required to release descriptor results",
            ));
        }

        let params: Vec<Val> = args
            .iter()
            .flat_map(|arg| [Val::I32(arg.ptr as i32), Val::I32(arg.len as i32)])
            .collect();
        let mut results = vec![Val::I32(0); convention.result_arity()];

        tracing::debug!(
            "Invoking guest '{}' with {} argument(s) ({} convention)",
            function,
            args.len(),
            convention.name()
        );
        self.stats.invocations += 1;
        func.call(&mut self.store, &params, &mut results)
            .map_err(|e| guest_trap(function, e))?;

        let result = convention.resolve(function, &self.memory, &self.store, &results)?;
        match result {
            GuestResult::Descriptor { address, .. } => self.ledger.record_descriptor(address)?,
            GuestResult::Direct(slice) => self.ledger.record_buffer(slice)?,
        }
        Ok(result)
    }

    /// Copy the result out exactly once, release it, then decode the copy.
    fn take_result(&mut self, result: GuestResult) -> Result<String> {
        let copied = self.memory.read(&self.store, result.slice());
        let released = self.release_result(result);

        let bytes = match (copied, released) {
            (Ok(bytes), Ok(())) => bytes,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Ok(())) => return Err(e),
            (Err(e1), Err(e2)) => {
                tracing::error!("Failed to release guest result: {}", e2);
                return Err(e1);
            }
        };

        self.stats.bytes_out += bytes.len() as u64;
        Ok(String::from_utf8(bytes)?)
    }

    fn release_result(&mut self, result: GuestResult) -> Result<()> {
        match result {
            GuestResult::Descriptor { address, .. } => self.free_result_inner(address),
            GuestResult::Direct(slice) => self.free_inner(slice),
        }
    }

    fn free_inner(&mut self, slice: GuestSlice) -> Result<()> {
        self.ledger.release_buffer(slice)?;
        self.free
            .call(&mut self.store, (slice.ptr, slice.len))
            .map_err(|e| {
                BridgeError::memory_contract(format!(
                    "guest '{}' failed for {:#x}+{}: {e:#}",
                    self.exports.free, slice.ptr, slice.len
                ))
            })?;
        self.stats.frees += 1;
        Ok(())
    }

    fn free_result_inner(&mut self, address: u32) -> Result<()> {
        let free_result = self.free_result.as_ref().ok_or_else(|| {
            BridgeError::missing_export(
                &self.exports.free_result,
                "required to release descriptor results",
            )
        })?;
        self.ledger.release_descriptor(address)?;
        free_result.call(&mut self.store, address).map_err(|e| {
            BridgeError::memory_contract(format!(
                "guest '{}' failed for descriptor {:#x}: {e:#}",
                self.exports.free_result, address
            ))
        })?;
        self.stats.result_frees += 1;
        Ok(())
    }

    /// Release every buffer, reporting the first failure.
    fn release_all(&mut self, slices: &[GuestSlice]) -> Result<()> {
        let mut first_err = None;
        for slice in slices {
            if let Err(e) = self.free_inner(*slice) {
                tracing::error!("Failed to free guest argument buffer: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn call_scalar_inner<P, R>(&mut self, function: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = typed_export::<P, R>(&self.instance, &mut self.store, function)?;
        self.stats.invocations += 1;
        func.call(&mut self.store, params)
            .map_err(|e| guest_trap(function, e))
    }

    /// A release failure outranks a recoverable primary error.
    fn prefer(primary: BridgeError, released: Result<()>) -> BridgeError {
        match released {
            Ok(()) => primary,
            Err(secondary) if primary.is_recoverable() => secondary,
            Err(secondary) => {
                tracing::error!("Release also failed after '{}': {}", primary, secondary);
                primary
            }
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.poisoned {
            Some(reason) => Err(BridgeError::Poisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.poisons_instance() && self.poisoned.is_none() {
                tracing::error!("Guest instance poisoned: {}", e);
                self.poisoned = Some(e.to_string());
            } else if e.is_recoverable() {
                tracing::warn!("Bridge call failed: {}", e);
            }
        }
        result
    }
}

impl Drop for StringBridge {
    fn drop(&mut self) {
        let outstanding = self.ledger.outstanding();
        if outstanding > 0 {
            tracing::warn!(
                "Dropping bridge with {} unreleased guest allocation(s)",
                outstanding
            );
        }
    }
}

fn typed_export<P, R>(instance: &Instance, store: &mut Store<HostState>, name: &str) -> Result<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BridgeError::missing_export(name, "no function export with this name"))?;
    func.typed::<P, R>(&*store).map_err(|e| BridgeError::Signature {
        name: name.to_string(),
        reason: format!("{e:#}"),
    })
}

fn guest_trap(function: &str, err: anyhow::Error) -> BridgeError {
    BridgeError::GuestTrap {
        function: function.to_string(),
        reason: format!("{err:#}"),
    }
}
