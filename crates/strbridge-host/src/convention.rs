//! Calling conventions for guest functions that return a string.
//!
//! A guest string function takes `(ptr, len)` pairs and must tell the host
//! where its answer lives. Guests limited to a single return value write a
//! `[ptr, len]` descriptor and return its address; guests built with
//! multi-value returns can return the pair directly. Call sites only see
//! `GuestResult`, so either can be swapped in.

use std::sync::Arc;
use strbridge_types::{ConventionKind, GuestSlice};
use wasmtime::{Store, Val};

use crate::{BridgeError, GuestMemory, HostState, Result};

/// Where a guest result lives and how it must be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestResult {
    /// Released with `free_result(address)`, which also frees `slice`.
    Descriptor { address: u32, slice: GuestSlice },
    /// Released with `free(ptr, len)`.
    Direct(GuestSlice),
}

impl GuestResult {
    pub fn slice(&self) -> GuestSlice {
        match self {
            GuestResult::Descriptor { slice, .. } => *slice,
            GuestResult::Direct(slice) => *slice,
        }
    }
}

pub trait CallingConvention: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of `i32` results the guest function must declare.
    fn result_arity(&self) -> usize;

    /// Whether results are handed back through the guest's `free_result`.
    fn releases_with_free_result(&self) -> bool;

    /// Turn the raw results of a call to `function` into a result location.
    fn resolve(
        &self,
        function: &str,
        memory: &GuestMemory,
        store: &Store<HostState>,
        results: &[Val],
    ) -> Result<GuestResult>;
}

/// Single `i32` return holding the address of a two-word descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorConvention;

impl CallingConvention for DescriptorConvention {
    fn name(&self) -> &'static str {
        "descriptor"
    }

    fn result_arity(&self) -> usize {
        1
    }

    fn releases_with_free_result(&self) -> bool {
        true
    }

    fn resolve(
        &self,
        function: &str,
        memory: &GuestMemory,
        store: &Store<HostState>,
        results: &[Val],
    ) -> Result<GuestResult> {
        let address = result_word(function, results, 0)?;
        let slice = memory.read_descriptor(store, address)?;
        Ok(GuestResult::Descriptor { address, slice })
    }
}

/// Two `i32` returns: `(ptr, len)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiValueConvention;

impl CallingConvention for MultiValueConvention {
    fn name(&self) -> &'static str {
        "multi_value"
    }

    fn result_arity(&self) -> usize {
        2
    }

    fn releases_with_free_result(&self) -> bool {
        false
    }

    fn resolve(
        &self,
        function: &str,
        _memory: &GuestMemory,
        _store: &Store<HostState>,
        results: &[Val],
    ) -> Result<GuestResult> {
        let ptr = result_word(function, results, 0)?;
        let len = result_word(function, results, 1)?;
        Ok(GuestResult::Direct(GuestSlice::new(ptr, len)))
    }
}

pub fn convention_for(kind: ConventionKind) -> Arc<dyn CallingConvention> {
    match kind {
        ConventionKind::Descriptor => Arc::new(DescriptorConvention),
        ConventionKind::MultiValue => Arc::new(MultiValueConvention),
    }
}

fn result_word(function: &str, results: &[Val], index: usize) -> Result<u32> {
    match results.get(index) {
        Some(Val::I32(value)) => Ok(*value as u32),
        other => Err(BridgeError::Signature {
            name: function.to_string(),
            reason: format!("expected i32 result #{}, got {:?}", index, other),
        }),
    }
}
