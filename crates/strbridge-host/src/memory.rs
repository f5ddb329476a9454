//! Bounds-checked access to guest linear memory.
//!
//! Linear memory may be relocated whenever the guest grows it, so no byte
//! view is kept between calls: every access re-borrows the live data from the
//! store and validates the requested range against its current size.

use std::ops::Range;
use strbridge_types::{decode_descriptor, GuestSlice, DESCRIPTOR_ALIGN, DESCRIPTOR_SIZE};
use wasmtime::{AsContext, AsContextMut, Memory};

use crate::{BridgeError, Result};

#[derive(Debug, Clone, Copy)]
pub struct GuestMemory {
    memory: Memory,
}

impl GuestMemory {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// Current size in bytes.
    pub fn size(&self, store: impl AsContext) -> usize {
        self.memory.data_size(&store)
    }

    /// Copy `bytes` into the guest buffer described by `slice`.
    pub fn write(&self, mut store: impl AsContextMut, slice: GuestSlice, bytes: &[u8]) -> Result<()> {
        if bytes.len() != slice.len as usize {
            return Err(BridgeError::memory_contract(format!(
                "writing {} bytes into a {} byte buffer at {:#x}",
                bytes.len(),
                slice.len,
                slice.ptr
            )));
        }

        let data = self.memory.data_mut(store.as_context_mut());
        let range = checked_range(data.len(), slice)?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy the bytes of `slice` out of guest memory.
    pub fn read(&self, store: impl AsContext, slice: GuestSlice) -> Result<Vec<u8>> {
        let data = self.memory.data(store.as_context());
        let range = checked_range(data.len(), slice)?;
        Ok(data[range].to_vec())
    }

    /// Resolve the `[ptr, len]` result descriptor stored at `address`.
    pub fn read_descriptor(&self, store: impl AsContext, address: u32) -> Result<GuestSlice> {
        if address % DESCRIPTOR_ALIGN != 0 {
            return Err(BridgeError::memory_contract(format!(
                "result descriptor at {:#x} is not {}-byte aligned",
                address, DESCRIPTOR_ALIGN
            )));
        }

        let data = self.memory.data(store.as_context());
        let range = checked_range(data.len(), GuestSlice::new(address, DESCRIPTOR_SIZE))?;
        let mut words = [0u8; DESCRIPTOR_SIZE as usize];
        words.copy_from_slice(&data[range]);
        Ok(decode_descriptor(words))
    }
}

/// Validate `ptr + len <= memory_len` and return the byte range.
pub(crate) fn checked_range(memory_len: usize, slice: GuestSlice) -> Result<Range<usize>> {
    if slice.end() > memory_len as u64 {
        return Err(BridgeError::memory_contract(format!(
            "range {:#x}..{:#x} exceeds linear memory of {} bytes",
            slice.ptr,
            slice.end(),
            memory_len
        )));
    }
    Ok(slice.ptr as usize..slice.end() as usize)
}
