//! Host/guest string ABI.
//!
//! Strings cross the boundary as a pointer+length pair into the guest's
//! linear memory. Guest functions that can only return one `i32` hand back
//! the address of a two-word result descriptor instead.

use serde::{Deserialize, Serialize};

/// Returned by `allocate` when the guest could not satisfy a non-zero request.
pub const OOM_SENTINEL: u32 = 0;

/// Number of 32-bit words in a result descriptor: `[ptr, len]`.
pub const DESCRIPTOR_WORDS: usize = 2;

/// Byte size of a result descriptor.
pub const DESCRIPTOR_SIZE: u32 = (DESCRIPTOR_WORDS * 4) as u32;

/// Descriptors are read as 32-bit words, so their address must be word aligned.
pub const DESCRIPTOR_ALIGN: u32 = 4;

/// Longest guest log message the host forwards; longer ones are cut.
pub const MAX_LOG_MESSAGE_LEN: u32 = 4096;

/// A UTF-8 byte range inside guest linear memory.
///
/// The pair is not self-describing: whether `ptr..ptr+len` is actually owned
/// by the caller is a contract between host and guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestSlice {
    pub ptr: u32,
    pub len: u32,
}

impl GuestSlice {
    pub fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    /// One past the last byte, computed without wrapping.
    pub fn end(&self) -> u64 {
        self.ptr as u64 + self.len as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decode the eight descriptor bytes: word 0 is the pointer, word 1 the length.
pub fn decode_descriptor(bytes: [u8; DESCRIPTOR_SIZE as usize]) -> GuestSlice {
    let ptr = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    GuestSlice { ptr, len }
}

pub fn encode_descriptor(slice: GuestSlice) -> [u8; DESCRIPTOR_SIZE as usize] {
    let mut out = [0u8; DESCRIPTOR_SIZE as usize];
    out[..4].copy_from_slice(&slice.ptr.to_le_bytes());
    out[4..].copy_from_slice(&slice.len.to_le_bytes());
    out
}

/// Names of the exports every guest must provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    pub allocate: String,
    pub free: String,
    pub free_result: String,
    pub memory: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            allocate: "allocate".to_string(),
            free: "free".to_string(),
            free_result: "free_result".to_string(),
            memory: "memory".to_string(),
        }
    }
}

/// How a guest function hands its string result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionKind {
    /// Single `i32` return: address of a `[ptr, len]` descriptor.
    #[default]
    Descriptor,
    /// Two `i32` returns: `(ptr, len)`.
    MultiValue,
}
