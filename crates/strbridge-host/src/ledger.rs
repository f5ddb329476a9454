use std::collections::{HashMap, HashSet};
use strbridge_types::GuestSlice;

use crate::{BridgeError, Result};

/// Host-side record of every guest allocation the bridge still owns.
///
/// Buffers are keyed by `(ptr, len)` with a live count. Only zero-size
/// buffers may be recorded more than once, since they can share an address;
/// a live non-empty buffer showing up again would end up freed twice.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    buffers: HashMap<GuestSlice, usize>,
    descriptors: HashSet<u32>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_buffer(&mut self, slice: GuestSlice) -> Result<()> {
        let count = self.buffers.entry(slice).or_insert(0);
        if *count > 0 && !slice.is_empty() {
            return Err(BridgeError::memory_contract(format!(
                "guest handed out live buffer {:#x}+{} twice",
                slice.ptr, slice.len
            )));
        }
        *count += 1;
        Ok(())
    }

    /// Forget a buffer before it is freed; unknown buffers are a contract violation.
    pub fn release_buffer(&mut self, slice: GuestSlice) -> Result<()> {
        match self.buffers.get_mut(&slice) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(())
            }
            Some(_) => {
                self.buffers.remove(&slice);
                Ok(())
            }
            None => Err(BridgeError::memory_contract(format!(
                "free of unknown or already freed buffer {:#x}+{}",
                slice.ptr, slice.len
            ))),
        }
    }

    pub fn record_descriptor(&mut self, address: u32) -> Result<()> {
        if self.descriptors.insert(address) {
            Ok(())
        } else {
            Err(BridgeError::memory_contract(format!(
                "guest returned live result descriptor {:#x} twice",
                address
            )))
        }
    }

    pub fn release_descriptor(&mut self, address: u32) -> Result<()> {
        if self.descriptors.remove(&address) {
            Ok(())
        } else {
            Err(BridgeError::memory_contract(format!(
                "free of unknown or already freed result descriptor {:#x}",
                address
            )))
        }
    }

    /// Number of buffers and descriptors not yet released.
    pub fn outstanding(&self) -> usize {
        self.buffers.values().sum::<usize>() + self.descriptors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_once() {
        let mut ledger = AllocationLedger::new();
        let slice = GuestSlice::new(1024, 4);

        ledger.record_buffer(slice).unwrap();
        assert_eq!(ledger.outstanding(), 1);
        assert!(ledger.release_buffer(slice).is_ok());
        assert_eq!(ledger.outstanding(), 0);

        // 第二次释放必须报错
        let err = ledger.release_buffer(slice).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_release_requires_matching_length() {
        let mut ledger = AllocationLedger::new();
        ledger.record_buffer(GuestSlice::new(1024, 4)).unwrap();
        assert!(ledger.release_buffer(GuestSlice::new(1024, 8)).is_err());
    }

    #[test]
    fn test_zero_size_allocations_share_address() {
        let mut ledger = AllocationLedger::new();
        let empty = GuestSlice::new(1024, 0);

        ledger.record_buffer(empty).unwrap();
        ledger.record_buffer(empty).unwrap();
        ledger.record_buffer(GuestSlice::new(1024, 8)).unwrap();
        assert_eq!(ledger.outstanding(), 3);

        assert!(ledger.release_buffer(empty).is_ok());
        assert!(ledger.release_buffer(empty).is_ok());
        assert!(ledger.release_buffer(empty).is_err());
        assert_eq!(ledger.outstanding(), 1);
    }

    #[test]
    fn test_descriptor_double_free() {
        let mut ledger = AllocationLedger::new();
        ledger.record_descriptor(2048).unwrap();
        assert!(ledger.release_descriptor(2048).is_ok());
        assert!(matches!(
            ledger.release_descriptor(2048),
            Err(BridgeError::MemoryContract(_))
        ));
    }

    #[test]
    fn test_live_buffer_recorded_twice() {
        let mut ledger = AllocationLedger::new();
        let slice = GuestSlice::new(1024, 4);

        ledger.record_buffer(slice).unwrap();
        let err = ledger.record_buffer(slice).unwrap_err();
        assert!(err.poisons_instance());

        // 仍然只能释放一次
        assert_eq!(ledger.outstanding(), 1);
        assert!(ledger.release_buffer(slice).is_ok());
        assert!(ledger.release_buffer(slice).is_err());

        // 释放后同一地址可以再次分配
        assert!(ledger.record_buffer(slice).is_ok());
    }

    #[test]
    fn test_live_descriptor_recorded_twice() {
        let mut ledger = AllocationLedger::new();
        ledger.record_descriptor(2048).unwrap();
        assert!(matches!(
            ledger.record_descriptor(2048),
            Err(BridgeError::MemoryContract(_))
        ));
        assert_eq!(ledger.outstanding(), 1);
    }
}
