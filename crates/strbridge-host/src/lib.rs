pub mod bridge;
pub mod convention;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod memory;
pub mod wasm_host;

pub use bridge::{BridgeStats, StringBridge};
pub use convention::{
    convention_for, CallingConvention, DescriptorConvention, GuestResult, MultiValueConvention,
};
pub use error::{BridgeError, Result};
pub use ledger::AllocationLedger;
pub use manager::BridgeManager;
pub use memory::GuestMemory;
pub use wasm_host::{HostState, WasmHost};
