use std::path::PathBuf;
use thiserror::Error;

/// 字符串桥接错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Guest allocator returned the out-of-memory sentinel
    #[error("Guest allocator could not provide {requested} bytes")]
    Allocation { requested: u32 },

    #[error("Input of {len} bytes exceeds the {limit} byte limit")]
    InputTooLarge { len: usize, limit: u32 },

    /// Guest aborted execution; the instance may be in an undefined state
    #[error("Guest trapped in '{function}': {reason}")]
    GuestTrap { function: String, reason: String },

    #[error("Guest returned invalid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// Double free, unknown pointer, or an out-of-bounds guest-reported range
    #[error("Memory contract violation: {0}")]
    MemoryContract(String),

    #[error("Guest must export '{name}': {reason}")]
    MissingExport { name: String, reason: String },

    #[error("Export '{name}' has an unexpected signature: {reason}")]
    Signature { name: String, reason: String },

    #[error("Failed to load guest module: {0}")]
    Load(String),

    #[error("Failed to read guest module {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Guest instance is unusable after an earlier failure ({0}); reload it")]
    Poisoned(String),

    #[error("Bridge not found: {0}")]
    NotFound(String),

    #[error("Failed to acquire lock: {0}")]
    LockPoisoned(String),
}

/// 桥接结果类型
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn memory_contract(msg: impl Into<String>) -> Self {
        BridgeError::MemoryContract(msg.into())
    }

    pub fn missing_export(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::MissingExport {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// The single logical operation failed but the instance is still sound.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::Allocation { .. }
                | BridgeError::InputTooLarge { .. }
                | BridgeError::Encoding(_)
        )
    }

    /// Pointer bookkeeping is inconsistent; retrying cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::MemoryContract(_))
    }

    /// Whether the guest instance must be discarded after this error.
    pub fn poisons_instance(&self) -> bool {
        matches!(
            self,
            BridgeError::GuestTrap { .. } | BridgeError::MemoryContract(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let alloc = BridgeError::Allocation { requested: 4 };
        assert!(alloc.is_recoverable());
        assert!(!alloc.poisons_instance());

        let contract = BridgeError::memory_contract("double free");
        assert!(contract.is_fatal());
        assert!(contract.poisons_instance());
        assert!(!contract.is_recoverable());

        let trap = BridgeError::GuestTrap {
            function: "greet".to_string(),
            reason: "unreachable".to_string(),
        };
        assert!(trap.poisons_instance());
        assert!(!trap.is_fatal());
    }

    #[test]
    fn test_encoding_error_from_utf8() {
        let err: BridgeError = String::from_utf8(vec![0xff]).unwrap_err().into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("invalid UTF-8"));
    }

    #[test]
    fn test_missing_export_message() {
        let err = BridgeError::missing_export("allocate", "no function export with this name");
        assert!(err.to_string().contains("must export 'allocate'"));
    }
}
