//! Guest logging through the host's `env.log_*` imports.
//!
//! Messages are cut to [`MAX_LOG_MESSAGE_LEN`] bytes on a character boundary
//! before they cross the boundary. Outside wasm32 there is no host to talk
//! to and logging is a no-op.

use strbridge_types::MAX_LOG_MESSAGE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_arch = "wasm32")]
mod host {
    #[link(wasm_import_module = "env")]
    extern "C" {
        pub fn log_trace(ptr: u32, len: u32);
        pub fn log_debug(ptr: u32, len: u32);
        pub fn log_info(ptr: u32, len: u32);
        pub fn log_warn(ptr: u32, len: u32);
        pub fn log_error(ptr: u32, len: u32);
    }
}

/// Send `msg` to the host at `level`. Empty messages are skipped.
pub fn log(level: Level, msg: &str) {
    let msg = truncate(msg);
    if !msg.is_empty() {
        emit(level, msg);
    }
}

/// Longest prefix of `msg` that fits the host's log cap.
pub fn truncate(msg: &str) -> &str {
    let max = MAX_LOG_MESSAGE_LEN as usize;
    if msg.len() <= max {
        return msg;
    }
    let mut end = max;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    &msg[..end]
}

#[cfg(target_arch = "wasm32")]
fn emit(level: Level, msg: &str) {
    let (ptr, len) = (msg.as_ptr() as u32, msg.len() as u32);
    // SAFETY: the host only reads `len` bytes at `ptr` during the call.
    unsafe {
        match level {
            Level::Trace => host::log_trace(ptr, len),
            Level::Debug => host::log_debug(ptr, len),
            Level::Info => host::log_info(ptr, len),
            Level::Warn => host::log_warn(ptr, len),
            Level::Error => host::log_error(ptr, len),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn emit(_level: Level, _msg: &str) {}

/// ```ignore
/// info!("Greeting {} bytes", name.len());
/// ```
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::Level::Info, &::std::format!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::Level::Trace, &::std::format!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::Level::Debug, &::std::format!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::Level::Warn, &::std::format!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::Level::Error, &::std::format!($($arg)*))
    };
}
