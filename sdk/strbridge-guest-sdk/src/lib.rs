//! Guest side of the string bridge.
//!
//! A guest module built with this crate exports the allocator contract the
//! host relies on (`allocate`, `free`, `free_result`) and string functions
//! that take `(ptr, len)` and return the address of a result descriptor.

pub mod descriptor;
pub mod heap;
pub mod logging;
pub mod macros;

pub use descriptor::ResultDescriptor;
pub use macros::read_str_from_host;
