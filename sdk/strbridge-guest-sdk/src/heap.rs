use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use std::ptr::{self, NonNull};

use crate::ResultDescriptor;

fn layout_for(size: usize) -> Option<Layout> {
    Layout::from_size_align(size, mem::align_of::<usize>()).ok()
}

/// Allocate `size` bytes for the host.
///
/// Zero-size requests get a dangling, aligned, non-null pointer. Allocation
/// failure returns null, which the host reads as the out-of-memory sentinel.
pub fn allocate(size: usize) -> *mut u8 {
    let layout = match layout_for(size) {
        Some(layout) => layout,
        None => return ptr::null_mut(),
    };

    if layout.size() == 0 {
        return NonNull::<usize>::dangling().as_ptr() as *mut u8;
    }

    unsafe { alloc(layout) }
}

/// Release a buffer returned by [`allocate`].
///
/// # Safety
///
/// `ptr` must come from `allocate(size)` with the same `size` and must not
/// have been freed already.
pub unsafe fn free(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    if let Some(layout) = layout_for(size) {
        dealloc(ptr, layout);
    }
}

/// Release a result descriptor and the string it points to.
///
/// # Safety
///
/// `desc` must come from [`ResultDescriptor::into_raw`] and must not have
/// been released already.
pub unsafe fn free_result(desc: *mut ResultDescriptor) {
    ResultDescriptor::release(desc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let ptr = allocate(32);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % mem::align_of::<usize>(), 0);

        unsafe {
            ptr.write_bytes(0xab, 32);
            free(ptr, 32);
        }
    }

    #[test]
    fn test_zero_size_is_not_the_sentinel() {
        let ptr = allocate(0);
        assert!(!ptr.is_null());
        unsafe { free(ptr, 0) };
    }

    #[test]
    fn test_impossible_layout_returns_null() {
        assert!(allocate(usize::MAX).is_null());
    }
}
