use std::ptr;

/// `[ptr, len]` result record; two 32-bit words on wasm32.
#[repr(C)]
#[derive(Debug)]
pub struct ResultDescriptor {
    pub ptr: *mut u8,
    pub len: usize,
}

#[cfg(target_arch = "wasm32")]
const _: () = assert!(
    std::mem::size_of::<ResultDescriptor>() == strbridge_types::DESCRIPTOR_SIZE as usize
);

impl ResultDescriptor {
    /// Leak `output` and a descriptor pointing at it. The host must hand the
    /// returned address back to `free_result`.
    pub fn into_raw(output: String) -> *mut ResultDescriptor {
        let boxed = output.into_boxed_str();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Box::into_raw(Box::new(ResultDescriptor { ptr, len }))
    }

    /// # Safety
    ///
    /// `desc` must be null or come from [`ResultDescriptor::into_raw`] and
    /// not have been released yet.
    pub unsafe fn release(desc: *mut ResultDescriptor) {
        if desc.is_null() {
            return;
        }
        let desc = Box::from_raw(desc);
        let bytes = ptr::slice_from_raw_parts_mut(desc.ptr, desc.len);
        drop(Box::from_raw(bytes as *mut str));
    }
}
