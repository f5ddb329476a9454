/// Export `allocate`, `free` and `free_result`.
/// This is REQUIRED for the host to pass strings in and release results.
#[macro_export]
macro_rules! export_allocator {
    () => {
        #[no_mangle]
        pub extern "C" fn allocate(size: usize) -> *mut u8 {
            $crate::heap::allocate(size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn free(ptr: *mut u8, size: usize) {
            $crate::heap::free(ptr, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn free_result(desc: *mut $crate::ResultDescriptor) {
            $crate::heap::free_result(desc)
        }
    };
}

/// Export a `fn(&str, ..) -> String` as a descriptor-returning guest function.
///
/// ```ignore
/// fn greeting(name: &str) -> String { format!("Hello, {}!", name) }
/// export_str_fn!(greet(str) => greeting);
/// ```
#[macro_export]
macro_rules! export_str_fn {
    ($name:ident(str) => $func:path) => {
        #[no_mangle]
        pub unsafe extern "C" fn $name(ptr: *const u8, len: usize) -> *mut $crate::ResultDescriptor {
            let input = $crate::read_str_from_host(ptr, len);
            $crate::ResultDescriptor::into_raw($func(&input))
        }
    };
    ($name:ident(str, str) => $func:path) => {
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            a_ptr: *const u8,
            a_len: usize,
            b_ptr: *const u8,
            b_len: usize,
        ) -> *mut $crate::ResultDescriptor {
            let a = $crate::read_str_from_host(a_ptr, a_len);
            let b = $crate::read_str_from_host(b_ptr, b_len);
            $crate::ResultDescriptor::into_raw($func(&a, &b))
        }
    };
}

/// Helper to read a String passed by the Host.
///
/// # Safety
///
/// Unless `len` is zero, `[ptr, ptr + len)` must be a readable buffer the
/// host filled through `allocate` for this call.
pub unsafe fn read_str_from_host(ptr: *const u8, len: usize) -> String {
    if ptr.is_null() || len == 0 {
        return String::new();
    }
    let slice = std::slice::from_raw_parts(ptr, len);
    String::from_utf8_lossy(slice).into_owned()
}
