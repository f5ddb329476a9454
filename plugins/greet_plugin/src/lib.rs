use strbridge_guest_sdk::{debug, export_allocator, export_str_fn, trace, warn};

export_allocator!();

fn greeting(name: &str) -> String {
    trace!("greet called with {} bytes", name.len());
    if name.is_empty() {
        warn!("Empty name received");
    }
    format!("Hello, {}!", name)
}

fn uppercase(input: &str) -> String {
    debug!("Shouting {} chars", input.chars().count());
    input.to_uppercase()
}

fn join(a: &str, b: &str) -> String {
    let mut out = String::with_capacity(a.len() + b.len());
    out.push_str(a);
    out.push_str(b);
    out
}

export_str_fn!(greet(str) => greeting);
export_str_fn!(shout(str) => uppercase);
export_str_fn!(concat(str, str) => join);

#[no_mangle]
pub extern "C" fn add(a: u32, b: u32) -> u32 {
    a.wrapping_add(b)
}
