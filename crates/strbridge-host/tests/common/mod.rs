#![allow(dead_code)]

use strbridge_config::BridgeConfig;
use strbridge_host::{StringBridge, WasmHost};

/// Guest with a bump allocator and a handful of string functions.
///
/// Every allocation is rounded up to 8 bytes, so descriptors are always word
/// aligned. `free` and `free_result` only count their calls.
pub const GREETER_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $frees (mut i32) (i32.const 0))
  (global $result_frees (mut i32) (i32.const 0))
  (data (i32.const 16) "Hello, ")

  (func $allocate (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr (global.get $heap))
    (local.set $end
      (i32.and
        (i32.add (i32.add (local.get $ptr) (local.get $size)) (i32.const 7))
        (i32.const -8)))
    (if (i32.gt_u (local.get $end) (i32.mul (memory.size) (i32.const 65536)))
      (then
        (if (i32.eq
              (memory.grow
                (i32.add
                  (i32.shr_u
                    (i32.sub (local.get $end) (i32.mul (memory.size) (i32.const 65536)))
                    (i32.const 16))
                  (i32.const 1)))
              (i32.const -1))
          (then (return (i32.const 0))))))
    (global.set $heap (local.get $end))
    (local.get $ptr))

  (func (export "free") (param $ptr i32) (param $size i32)
    (global.set $frees (i32.add (global.get $frees) (i32.const 1))))

  (func (export "free_result") (param $desc i32)
    (global.set $result_frees (i32.add (global.get $result_frees) (i32.const 1))))

  (func $descriptor (param $ptr i32) (param $len i32) (result i32)
    (local $desc i32)
    (local.set $desc (call $allocate (i32.const 8)))
    (i32.store (local.get $desc) (local.get $ptr))
    (i32.store offset=4 (local.get $desc) (local.get $len))
    (local.get $desc))

  (func $greeting (param $ptr i32) (param $len i32) (result i32)
    (local $out i32)
    (local.set $out (call $allocate (i32.add (local.get $len) (i32.const 8))))
    (memory.copy (local.get $out) (i32.const 16) (i32.const 7))
    (memory.copy (i32.add (local.get $out) (i32.const 7)) (local.get $ptr) (local.get $len))
    (i32.store8 (i32.add (i32.add (local.get $out) (i32.const 7)) (local.get $len)) (i32.const 33))
    (local.get $out))

  (func (export "greet") (param $ptr i32) (param $len i32) (result i32)
    (call $descriptor
      (call $greeting (local.get $ptr) (local.get $len))
      (i32.add (local.get $len) (i32.const 8))))

  (func (export "greet_pair") (param $ptr i32) (param $len i32) (result i32 i32)
    (call $greeting (local.get $ptr) (local.get $len))
    (i32.add (local.get $len) (i32.const 8)))

  (func (export "concat") (param $a i32) (param $a_len i32) (param $b i32) (param $b_len i32) (result i32)
    (local $out i32)
    (local.set $out (call $allocate (i32.add (local.get $a_len) (local.get $b_len))))
    (memory.copy (local.get $out) (local.get $a) (local.get $a_len))
    (memory.copy (i32.add (local.get $out) (local.get $a_len)) (local.get $b) (local.get $b_len))
    (call $descriptor (local.get $out) (i32.add (local.get $a_len) (local.get $b_len))))

  ;; hands the argument buffer back as its own result
  (func (export "echo") (param $ptr i32) (param $len i32) (result i32 i32)
    (local.get $ptr)
    (local.get $len))

  (func (export "invalid_utf8") (param $ptr i32) (param $len i32) (result i32)
    (local $out i32)
    (local.set $out (call $allocate (i32.const 2)))
    (i32.store8 (local.get $out) (i32.const 255))
    (i32.store8 offset=1 (local.get $out) (i32.const 254))
    (call $descriptor (local.get $out) (i32.const 2)))

  (func (export "explode") (param $ptr i32) (param $len i32) (result i32)
    unreachable)

  (func (export "misaligned") (param $ptr i32) (param $len i32) (result i32)
    (i32.add (call $descriptor (local.get $ptr) (local.get $len)) (i32.const 2)))

  (func (export "out_of_bounds") (param $ptr i32) (param $len i32) (result i32)
    (call $descriptor (i32.const 65000) (i32.const 100000)))

  ;; burns CPU for a while before returning an empty result
  (func (export "spin") (param $ptr i32) (param $len i32) (result i32)
    (local $i i32)
    (local.set $i (i32.const 500000000))
    (loop $busy
      (local.set $i (i32.sub (local.get $i) (i32.const 1)))
      (br_if $busy (local.get $i)))
    (call $descriptor (local.get $ptr) (i32.const 0)))

  (func (export "add") (param $a i32) (param $b i32) (result i32)
    (i32.add (local.get $a) (local.get $b)))

  (func (export "free_count") (result i32)
    (global.get $frees))

  (func (export "result_free_count") (result i32)
    (global.get $result_frees)))
"#;

/// Guest whose allocator always reports out-of-memory.
pub const EXHAUSTED_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "allocate") (param i32) (result i32)
    (i32.const 0))
  (func (export "free") (param i32 i32))
  (func (export "free_result") (param i32))
  (func (export "greet") (param i32 i32) (result i32)
    unreachable))
"#;

/// Guest without `free_result`: only usable with multi-value returns.
pub const NO_FREE_RESULT_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "allocate") (param i32) (result i32)
    (i32.const 1024))
  (func (export "free") (param i32 i32))
  (func (export "echo") (param $ptr i32) (param $len i32) (result i32 i32)
    (local.get $ptr)
    (i32.const 0))
  ;; descriptor style result, which this guest has no way to release
  (func (export "desc") (param $ptr i32) (param $len i32) (result i32)
    (i32.const 0)))
"#;

pub fn greeter() -> StringBridge {
    greeter_with(&BridgeConfig::default())
}

pub fn greeter_with(config: &BridgeConfig) -> StringBridge {
    let host = WasmHost::with_config(&config.engine).unwrap();
    StringBridge::from_bytes(&host, GREETER_WAT.as_bytes(), config).unwrap()
}
