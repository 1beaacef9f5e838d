//! Tests for bridge configuration and module setup.

use super::*;
use crate::error::BridgeError;

use std::io::Write;

/// Copies its input into a fresh allocation. `free` is a no-op.
const ECHO_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $top (mut i32) (i32.const 256))
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $top))
    (global.set $top (i32.add (global.get $top) (local.get $len)))
    (local.get $ptr))
  (func (export "free") (param i32 i32))
  (func (export "echo") (param $slot i32) (param $ptr i32) (param $len i32)
    (local $out i32)
    (local.set $out (call $alloc (local.get $len)))
    (memory.copy (local.get $out) (local.get $ptr) (local.get $len))
    (i32.store (local.get $slot) (local.get $out))
    (i32.store offset=4 (local.get $slot) (local.get $len))))
"#;

/// Like the echo module, but `alloc` never returns for more than 100 bytes.
const GREEDY_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $top (mut i32) (i32.const 256))
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (if (i32.gt_u (local.get $len) (i32.const 100))
      (then (loop $forever (br $forever))))
    (local.set $ptr (global.get $top))
    (global.set $top (i32.add (global.get $top) (local.get $len)))
    (local.get $ptr))
  (func (export "free") (param i32 i32))
  (func (export "echo") (param $slot i32) (param $ptr i32) (param $len i32)
    (local $out i32)
    (local.set $out (call $alloc (local.get $len)))
    (memory.copy (local.get $out) (local.get $ptr) (local.get $len))
    (i32.store (local.get $slot) (local.get $out))
    (i32.store offset=4 (local.get $slot) (local.get $len))))
"#;

fn echo_bridge(config: BridgeConfig) -> Bridge {
    let runtime = BridgeRuntime::new(config).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("echo", ECHO_WAT.as_bytes())
        .expect("failed to load module");
    runtime.instantiate(&module).expect("failed to instantiate")
}

fn instantiate_err(wat: &str) -> BridgeError {
    let runtime = BridgeRuntime::new(BridgeConfig::default()).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("broken", wat.as_bytes())
        .expect("failed to load module");
    runtime
        .instantiate(&module)
        .err()
        .expect("instantiation should fail")
}

#[test]
fn test_bridge_config_default() {
    let config = BridgeConfig::default();
    assert_eq!(config.max_memory, 256 * 1024 * 1024);
    assert_eq!(config.scratch_base, DEFAULT_SCRATCH_BASE);
    assert_eq!(config.exports.alloc, "alloc");
    assert_eq!(config.exports.free, "free");
    assert!(config.fuel_limit.is_none());
    assert!(config.max_io_size.is_none());
    assert!(config.trap_unknown_imports);
}

#[test]
fn test_bridge_config_minimal() {
    let config = BridgeConfig::minimal();
    assert_eq!(config.max_memory, 64 * 1024 * 1024);
    assert!(config.fuel_limit.is_some());
    assert_eq!(config.max_io_size, Some(16 * 1024 * 1024));
}

#[test]
fn test_bridge_config_wasm_bindgen() {
    let config = BridgeConfig::wasm_bindgen();
    assert_eq!(config.exports, AllocatorExports::wasm_bindgen());
    assert_eq!(config.exports.alloc, "__wbindgen_malloc");
}

#[test]
fn test_bridge_config_development() {
    let config = BridgeConfig::development();
    assert_eq!(config.optimization_level, 0);
    assert!(config.capabilities.stdout);
    assert!(config.capabilities.stderr);
}

#[test]
fn test_bridge_config_builder() {
    let config = BridgeConfig::default()
        .max_memory(1024 * 1024)
        .fuel_limit(5_000)
        .optimize(9)
        .scratch_base(64)
        .max_io_size(4096)
        .trap_unknown_imports(false);

    assert_eq!(config.max_memory, 1024 * 1024);
    assert_eq!(config.fuel_limit, Some(5_000));
    assert_eq!(config.optimization_level, 2);
    assert_eq!(config.scratch_base, 64);
    assert_eq!(config.max_io_size, Some(4096));
    assert!(!config.trap_unknown_imports);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_rejects_bad_scratch_base() {
    for base in [0, 6, 13] {
        let err = BridgeConfig::default()
            .scratch_base(base)
            .validate()
            .expect_err("scratch base should be rejected");
        assert!(matches!(err, BridgeError::ConfigError(_)), "base {base}");
    }
}

#[test]
fn test_config_rejects_empty_export_names() {
    let config = BridgeConfig::default().exports(AllocatorExports {
        alloc: String::new(),
        free: "free".to_string(),
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_optimization_level() {
    let config = BridgeConfig {
        optimization_level: 3,
        ..Default::default()
    };
    assert!(config.validate().is_err());
    assert!(BridgeRuntime::new(config).is_err());
}

#[test]
fn test_config_from_json() {
    let config = BridgeConfig::from_json(
        r#"{"fuel_limit": 1000, "scratch_base": 16, "exports": {"alloc": "malloc", "free": "dealloc"}}"#,
    )
    .expect("valid config");

    assert_eq!(config.fuel_limit, Some(1000));
    assert_eq!(config.scratch_base, 16);
    assert_eq!(config.exports.alloc, "malloc");
    // Unspecified fields keep their defaults
    assert_eq!(config.max_memory, 256 * 1024 * 1024);
    assert!(config.trap_unknown_imports);
}

#[test]
fn test_config_from_json_errors() {
    let err = BridgeConfig::from_json("{not json").expect_err("malformed");
    assert!(matches!(err, BridgeError::ConfigError(_)));

    let err = BridgeConfig::from_json(r#"{"scratch_base": 3}"#).expect_err("misaligned");
    assert!(err.to_string().contains("scratch base 3"));
}

#[test]
fn test_config_load() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    write!(file, r#"{{"max_io_size": 1048576, "optimization_level": 1}}"#)
        .expect("failed to write config");

    let config = BridgeConfig::load(file.path()).expect("failed to load config");
    assert_eq!(config.max_io_size, Some(1024 * 1024));
    assert_eq!(config.optimization_level, 1);

    let err = BridgeConfig::load("/nonexistent/bridge.json").expect_err("missing file");
    assert!(matches!(err, BridgeError::Io(_)));
}

#[test]
fn test_wasi_capabilities_none() {
    let caps = WasiCapabilities::none();
    assert!(!caps.stdout);
    assert!(!caps.stderr);
    assert!(caps.env_vars.is_empty());
    assert!(caps.args.is_empty());
}

#[test]
fn test_wasi_capabilities_builder() {
    let caps = WasiCapabilities::none()
        .stdout(true)
        .stderr(true)
        .env("RUST_LOG", "debug")
        .arg("--fast");

    assert!(caps.stdout);
    assert!(caps.stderr);
    assert_eq!(caps.env_vars.len(), 1);
    assert_eq!(caps.args, vec!["--fast".to_string()]);
}

#[test]
fn test_runtime_creation() {
    let runtime = BridgeRuntime::new(BridgeConfig::default());
    assert!(runtime.is_ok());

    let runtime = BridgeRuntime::new(BridgeConfig::minimal()).expect("failed to create runtime");
    assert!(runtime.config().fuel_limit.is_some());
}

#[test]
fn test_load_invalid_module() {
    let runtime = BridgeRuntime::new(BridgeConfig::default()).expect("failed to create runtime");
    let err = runtime
        .load_module_bytes("junk", b"\0asm\x07\0\0\0garbage")
        .err()
        .expect("not a module");
    assert!(matches!(err, BridgeError::Wasm(_)));
}

#[test]
fn test_echo_round_trip() {
    let mut bridge = echo_bridge(BridgeConfig::default());
    let out = bridge
        .transform(&"echo".into(), b"across the boundary")
        .expect("echo failed");
    assert_eq!(out, b"across the boundary");

    let stats = bridge.stats();
    assert_eq!(stats.calls, 1);
    assert_eq!(stats.bytes_in, 19);
    assert_eq!(stats.bytes_out, 19);
    assert_eq!(stats.leases.outstanding(), 0);
}

#[test]
fn test_custom_scratch_base() {
    let mut bridge = echo_bridge(BridgeConfig::default().scratch_base(64));
    let len = bridge
        .transform_map(&"echo".into(), b"slot at 64", |bytes| bytes.len())
        .expect("echo failed");
    assert_eq!(len, 10);
    assert_eq!(bridge.stats().leases.outstanding(), 0);
}

#[test]
fn test_module_exports() {
    let runtime = BridgeRuntime::new(BridgeConfig::default()).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("echo", ECHO_WAT.as_bytes())
        .expect("failed to load module");

    assert_eq!(module.name(), "echo");
    let exports: Vec<&str> = module.exports().collect();
    assert_eq!(exports, vec!["alloc", "free", "echo"]);
}

#[test]
fn test_missing_memory_export() {
    let err = instantiate_err(
        r#"(module
          (func (export "alloc") (param i32) (result i32) (local.get 0))
          (func (export "free") (param i32 i32)))"#,
    );
    assert!(matches!(err, BridgeError::MissingExport { ref name } if name == "memory"));
}

#[test]
fn test_missing_allocator_export() {
    let err = instantiate_err(
        r#"(module
          (memory (export "memory") 1)
          (func (export "free") (param i32 i32)))"#,
    );
    assert!(matches!(err, BridgeError::MissingExport { ref name } if name == "alloc"));
}

#[test]
fn test_mistyped_allocator_export() {
    let err = instantiate_err(
        r#"(module
          (memory (export "memory") 1)
          (func (export "alloc") (param i32) (result i32) (local.get 0))
          (func (export "free") (param i32)))"#,
    );
    assert_eq!(
        err.to_string(),
        "export 'free' has the wrong signature, expected (i32, i32) -> ()"
    );
}

#[test]
fn test_wasi_imports_link() {
    let wat = r#"(module
      (import "wasi_snapshot_preview1" "fd_write"
        (func (param i32 i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (func (export "alloc") (param i32) (result i32) (i32.const 1024))
      (func (export "free") (param i32 i32)))"#;

    let runtime = BridgeRuntime::new(BridgeConfig::default().trap_unknown_imports(false))
        .expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("wasi", wat.as_bytes())
        .expect("failed to load module");
    assert!(runtime.instantiate(&module).is_ok());
}

#[test]
fn test_allocator_out_of_fuel_is_a_trap() {
    let runtime = BridgeRuntime::new(BridgeConfig::default().fuel_limit(100_000))
        .expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("greedy", GREEDY_WAT.as_bytes())
        .expect("failed to load module");
    let mut bridge = runtime.instantiate(&module).expect("failed to instantiate");

    let err = bridge
        .transform(&"echo".into(), &[7u8; 200])
        .expect_err("alloc spins until fuel runs out");
    assert_eq!(err.to_string(), "greedy: panic");
    assert_eq!(bridge.stats().traps, 1);
    assert_eq!(bridge.stats().leases.leased, 0);

    // Fuel is restored for the next call
    let out = bridge
        .transform(&"echo".into(), b"small")
        .expect("echo after fuel trap failed");
    assert_eq!(out, b"small");
    assert_eq!(bridge.stats().leases.outstanding(), 0);
}
