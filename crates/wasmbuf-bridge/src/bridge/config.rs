//! Configuration for the buffer bridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Conventional scratch slot base used by wasm-bindgen style modules.
pub const DEFAULT_SCRATCH_BASE: u32 = 8;

/// WASI capability grants for a transform module.
///
/// Transform modules are pure byte-in/byte-out code, so everything starts
/// disabled. Stdout/stderr are the only grants that make sense for them
/// (guest-side panic messages end up there).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WasiCapabilities {
    /// Allow access to stdout
    pub stdout: bool,

    /// Allow access to stderr
    pub stderr: bool,

    /// Environment variables to expose
    pub env_vars: Vec<(String, String)>,

    /// Command-line arguments to pass
    pub args: Vec<String>,
}

impl WasiCapabilities {
    /// Create capabilities with nothing allowed (maximum isolation)
    pub fn none() -> Self {
        Self::default()
    }

    /// Create capabilities with stdout and stderr inherited
    pub fn with_stdio() -> Self {
        Self {
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    /// Builder: enable stdout
    pub fn stdout(mut self, allow: bool) -> Self {
        self.stdout = allow;
        self
    }

    /// Builder: enable stderr
    pub fn stderr(mut self, allow: bool) -> Self {
        self.stderr = allow;
        self
    }

    /// Builder: add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Builder: add command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Names of the allocator exports the bridge leases memory through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorExports {
    /// `alloc(len: u32) -> u32`
    pub alloc: String,
    /// `free(ptr: u32, len: u32)`
    pub free: String,
}

impl Default for AllocatorExports {
    fn default() -> Self {
        Self {
            alloc: "alloc".to_string(),
            free: "free".to_string(),
        }
    }
}

impl AllocatorExports {
    /// Allocator exports emitted by wasm-bindgen
    pub fn wasm_bindgen() -> Self {
        Self {
            alloc: "__wbindgen_malloc".to_string(),
            free: "__wbindgen_free".to_string(),
        }
    }
}

/// Configuration for the bridge runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WASI capability configuration
    pub capabilities: WasiCapabilities,

    /// Maximum linear memory in bytes (default = 256MB)
    pub max_memory: usize,

    /// Enable fuel-based execution limiting
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-2)
    pub optimization_level: u8,

    /// Cache compiled modules to disk
    pub cache_path: Option<PathBuf>,

    /// Byte offset of the scratch slot the transform exports write
    /// their result descriptor to
    pub scratch_base: u32,

    /// Allocator export names
    pub exports: AllocatorExports,

    /// Largest input accepted by a transform, in bytes
    pub max_io_size: Option<usize>,

    /// Satisfy imports the linker does not know with stubs that trap when called
    pub trap_unknown_imports: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capabilities: WasiCapabilities::none(),
            max_memory: 256 * 1024 * 1024, // 256 MB
            fuel_limit: None,
            optimization_level: 2,
            cache_path: None,
            scratch_base: DEFAULT_SCRATCH_BASE,
            exports: AllocatorExports::default(),
            max_io_size: None,
            trap_unknown_imports: true,
        }
    }
}

impl BridgeConfig {
    /// Create a minimal config for maximum isolation
    pub fn minimal() -> Self {
        Self {
            max_memory: 64 * 1024 * 1024,    // 64 MB
            fuel_limit: Some(1_000_000_000), // 1B fuel units
            max_io_size: Some(16 * 1024 * 1024),
            ..Default::default()
        }
    }

    /// Create config for modules generated by wasm-bindgen
    pub fn wasm_bindgen() -> Self {
        Self {
            exports: AllocatorExports::wasm_bindgen(),
            ..Default::default()
        }
    }

    /// Create config for development/debugging
    pub fn development() -> Self {
        Self {
            capabilities: WasiCapabilities::with_stdio(),
            optimization_level: 0, // Faster compilation
            ..Default::default()
        }
    }

    /// Parse a JSON config. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::ConfigError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that the config describes a usable ABI.
    pub fn validate(&self) -> Result<()> {
        if self.scratch_base == 0 || self.scratch_base % 4 != 0 {
            return Err(BridgeError::ConfigError(format!(
                "scratch base {} must be a non-zero multiple of 4",
                self.scratch_base
            )));
        }
        if self.exports.alloc.is_empty() || self.exports.free.is_empty() {
            return Err(BridgeError::ConfigError(
                "allocator export names must not be empty".to_string(),
            ));
        }
        if self.optimization_level > 2 {
            return Err(BridgeError::ConfigError(format!(
                "optimization level {} out of range (0-2)",
                self.optimization_level
            )));
        }
        Ok(())
    }

    /// Builder: set capabilities
    pub fn capabilities(mut self, caps: WasiCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(2);
        self
    }

    /// Builder: set cache path
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Builder: set scratch slot base
    pub fn scratch_base(mut self, base: u32) -> Self {
        self.scratch_base = base;
        self
    }

    /// Builder: set allocator export names
    pub fn exports(mut self, exports: AllocatorExports) -> Self {
        self.exports = exports;
        self
    }

    /// Builder: cap the input size
    pub fn max_io_size(mut self, bytes: usize) -> Self {
        self.max_io_size = Some(bytes);
        self
    }

    /// Builder: stub unknown imports with trapping functions
    pub fn trap_unknown_imports(mut self, enable: bool) -> Self {
        self.trap_unknown_imports = enable;
        self
    }
}
