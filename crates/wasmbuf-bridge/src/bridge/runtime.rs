//! Bridge runtime implementation using wasmtime.
//!
//! Uses wasmtime-wasi preview1 so modules built for `wasm32-wasip1` link
//! without changes; modules built for `wasm32-unknown-unknown` simply never
//! call into it.

use super::alloc::Allocator;
use super::config::{BridgeConfig, WasiCapabilities};
use super::transfer::Bridge;
use crate::error::{BridgeError, Result};

use std::path::Path;

use wasmtime::*;

/// Host state for the bridge store, containing WASI preview1 context.
pub struct HostState {
    wasi: wasmtime_wasi::preview1::WasiP1Ctx,
    limits: StoreLimits,
}

impl HostState {
    /// Get the preview1 context.
    fn wasi(&mut self) -> &mut wasmtime_wasi::preview1::WasiP1Ctx {
        &mut self.wasi
    }
}

/// Compiles transform modules and instantiates bridges over them.
pub struct BridgeRuntime {
    engine: Engine,
    config: BridgeConfig,
}

/// A compiled transform module.
pub struct BridgeModule {
    module: Module,
    name: String,
}

impl BridgeRuntime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let mut engine_config = Config::new();

        engine_config.cranelift_opt_level(match config.optimization_level {
            0 => OptLevel::None,
            1 => OptLevel::Speed,
            _ => OptLevel::SpeedAndSize,
        });

        // Enable fuel metering if configured
        if config.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        // Configure caching if path provided
        if let Some(ref cache_path) = config.cache_path {
            if let Err(e) = engine_config.cache_config_load(cache_path) {
                tracing::warn!("Failed to load cache config: {}", e);
            }
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Wasm(format!("engine creation failed: {}", e)))?;

        Ok(Self { engine, config })
    }

    /// Load a module from a `.wasm` (or `.wat`) file.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<BridgeModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let bytes = std::fs::read(path)?;
        self.load_module_bytes(&name, &bytes)
    }

    /// Load a module from binary or text bytes.
    pub fn load_module_bytes(&self, name: &str, bytes: &[u8]) -> Result<BridgeModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::Wasm(format!("module creation failed: {}", e)))?;

        Ok(BridgeModule {
            module,
            name: name.to_string(),
        })
    }

    /// Instantiate a module and wrap it in a bridge.
    pub fn instantiate(&self, module: &BridgeModule) -> Result<Bridge> {
        let host_state = self.build_host_state(&self.config.capabilities);
        let mut store = Store::new(&self.engine, host_state);

        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = self.config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {}", e)))?;
        }

        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state| state.wasi())
            .map_err(|e| BridgeError::Wasm(format!("WASI link failed: {}", e)))?;

        // wasm-bindgen output imports placeholder functions it never calls
        if self.config.trap_unknown_imports {
            linker
                .define_unknown_imports_as_traps(&module.module)
                .map_err(|e| BridgeError::Wasm(format!("import stubbing failed: {}", e)))?;
        }

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| BridgeError::Wasm(format!("instantiation failed: {}", e)))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::MissingExport {
                name: "memory".to_string(),
            })?;

        let allocator = Allocator::resolve(&mut store, &instance, &self.config.exports)?;

        tracing::debug!(
            module = %module.name,
            memory = memory.data_size(&store),
            "instantiated transform module"
        );

        Ok(Bridge::new(
            module.name.clone(),
            store,
            instance,
            memory,
            allocator,
            &self.config,
        ))
    }

    /// Build host state from capabilities.
    fn build_host_state(&self, caps: &WasiCapabilities) -> HostState {
        let mut builder = wasmtime_wasi::WasiCtxBuilder::new();

        if caps.stdout {
            builder.inherit_stdout();
        }
        if caps.stderr {
            builder.inherit_stderr();
        }

        for (key, value) in &caps.env_vars {
            builder.env(key, value);
        }

        builder.args(&caps.args);

        let wasi = builder.build_p1();

        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory)
            .build();

        HostState { wasi, limits }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl BridgeModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }
}
