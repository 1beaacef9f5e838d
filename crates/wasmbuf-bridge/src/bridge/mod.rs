//! Host-side bridge for byte-buffer transforms running in a WASM sandbox.
//!
//! Transform modules (codecs, hashes, image optimizers, evaluators) export a
//! small ABI:
//!
//! ```text
//! alloc(len: i32) -> i32
//! free(ptr: i32, len: i32)
//! <transform>(scratch_base: i32, ptr: i32, len: i32, extra: i32...)
//! ```
//!
//! A transform writes the `(ptr, len)` of its result at `scratch_base`
//! instead of returning it. The bridge owns the buffers on both sides of
//! that exchange and releases each of them exactly once.
//!
//! ## Components
//!
//! - `views`: identity-checked byte and word views over linear memory
//! - `alloc`: leases through the module's allocator exports
//! - `scratch`: the fixed result descriptor slot
//! - `trap`: explicit call outcomes and trap translation
//! - `transfer`: the protocol tying the above together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wasmbuf_bridge::{BridgeConfig, BridgeError, BridgeRuntime};
//!
//! let runtime = BridgeRuntime::new(BridgeConfig::wasm_bindgen())?;
//! let module = runtime.load_module("lz4.wasm")?;
//! let mut bridge = runtime.instantiate(&module)?;
//!
//! let packed = bridge.codec().compress(b"hi hello aaaa")?;
//! let len = bridge.codec().decompress_with(&packed, |bytes| Ok::<_, BridgeError>(bytes.len()))?;
//! ```

mod alloc;
mod config;
mod ops;
mod runtime;
mod scratch;
mod stats;
mod transfer;
mod trap;
mod views;

pub use config::{AllocatorExports, BridgeConfig, WasiCapabilities, DEFAULT_SCRATCH_BASE};
pub use ops::{Codec, TransformOp};
pub use runtime::{BridgeModule, BridgeRuntime};
pub use stats::{BridgeStats, CallMetrics, LeaseLedger};
pub use transfer::Bridge;
pub use views::IntView;

#[cfg(test)]
mod tests;
