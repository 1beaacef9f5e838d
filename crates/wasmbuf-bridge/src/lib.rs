//! # wasmbuf
//!
//! Moves byte buffers in and out of transform modules running inside a
//! WebAssembly sandbox.
//!
//! The transforms themselves (compression, hashing, indexing, image
//! optimization, expression evaluation) are opaque to this crate. What it
//! provides is the buffer bridge around them:
//!
//! - input is copied into a region leased from the module's allocator
//! - the result comes back through a fixed scratch slot, not a return value
//! - results can be copied out or lent to a closure without copying
//! - every lease is released exactly once, whether the call succeeds, the
//!   module traps, or the closure fails
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wasmbuf_bridge::{BridgeConfig, BridgeRuntime, TransformOp};
//!
//! let runtime = BridgeRuntime::new(BridgeConfig::default())?;
//! let module = runtime.load_module("zlib.wasm")?;
//! let mut bridge = runtime.instantiate(&module)?;
//!
//! let packed = bridge.transform(&TransformOp::new("compress").arg(6), &data)?;
//! let checksum = bridge.transform_map(&"decompress".into(), &packed, crc32)?;
//! ```
//!
//! ## Errors
//!
//! A trap inside the module surfaces as a single [`BridgeError::Trap`] whose
//! message names only the module. Allocation failure inside the module is
//! not recoverable and aborts the process.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod error;

// Re-export main types
pub use bridge::{
    AllocatorExports, Bridge, BridgeConfig, BridgeModule, BridgeRuntime, BridgeStats,
    CallMetrics, Codec, IntView, LeaseLedger, TransformOp, WasiCapabilities,
};
pub use error::{BridgeError, Result};
