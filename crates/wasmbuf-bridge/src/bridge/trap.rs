//! Trap translation.
//!
//! A transform export either returns normally or traps. The two cases are
//! reported as an explicit [`Outcome`] that the transfer protocol matches on;
//! nothing relies on unwinding to skip or run cleanup. A trap is surfaced to
//! the host as exactly one [`BridgeError::Trap`] carrying only the module
//! name: whatever the sandbox was doing when it trapped is not trustworthy,
//! so none of it is reported.

use wasmtime::{Func, Store, Val};

use crate::error::BridgeError;

/// How a transform export call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The export returned; the scratch slot holds its result descriptor.
    Completed,
    /// The export trapped; the scratch slot must not be read.
    Trapped,
}

/// Call a transform export and classify the result.
pub(crate) fn invoke<T>(store: &mut Store<T>, func: &Func, params: &[Val]) -> Outcome {
    match func.call(store, params, &mut []) {
        Ok(()) => Outcome::Completed,
        Err(err) => {
            // Operators get the trap code; the caller gets nothing but the trap.
            match err.downcast_ref::<wasmtime::Trap>() {
                Some(code) => tracing::debug!(trap = %code, "transform export trapped"),
                None => tracing::debug!("transform export failed without a trap code"),
            }
            Outcome::Trapped
        }
    }
}

/// The one error a trapped call surfaces as.
pub(crate) fn translate(module: &str) -> BridgeError {
    BridgeError::Trap {
        module: module.to_string(),
    }
}
