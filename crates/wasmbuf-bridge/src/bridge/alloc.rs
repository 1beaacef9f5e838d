//! Allocator proxy: leases regions of linear memory through the module's
//! own `alloc` / `free` exports.

use std::ops::Range;

use wasmtime::{Instance, Store, Trap, TypedFunc};

use super::config::AllocatorExports;
use super::scratch::ResultDescriptor;
use super::stats::LeaseLedger;
use super::trap::Outcome;
use crate::error::{BridgeError, Result};

/// A region of linear memory owned by the bridge until it is freed.
///
/// Not `Clone`: the only way to give a lease back is [`Allocator::free`],
/// which consumes it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a lease must be released with Allocator::free"]
pub(crate) struct Lease {
    ptr: u32,
    len: u32,
}

impl Lease {
    pub(crate) fn ptr(&self) -> u32 {
        self.ptr
    }

    pub(crate) fn len(&self) -> u32 {
        self.len
    }

    /// Byte range of the lease inside linear memory.
    pub(crate) fn range(&self) -> Range<usize> {
        let start = self.ptr as usize;
        start..start + self.len as usize
    }
}

/// Typed handles to the module's allocator exports plus lease accounting.
pub(crate) struct Allocator {
    alloc: TypedFunc<u32, u32>,
    free: TypedFunc<(u32, u32), ()>,
    ledger: LeaseLedger,
}

impl Allocator {
    /// Resolve the allocator exports. Missing or mistyped exports are errors
    /// here, so later allocation failures can only come from the sandbox.
    pub(crate) fn resolve<T>(
        store: &mut Store<T>,
        instance: &Instance,
        names: &AllocatorExports,
    ) -> Result<Self> {
        let alloc = typed(store, instance, &names.alloc, "(i32) -> i32")?;
        let free = typed(store, instance, &names.free, "(i32, i32) -> ()")?;
        Ok(Self {
            alloc,
            free,
            ledger: LeaseLedger::default(),
        })
    }

    /// Lease `len` bytes. The region is checked against `memory_size` after
    /// the call, since `alloc` may grow memory.
    ///
    /// Returns `None` when `alloc` ran out of fuel; the caller reports that as
    /// an ordinary trap. Any other allocation failure is not recoverable: the
    /// sandbox allocator is in an unknown state, so the process is aborted.
    pub(crate) fn alloc<T>(
        &mut self,
        store: &mut Store<T>,
        len: u32,
        memory_size: impl FnOnce(&Store<T>) -> usize,
    ) -> Option<Lease> {
        let ptr = match self.alloc.call(&mut *store, len) {
            Ok(ptr) => ptr,
            Err(err) if matches!(err.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) => {
                tracing::debug!(len, "sandbox allocator ran out of fuel");
                return None;
            }
            Err(err) => {
                tracing::error!(len, error = %err, "sandbox allocator failed, aborting");
                std::process::abort();
            }
        };
        let lease = Lease { ptr, len };
        let size = memory_size(&*store);
        if lease.range().end > size {
            tracing::error!(
                ptr,
                len,
                memory = size,
                "sandbox allocator returned a region outside linear memory, aborting"
            );
            std::process::abort();
        }
        self.ledger.leased += 1;
        tracing::trace!(ptr, len, "leased");
        Some(lease)
    }

    /// Take ownership of a result region described by the scratch slot.
    pub(crate) fn adopt(&mut self, descriptor: ResultDescriptor) -> Lease {
        self.ledger.adopted += 1;
        Lease {
            ptr: descriptor.ptr,
            len: descriptor.len,
        }
    }

    /// Give a lease back to the sandbox. The lease is consumed whether or
    /// not `free` completes.
    pub(crate) fn free<T>(&mut self, store: &mut Store<T>, lease: Lease) -> Outcome {
        match self.free.call(store, (lease.ptr, lease.len)) {
            Ok(()) => {
                self.ledger.released += 1;
                tracing::trace!(ptr = lease.ptr, len = lease.len, "released");
                Outcome::Completed
            }
            Err(err) => {
                tracing::debug!(ptr = lease.ptr, len = lease.len, error = %err, "free trapped");
                Outcome::Trapped
            }
        }
    }

    pub(crate) fn ledger(&self) -> LeaseLedger {
        self.ledger
    }
}

fn typed<T, P, R>(
    store: &mut Store<T>,
    instance: &Instance,
    name: &str,
    expected: &str,
) -> Result<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| BridgeError::MissingExport {
            name: name.to_string(),
        })?;
    func.typed::<P, R>(&*store)
        .map_err(|_| BridgeError::Signature {
            export: name.to_string(),
            expected: expected.to_string(),
        })
}
