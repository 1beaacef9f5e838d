//! Transfer protocol: moves one buffer into the sandbox, runs a transform
//! export over it and hands the result back.
//!
//! Every call follows the same sequence:
//!
//! 1. lease a region the size of the input and copy the input into it
//! 2. call the export with the scratch base and the input lease
//! 3. on a trap: free the input lease best-effort and report the trap
//! 4. otherwise free the input lease and read the result descriptor
//! 5. copy the result out, or lend it to a closure
//! 6. free the result lease, even if the closure failed
//!
//! With fuel metering enabled, every call starts with a full fuel budget, so
//! running out of fuel in one call does not starve the next.
//!
//! Cleanup is driven by matching on explicit outcomes, never by unwinding.

use std::collections::HashMap;
use std::time::Instant;

use wasmtime::{Func, Instance, Memory, Store, Val, ValType};

use super::alloc::{Allocator, Lease};
use super::config::BridgeConfig;
use super::ops::{Codec, TransformOp};
use super::runtime::HostState;
use super::scratch::{ResultDescriptor, ScratchSlot};
use super::stats::{BridgeStats, CallMetrics};
use super::trap::{self, Outcome};
use super::views::MemoryViews;
use crate::error::{BridgeError, Result};

/// A transform module instance together with the state needed to move
/// buffers across its boundary.
///
/// All operations take `&mut self`, so calls against one instance never
/// interleave and the scratch slot is always consumed before it is reused.
pub struct Bridge {
    name: String,
    store: Store<HostState>,
    instance: Instance,
    views: MemoryViews,
    allocator: Allocator,
    scratch: ScratchSlot,
    /// Resolved transform exports and their parameter counts
    exports: HashMap<String, (Func, usize)>,
    max_io_size: usize,
    /// Fuel granted to each call, if metering is enabled
    fuel_limit: Option<u64>,
    stats: BridgeStats,
    last_call: Option<CallMetrics>,
}

impl Bridge {
    pub(crate) fn new(
        name: String,
        store: Store<HostState>,
        instance: Instance,
        memory: Memory,
        allocator: Allocator,
        config: &BridgeConfig,
    ) -> Self {
        let ceiling = u32::MAX as usize;
        Self {
            name,
            store,
            instance,
            views: MemoryViews::new(memory),
            allocator,
            scratch: ScratchSlot::new(config.scratch_base),
            exports: HashMap::new(),
            max_io_size: config.max_io_size.map_or(ceiling, |max| max.min(ceiling)),
            fuel_limit: config.fuel_limit,
            stats: BridgeStats::default(),
            last_call: None,
        }
    }

    /// Module name, as used in trap errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` over `input` and copy the result into an owned buffer.
    pub fn transform(&mut self, op: &TransformOp, input: &[u8]) -> Result<Vec<u8>> {
        self.transform_with(op, input, |bytes| Ok(bytes.to_vec()))
    }

    /// Run `op` over `input` and lend the result to `derive` without copying.
    pub fn transform_map<T>(
        &mut self,
        op: &TransformOp,
        input: &[u8],
        derive: impl FnOnce(&[u8]) -> T,
    ) -> Result<T> {
        self.transform_with(op, input, |bytes| Ok(derive(bytes)))
    }

    /// Run a text transform, e.g. an expression evaluator.
    pub fn transform_text(&mut self, op: &TransformOp, input: &str) -> Result<String> {
        let bytes = self.transform(op, input.as_bytes())?;
        String::from_utf8(bytes).map_err(|_| BridgeError::InvalidUtf8 {
            export: op.export().to_string(),
        })
    }

    /// Run `op` over `input` and lend the result to a fallible `derive`.
    ///
    /// The result region is freed as soon as `derive` returns. If `derive`
    /// fails, its own error is returned after that cleanup; bridge failures
    /// reach the caller through `E: From<BridgeError>`.
    pub fn transform_with<T, E>(
        &mut self,
        op: &TransformOp,
        input: &[u8],
        derive: impl FnOnce(&[u8]) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<BridgeError>,
    {
        let func = self.resolve(op)?;
        self.refuel()?;
        let input_lease = self.lease_input(input)?;

        self.stats.calls += 1;
        self.stats.bytes_in += input.len() as u64;

        let mut params = Vec::with_capacity(op.arity());
        params.push(Val::I32(self.scratch.base() as i32));
        params.push(Val::I32(input_lease.ptr() as i32));
        params.push(Val::I32(input_lease.len() as i32));
        params.extend(op.args().iter().map(|&arg| Val::I32(arg)));

        let fuel_before = self.store.get_fuel().ok();
        let started = Instant::now();
        let outcome = trap::invoke(&mut self.store, &func, &params);
        self.record_call(started, fuel_before);

        if outcome == Outcome::Trapped {
            // The input pointer may no longer mean anything to the module's
            // allocator; the free is attempted but not relied upon.
            if let Err(err) = self.refuel() {
                tracing::debug!(error = %err, "fuel not restored for cleanup");
            }
            if self.allocator.free(&mut self.store, input_lease) == Outcome::Trapped {
                tracing::debug!(
                    module = %self.name,
                    export = op.export(),
                    "input lease not released after trap"
                );
            }
            return Err(self.trapped().into());
        }

        // The export completed, so the descriptor is valid even if this free traps
        let input_released = self.allocator.free(&mut self.store, input_lease);
        let descriptor = self.read_descriptor();

        if input_released == Outcome::Trapped {
            if let Ok(descriptor) = descriptor {
                let result = self.allocator.adopt(descriptor);
                if self.allocator.free(&mut self.store, result) == Outcome::Trapped {
                    tracing::debug!(
                        module = %self.name,
                        export = op.export(),
                        "result lease not released after trap"
                    );
                }
            }
            return Err(self.trapped().into());
        }

        let descriptor = descriptor?;
        let result = self.allocator.adopt(descriptor);
        let result_len = u64::from(result.len());
        tracing::trace!(
            export = op.export(),
            ptr = result.ptr(),
            len = result.len(),
            "transform completed"
        );

        let produced = {
            let bytes = self.views.bytes(&self.store);
            derive(&bytes[result.range()])
        };
        let released = self.allocator.free(&mut self.store, result);

        match (produced, released) {
            (Err(err), Outcome::Trapped) => {
                self.stats.traps += 1;
                Err(err)
            }
            (Err(err), Outcome::Completed) => Err(err),
            (Ok(_), Outcome::Trapped) => Err(self.trapped().into()),
            (Ok(value), Outcome::Completed) => {
                self.stats.bytes_out += result_len;
                Ok(value)
            }
        }
    }

    /// Compression codec over this bridge's `compress` / `decompress` exports.
    pub fn codec(&mut self) -> Codec<'_> {
        Codec::new(self)
    }

    /// Call a `() -> i32` export, e.g. a version query.
    pub fn call_i32(&mut self, name: &str) -> Result<i32> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| BridgeError::MissingExport {
                name: name.to_string(),
            })?
            .typed::<(), i32>(&self.store)
            .map_err(|_| BridgeError::Signature {
                export: name.to_string(),
                expected: "() -> i32".to_string(),
            })?;

        self.refuel()?;
        let fuel_before = self.store.get_fuel().ok();
        let started = Instant::now();
        let value = func.call(&mut self.store, ());
        self.record_call(started, fuel_before);

        value.map_err(|_| self.trapped())
    }

    /// Running totals for this instance.
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            view_refreshes: self.views.refreshes(),
            leases: self.allocator.ledger(),
            ..self.stats.clone()
        }
    }

    /// Timing and fuel for the most recent export call.
    pub fn last_call(&self) -> Option<CallMetrics> {
        self.last_call
    }

    /// Current linear memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.views.size(&self.store)
    }

    /// Get remaining fuel (if fuel metering enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Get list of exported function names.
    pub fn exports(&mut self) -> Vec<String> {
        let names: Vec<_> = self
            .instance
            .exports(&mut self.store)
            .map(|e| e.name().to_string())
            .collect();
        names
            .into_iter()
            .filter(|name| self.instance.get_func(&mut self.store, name).is_some())
            .collect()
    }

    /// Look up a transform export and check it takes `op.arity()` i32
    /// parameters and returns nothing.
    fn resolve(&mut self, op: &TransformOp) -> Result<Func> {
        let (func, arity) = match self.exports.get(op.export()) {
            Some(&entry) => entry,
            None => {
                let func = self
                    .instance
                    .get_func(&mut self.store, op.export())
                    .ok_or_else(|| BridgeError::MissingExport {
                        name: op.export().to_string(),
                    })?;
                let ty = func.ty(&self.store);
                let arity = ty.params().len();
                let params_ok = ty.params().all(|p| matches!(p, ValType::I32));
                if !params_ok || ty.results().len() != 0 || arity < 3 {
                    return Err(signature_error(op));
                }
                self.exports.insert(op.export().to_string(), (func, arity));
                (func, arity)
            }
        };

        if arity != op.arity() {
            return Err(signature_error(op));
        }
        Ok(func)
    }

    /// Read the result descriptor and check it lies inside linear memory.
    fn read_descriptor(&mut self) -> Result<ResultDescriptor> {
        let memory = self.views.size(&self.store);
        let descriptor = {
            let ints = self.views.ints(&self.store);
            self.scratch.read(&ints)
        };
        match descriptor {
            Some(descriptor) if descriptor.fits(memory) => Ok(descriptor),
            Some(descriptor) => Err(BridgeError::ResultOutOfBounds {
                ptr: descriptor.ptr,
                len: descriptor.len,
                memory,
            }),
            None => Err(BridgeError::ResultOutOfBounds {
                ptr: self.scratch.base(),
                len: 8,
                memory,
            }),
        }
    }

    /// Restore the full fuel budget before a call.
    fn refuel(&mut self) -> Result<()> {
        if let Some(fuel) = self.fuel_limit {
            self.store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {}", e)))?;
        }
        Ok(())
    }

    /// Lease a region for `input` and copy it in.
    fn lease_input(&mut self, input: &[u8]) -> Result<Lease> {
        if input.len() > self.max_io_size {
            return Err(BridgeError::InputTooLarge {
                len: input.len(),
                max: self.max_io_size,
            });
        }

        let views = &self.views;
        let lease = self
            .allocator
            .alloc(&mut self.store, input.len() as u32, |store| views.size(store));
        let Some(lease) = lease else {
            return Err(self.trapped());
        };

        self.views.bytes_mut(&mut self.store)[lease.range()].copy_from_slice(input);
        Ok(lease)
    }

    fn record_call(&mut self, started: Instant, fuel_before: Option<u64>) {
        let fuel_after = self.store.get_fuel().ok();
        self.last_call = Some(CallMetrics {
            execution_time_us: started.elapsed().as_micros() as u64,
            fuel_consumed: fuel_before.zip(fuel_after).map(|(b, a)| b.saturating_sub(a)),
        });
    }

    fn trapped(&mut self) -> BridgeError {
        self.stats.traps += 1;
        trap::translate(&self.name)
    }
}

fn signature_error(op: &TransformOp) -> BridgeError {
    BridgeError::Signature {
        export: op.export().to_string(),
        expected: format!("({}) -> ()", vec!["i32"; op.arity()].join(", ")),
    }
}
