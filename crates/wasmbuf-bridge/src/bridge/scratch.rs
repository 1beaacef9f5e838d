//! Scratch slot protocol.
//!
//! Transform exports do not return their result. They write a
//! `(pointer, length)` pair as two little-endian 32-bit words at a fixed
//! offset agreed with the host, then return nothing:
//!
//! ```text
//! scratch_base + 0  result pointer
//! scratch_base + 4  result length
//! ```
//!
//! With the conventional `scratch_base = 8` these are words 2 and 3 of the
//! 32-bit view. The slot is a single mailbox with no queuing, so it must be
//! read before the next export call.

use super::views::IntView;

/// `(pointer, length)` of a result region, as written by a transform export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResultDescriptor {
    pub(crate) ptr: u32,
    pub(crate) len: u32,
}

impl ResultDescriptor {
    /// Whether the described region lies inside `memory_size` bytes.
    pub(crate) fn fits(&self, memory_size: usize) -> bool {
        (self.ptr as u64 + self.len as u64) <= memory_size as u64
    }
}

/// Location of the scratch slot in linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScratchSlot {
    base: u32,
}

impl ScratchSlot {
    /// `base` must be a multiple of 4; `BridgeConfig::validate` enforces it.
    pub(crate) fn new(base: u32) -> Self {
        debug_assert_eq!(base % 4, 0, "scratch base must be word aligned");
        Self { base }
    }

    /// Byte offset passed to transform exports as their first argument.
    pub(crate) fn base(&self) -> u32 {
        self.base
    }

    /// Read the descriptor left by the last completed export.
    pub(crate) fn read(&self, ints: &IntView<'_>) -> Option<ResultDescriptor> {
        let index = (self.base / 4) as usize;
        Some(ResultDescriptor {
            ptr: ints.get(index)?,
            len: ints.get(index + 1)?,
        })
    }
}
