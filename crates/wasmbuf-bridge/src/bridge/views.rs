//! Identity-checked views over a module's linear memory.
//!
//! Linear memory can be reallocated whenever the sandbox grows it, and growth
//! can happen transitively inside any export call. Every accessor here
//! re-reads the backing identity and refreshes its record before handing out
//! a view. Views are borrowed from the store, so a view cannot be held across
//! a call that might grow memory.

use wasmtime::{Memory, Store};

/// Identity of the memory backing store: base address and byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Backing {
    base: usize,
    len: usize,
}

/// Memory view cache for one module instance.
pub(crate) struct MemoryViews {
    memory: Memory,
    backing: Option<Backing>,
    refreshes: u64,
}

impl MemoryViews {
    pub(crate) fn new(memory: Memory) -> Self {
        Self {
            memory,
            backing: None,
            refreshes: 0,
        }
    }

    /// Byte-granular view of the whole memory.
    pub(crate) fn bytes<'a, T>(&mut self, store: &'a Store<T>) -> &'a [u8] {
        self.revalidate(store);
        self.memory.data(store)
    }

    /// Mutable byte-granular view of the whole memory.
    pub(crate) fn bytes_mut<'a, T>(&mut self, store: &'a mut Store<T>) -> &'a mut [u8] {
        self.revalidate(store);
        self.memory.data_mut(store)
    }

    /// 32-bit-granular view of the whole memory.
    pub(crate) fn ints<'a, T>(&mut self, store: &'a Store<T>) -> IntView<'a> {
        IntView {
            bytes: self.bytes(store),
        }
    }

    /// Current memory size in bytes.
    pub(crate) fn size<T>(&self, store: &Store<T>) -> usize {
        self.memory.data_size(store)
    }

    /// Number of times the backing identity was found to have changed.
    pub(crate) fn refreshes(&self) -> u64 {
        self.refreshes
    }

    fn revalidate<T>(&mut self, store: &Store<T>) {
        let current = Backing {
            base: self.memory.data_ptr(store) as usize,
            len: self.memory.data_size(store),
        };
        if self.backing != Some(current) {
            if let Some(previous) = self.backing {
                tracing::trace!(
                    old_base = previous.base,
                    old_len = previous.len,
                    new_base = current.base,
                    new_len = current.len,
                    "linear memory moved or grew, refreshing views"
                );
                self.refreshes += 1;
            }
            self.backing = Some(current);
        }
    }
}

/// Little-endian `u32` view over linear memory, indexed in 4-byte words.
#[derive(Debug, Clone, Copy)]
pub struct IntView<'a> {
    bytes: &'a [u8],
}

impl<'a> IntView<'a> {
    /// Wrap a byte slice.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Word at `index`, or `None` past the end of memory.
    pub fn get(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(4)?;
        let word = self.bytes.get(start..start.checked_add(4)?)?;
        Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// Number of whole words in the view.
    pub fn len(&self) -> usize {
        self.bytes.len() / 4
    }

    /// Whether the view holds no whole word.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
