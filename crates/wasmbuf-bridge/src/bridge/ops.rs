//! Transform operations and the codec facade.
//!
//! A [`TransformOp`] names a transform export and the scalar arguments that
//! follow the input buffer, e.g. a compression level or a size hint:
//!
//! ```text
//! export(scratch_base: i32, ptr: i32, len: i32, args: i32...)
//! ```

use super::transfer::Bridge;
use crate::error::{BridgeError, Result};

/// A transform export plus its trailing scalar arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformOp {
    export: String,
    args: Vec<i32>,
}

impl TransformOp {
    /// Operation calling `export` with no trailing arguments.
    pub fn new(export: impl Into<String>) -> Self {
        Self {
            export: export.into(),
            args: Vec::new(),
        }
    }

    /// Builder: append a trailing scalar argument
    pub fn arg(mut self, value: i32) -> Self {
        self.args.push(value);
        self
    }

    /// Export name.
    pub fn export(&self) -> &str {
        &self.export
    }

    /// Trailing scalar arguments.
    pub fn args(&self) -> &[i32] {
        &self.args
    }

    /// Number of parameters the export must declare.
    pub(crate) fn arity(&self) -> usize {
        3 + self.args.len()
    }
}

impl From<&str> for TransformOp {
    fn from(export: &str) -> Self {
        Self::new(export)
    }
}

/// Compression codec backed by a `compress` / `decompress` export pair.
///
/// Borrows the bridge for its lifetime, so calls through the codec cannot
/// interleave with other calls on the same instance.
pub struct Codec<'b> {
    bridge: &'b mut Bridge,
    compress: TransformOp,
    decompress: TransformOp,
}

impl<'b> Codec<'b> {
    pub(crate) fn new(bridge: &'b mut Bridge) -> Self {
        Self {
            bridge,
            compress: TransformOp::new("compress"),
            decompress: TransformOp::new("decompress"),
        }
    }

    /// Builder: use other export names
    pub fn exports(mut self, compress: impl Into<String>, decompress: impl Into<String>) -> Self {
        self.compress = TransformOp::new(compress);
        self.decompress = TransformOp::new(decompress);
        self
    }

    /// Builder: pass a compression level to the compress export
    pub fn level(mut self, level: i32) -> Self {
        self.compress = TransformOp::new(self.compress.export.clone()).arg(level);
        self
    }

    /// Compress `input` into an owned buffer.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.bridge.transform(&self.compress, input)
    }

    /// Decompress `input` into an owned buffer.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.bridge.transform(&self.decompress, input)
    }

    /// Decompress `input` and hand the result to `derive` without copying it.
    pub fn decompress_with<T, E>(
        &mut self,
        input: &[u8],
        derive: impl FnOnce(&[u8]) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<BridgeError>,
    {
        self.bridge.transform_with(&self.decompress, input, derive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_builder() {
        let op = TransformOp::new("optimize").arg(3);
        assert_eq!(op.export(), "optimize");
        assert_eq!(op.args(), &[3]);
        assert_eq!(op.arity(), 4);
    }

    #[test]
    fn test_op_from_str() {
        let op = TransformOp::from("sha256");
        assert!(op.args().is_empty());
        assert_eq!(op.arity(), 3);
    }
}
