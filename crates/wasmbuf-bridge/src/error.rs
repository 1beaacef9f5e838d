//! Error types for the bridge crate.

use thiserror::Error;

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Engine, module or instantiation failure
    #[error("WASM error: {0}")]
    Wasm(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A required export is not present in the module
    #[error("missing export '{name}'")]
    MissingExport {
        /// Export name that was looked up
        name: String,
    },

    /// An export exists but has the wrong type
    #[error("export '{export}' has the wrong signature, expected {expected}")]
    Signature {
        /// Export name
        export: String,
        /// Human readable form of the expected signature
        expected: String,
    },

    /// The sandboxed call aborted. Deliberately carries no sandbox diagnostics.
    #[error("{module}: panic")]
    Trap {
        /// Name of the module instance that trapped
        module: String,
    },

    /// The result descriptor written by the module points outside linear memory
    #[error("result descriptor out of bounds: ptr={ptr} len={len} memory={memory}")]
    ResultOutOfBounds {
        /// Result pointer read from the scratch slot
        ptr: u32,
        /// Result length read from the scratch slot
        len: u32,
        /// Linear memory size in bytes at the time of the read
        memory: usize,
    },

    /// Input rejected before anything was leased
    #[error("input too large: {len} bytes (max: {max})")]
    InputTooLarge {
        /// Input length in bytes
        len: usize,
        /// Largest accepted input
        max: usize,
    },

    /// A text transform produced bytes that are not UTF-8
    #[error("export '{export}' returned invalid UTF-8")]
    InvalidUtf8 {
        /// Export name
        export: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_display_is_generic() {
        let err = BridgeError::Trap {
            module: "lz4".into(),
        };
        assert_eq!(err.to_string(), "lz4: panic");
    }

    #[test]
    fn test_out_of_bounds_display() {
        let err = BridgeError::ResultOutOfBounds {
            ptr: 65530,
            len: 16,
            memory: 65536,
        };
        assert_eq!(
            err.to_string(),
            "result descriptor out of bounds: ptr=65530 len=16 memory=65536"
        );
    }

    #[test]
    fn test_input_too_large_display() {
        let err = BridgeError::InputTooLarge { len: 2048, max: 1024 };
        assert_eq!(err.to_string(), "input too large: 2048 bytes (max: 1024)");
    }

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "module gone");
        let err = BridgeError::from(io_err);
        assert!(err.to_string().contains("module gone"));
    }
}
