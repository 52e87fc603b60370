//! Error types for IPS operations.

use thiserror::Error;

/// Errors that can occur while decoding, encoding, or applying IPS patches.
#[derive(Error, Debug)]
pub enum IpsError {
    /// I/O error during read/write/seek operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream does not start with the "PATCH" magic.
    #[error("not an IPS stream")]
    NotIps,

    /// The stream ended at a point that does not match the "EOF" terminator.
    #[error("truncated IPS stream")]
    Truncated,

    /// Patch offset does not fit the 3-byte wire field.
    #[error("patch offset {offset:#08X} exceeds the 3-byte range")]
    OffsetOutOfRange {
        /// The offending offset.
        offset: u32,
    },

    /// Literal patch with no data; length 0 is the RLE sentinel on the wire.
    #[error("literal patch with empty data is unrepresentable")]
    EmptyPatch,

    /// Literal patch data does not fit the 2-byte wire length field.
    #[error("literal patch of {len} bytes exceeds the 2-byte length range")]
    PatchTooLong {
        /// Number of payload bytes.
        len: usize,
    },

    /// RLE patch with run length 0.
    #[error("RLE patch with zero run length is invalid")]
    ZeroRunLength,
}

/// Result type for IPS operations.
pub type Result<T> = std::result::Result<T, IpsError>;
