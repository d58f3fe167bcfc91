//! Error types for the ZIP codec core.

use thiserror::Error;

/// Result type for zipcore operations.
pub type ZipResult<T> = std::result::Result<T, ZipError>;

/// Result type alias kept for parity with the crate's original naming.
pub type Result<T> = ZipResult<T>;

/// Error kinds produced by the codec core. None are retried internally and
/// none trigger partial-archive repair — every error surfaces to the caller
/// at the operation boundary.
#[derive(Error, Debug)]
pub enum ZipError {
    /// Empty path, path too long, leading `/`, or use of a closed writer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A compression method other than STORE/DEFLATE.
    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u16),

    /// Multi-disk archives are rejected outright.
    #[error("multi-disk archives are not supported")]
    MultiDiskUnsupported,

    /// Short read on a header, CDR, extras, comment, or compressed body.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    /// Expected magic bytes were not present at a known offset.
    #[error("bad magic: expected 0x{expected:08x}, found 0x{found:08x} at offset {offset}")]
    BadMagic {
        expected: u32,
        found: u32,
        offset: u64,
    },

    /// CDR overrun, invalid CDR offset, or a ZIP64 extra with an unexpected
    /// length.
    #[error("format violation: {0}")]
    FormatViolation(String),

    /// The DEFLATE codec failed to initialize.
    #[error("codec init failed")]
    CodecInitFailed,

    /// The DEFLATE codec reported a data/dict/memory error.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Decompressed byte count did not match the length recorded in the
    /// central directory.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    /// CRC-32 computed during decompression did not match the recorded
    /// value.
    #[error("crc mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// End of central directory record could not be located by the tail
    /// scan.
    #[error("EOCD not found")]
    EocdNotFound,

    /// EOCD pointed to ZIP64 structures but the locator could not be found.
    #[error("ZIP64 locator not found")]
    Zip64LocatorNotFound,

    /// The writer has already been closed.
    #[error("writer already closed")]
    AlreadyClosed,

    /// Propagated I/O error from the backing stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
