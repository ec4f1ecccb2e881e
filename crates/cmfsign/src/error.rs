//! Error types for cmfsign operations.
//!
//! This module defines the [`enum@Error`] enum covering every failure raised
//! while building, parsing, validating or persisting bitstream objects:
//! buffer bounds, magic numbers, CRCs, signature chain ordering, hash links
//! between sibling structures and archive manifests.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use thiserror::Error;

/// Error type for cmfsign operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses this error type.
/// Every variant is recoverable; a failure anywhere in a parse or save pipeline is
/// reported to the caller and no partial output is written.
///
/// # Examples
///
/// ```no_run
/// use cmfsign::{BitstreamFactory, Error};
///
/// match BitstreamFactory::load("design.cmf") {
///     Ok(bitstream) => println!("{bitstream}"),
///     Err(Error::CrcMismatch { address, .. }) => eprintln!("corrupt CRC at {address:#x}"),
///     Err(Error::HashChainMismatch(msg)) => eprintln!("broken hash link: {msg}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive operation failed.
    ///
    /// Occurs while reading or writing a bitstream zip. See [`crate::archive`].
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A write or append would grow a fragment past its declared maximum size.
    ///
    /// The fragment is left unchanged.
    #[error("size {size} exceeds maximum of {max_size} bytes")]
    SizeExceeded { size: usize, max_size: usize },

    /// A read or write range falls outside the current buffer.
    #[error("range {offset:#x}+{size:#x} is out of bounds for buffer of {len:#x} bytes")]
    OutOfBounds { offset: usize, size: usize, len: usize },

    /// A registered magic number does not hold.
    #[error("magic number at offset {offset:#x} is not correct! Expected: {expected:#010x}, Actual: {actual:#010x}")]
    InvalidMagic {
        offset: usize,
        expected: u32,
        actual: u32,
    },

    /// A registered CRC does not match the computed value.
    #[error("crc at offset {address:#x} is not correct! Expected: {expected:#010x}, Actual: {actual:#010x}")]
    CrcMismatch {
        address: usize,
        expected: u32,
        actual: u32,
    },

    /// A CRC was requested at an address that is not registered on the fragment.
    #[error("{0:#x} is not a registered crc address")]
    InvalidCrcAddress(usize),

    /// A raw write on a collection would straddle two child fragments.
    #[error("write of {size} bytes at offset {offset:#x} spans more than one fragment")]
    CrossFragmentWrite { offset: usize, size: usize },

    /// A signature chain append or layout violates root -> keys -> block0 ordering.
    #[error("invalid signature chain order: {0}")]
    InvalidChainOrder(String),

    /// An entry was appended to a chain that already ends with a block0 entry.
    #[error("signature chain is terminated by a block0 entry")]
    ChainTerminated,

    /// A signature chain entry header length field disagrees with its body.
    #[error("{field} is {actual:#x} but should be {expected:#x}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A reserved field that must be zero holds another value.
    #[error("reserved field at offset {offset:#x} must be zero, found {value:#x}")]
    ReservedFieldNonzero { offset: usize, value: u64 },

    /// A signature chain entry length is not a multiple of 8.
    #[error("length {0:#x} is not a multiple of 8")]
    Misaligned(usize),

    /// A signature chain read found a magic number it does not know.
    #[error("unknown signature entry with magic {0:#010x}")]
    UnknownSignatureEntry(u32),

    /// The stream could not be classified (usually too short to sniff).
    #[error("unknown stream format: {0}")]
    UnknownStreamFormat(String),

    /// A cross-structure hash link does not hold.
    ///
    /// Raised when a signature descriptor's block0 hash does not match its
    /// descriptor, or a root entry's MSW hash does not match its key.
    #[error("hash chain mismatch: {0}")]
    HashChainMismatch(String),

    /// A descriptor or header field holds a value outside its allowed set.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A hex string could not be parsed.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// A signature chain was validated before its streamed entries were drained.
    #[error("signature chain read is unfinished: {0}")]
    UnfinishedRead(String),

    /// A bitstream zip entry does not match its sha256 manifest.
    #[error("manifest mismatch: {0}")]
    ManifestMismatch(String),

    /// An internal object invariant was broken by the caller.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
