//! The base binary object every bitstream structure is built from.
//!
//! A [`BinaryFragment`] owns a byte buffer plus the structural metadata needed
//! to check it: an optional maximum size, the magic numbers that must hold at
//! given offsets, and the offsets of CRC words (each covering `[0, offset)`).
//!
//! ## Layering
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │ Fragment trait (size, bytes, read)    │ ◄── every structure
//! ├───────────────────────────────────────┤
//! │ BinaryFragment       FragmentCollection│
//! │  (one buffer)         (ordered children)│
//! ├───────────────────────────────────────┤
//! │ CmfDescriptor, EcdsaPublicKey, ...    │ ◄── typed wrappers
//! └───────────────────────────────────────┘
//! ```

use super::convert::{bytes_to_integer, integer_to_bytes, Endian};
use super::crc::crc32;
use super::stream::BitstreamReader;
use crate::{Error, Result};
use sha2::{Digest, Sha256, Sha384};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Largest number of bytes rendered by a fragment dump.
const MAX_DUMP_BYTES: usize = 4096;

/// Structural validation of a bitstream object.
pub trait Validate {
    /// Check every invariant of the object, reporting the first failure.
    fn validate(&self) -> Result<()>;
}

/// A contiguous, serializable piece of a bitstream.
///
/// Implemented by [`BinaryFragment`], [`FragmentCollection`](super::FragmentCollection)
/// and every typed structure built on top of them.
pub trait Fragment: Validate {
    /// Current size in bytes.
    fn size(&self) -> usize;

    /// Upper bound on [`size`](Fragment::size), if any.
    fn max_size(&self) -> Option<usize> {
        None
    }

    /// Append the serialized bytes to `out`.
    fn serialize_into(&self, out: &mut Vec<u8>);

    /// Copy `size` bytes starting at `offset`.
    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>>;

    /// Overwrite bytes starting at `offset`.
    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()>;

    /// Consume bytes from `stream`, returning how many were taken.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize>;

    /// Refresh derived fields (lengths, CRCs, hash links).
    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    /// Serialized bytes.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.serialize_into(&mut out);
        out
    }

    /// SHA-256 of the serialized bytes.
    fn sha256(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }

    /// SHA-384 of the serialized bytes.
    fn sha384(&self) -> [u8; 48] {
        Sha384::digest(self.to_bytes()).into()
    }

    /// Lowercase hex SHA-256, as written to `.chk` manifests.
    fn sha256sum(&self) -> String {
        hex::encode(self.sha256())
    }

    /// Validate, then write the bytes to `path`, creating parent directories.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        let path = path.as_ref();
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes())?;
        log::debug!("saved {} bytes to {}", self.size(), path.display());
        Ok(())
    }

    /// Read this object from `path` and validate it.
    fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()>
    where
        Self: Sized,
    {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut stream = BitstreamReader::new(BufReader::new(file));
        self.read(&mut stream)?;
        if !stream.is_exhausted()? {
            log::warn!(
                "{}: ignoring trailing data after {} bytes",
                path.display(),
                stream.position()
            );
        }
        self.validate()
    }
}

/// An owned byte buffer with magic-number and CRC metadata.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{BinaryFragment, Endian, Validate};
///
/// let mut block = BinaryFragment::new(None, Some(16))?
///     .with_magic(0x1234_5678, 0x0)
///     .with_crc(0xC);
/// block.initialize(16)?;
/// block.set_value(0xAB, 0x4, 1, Endian::Little)?;
/// block.update_crc()?;
/// block.validate()?;
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryFragment {
    raw: Vec<u8>,
    max_size: Option<usize>,
    magics: Vec<(u32, usize)>,
    crc_addresses: Vec<usize>,
    description: Option<String>,
}

impl BinaryFragment {
    /// Create a fragment from optional initial bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeExceeded`] if `bytes` is longer than `max_size`.
    pub fn new(bytes: Option<Vec<u8>>, max_size: Option<usize>) -> Result<Self> {
        let raw = bytes.unwrap_or_default();
        check_bound(raw.len(), max_size)?;
        Ok(Self {
            raw,
            max_size,
            ..Self::default()
        })
    }

    /// Create an empty fragment bounded by `max_size`.
    pub fn empty(max_size: Option<usize>) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Register a magic number that must hold at `offset`.
    pub fn with_magic(mut self, magic: u32, offset: usize) -> Self {
        self.magics.push((magic, offset));
        self
    }

    /// Register a CRC word at `address` covering `[0, address)`.
    pub fn with_crc(mut self, address: usize) -> Self {
        if !self.crc_addresses.contains(&address) {
            self.crc_addresses.push(address);
        }
        self
    }

    /// Attach a human-readable description shown in dumps.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the contents with `size` zero bytes and write the registered magics.
    pub fn initialize(&mut self, size: usize) -> Result<()> {
        check_bound(size, self.max_size)?;
        self.raw = vec![0u8; size];
        self.update_magic()
    }

    /// Current size in bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Upper bound on the size, if any.
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// True when the fragment cannot take more bytes from a stream.
    pub fn is_complete(&self) -> bool {
        self.max_size.map_or(true, |max| self.raw.len() >= max)
    }

    /// Description set with [`with_description`](Self::with_description).
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Consume the fragment, returning its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Registered `(magic, offset)` pairs.
    pub fn magics(&self) -> &[(u32, usize)] {
        &self.magics
    }

    /// Registered CRC addresses, in registration order.
    pub fn crc_addresses(&self) -> &[usize] {
        &self.crc_addresses
    }

    /// Append bytes to the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeExceeded`] and leaves the buffer unchanged if the
    /// result would exceed `max_size`.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        check_bound(self.raw.len() + bytes.len(), self.max_size)?;
        self.raw.extend_from_slice(bytes);
        Ok(())
    }

    /// Append `size` zero bytes.
    pub fn append_zeroed(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::InvariantViolation(
                "zero-sized append requested".to_string(),
            ));
        }
        check_bound(self.raw.len() + size, self.max_size)?;
        self.raw.resize(self.raw.len() + size, 0);
        Ok(())
    }

    /// Borrow `size` bytes at `offset`.
    pub fn get_raw(&self, offset: usize, size: usize) -> Result<&[u8]> {
        self.check_range(offset, size)?;
        Ok(&self.raw[offset..offset + size])
    }

    /// Overwrite bytes at `offset`.
    pub fn set_raw(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        self.raw[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a `size`-byte (1 to 8) unsigned integer at `offset`.
    pub fn get_value(&self, offset: usize, size: usize, endian: Endian) -> Result<u64> {
        bytes_to_integer(self.get_raw(offset, size)?, endian)
    }

    /// Write a `size`-byte (1 to 8) unsigned integer at `offset`.
    pub fn set_value(&mut self, value: u64, offset: usize, size: usize, endian: Endian) -> Result<()> {
        self.check_range(offset, size)?;
        let bytes = integer_to_bytes(value, size, endian)?;
        self.set_raw(&bytes, offset)
    }

    /// Read a little-endian `u32` at `offset`.
    pub fn get_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.get_raw(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write a little-endian `u32` at `offset`.
    pub fn set_u32(&mut self, value: u32, offset: usize) -> Result<()> {
        self.set_raw(&value.to_le_bytes(), offset)
    }

    /// Value of the first registered magic number.
    pub fn magic_number(&self) -> Result<u32> {
        let (_, offset) = self.magics.first().ok_or_else(|| {
            Error::InvariantViolation("fragment does not have any magic numbers".to_string())
        })?;
        self.get_u32(*offset)
    }

    /// Write every registered magic number.
    pub fn update_magic(&mut self) -> Result<()> {
        for (magic, offset) in self.magics.clone() {
            self.set_u32(magic, offset)?;
        }
        Ok(())
    }

    /// Check every registered magic number.
    pub fn validate_magic(&self) -> Result<()> {
        for &(expected, offset) in &self.magics {
            let actual = self.get_u32(offset)?;
            if actual != expected {
                return Err(Error::InvalidMagic {
                    offset,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Stored CRC at `address`, or the CRC of `[0, address)` when `calculate` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCrcAddress`] if `address` is not registered.
    pub fn crc(&self, address: usize, calculate: bool) -> Result<u32> {
        if !self.crc_addresses.contains(&address) {
            return Err(Error::InvalidCrcAddress(address));
        }
        if calculate {
            Ok(crc32(self.get_raw(0, address)?))
        } else {
            self.get_u32(address)
        }
    }

    /// Recompute and write every registered CRC, lowest address first.
    ///
    /// An outer CRC always covers the inner ones, so the inner words must be
    /// final before the outer one is computed.
    pub fn update_crc(&mut self) -> Result<()> {
        let mut addresses = self.crc_addresses.clone();
        addresses.sort_unstable();
        for address in addresses {
            let value = self.crc(address, true)?;
            self.set_u32(value, address)?;
        }
        Ok(())
    }

    /// Check every registered CRC.
    pub fn validate_crc(&self) -> Result<()> {
        let mut addresses = self.crc_addresses.clone();
        addresses.sort_unstable();
        for address in addresses {
            let expected = self.crc(address, true)?;
            let actual = self.crc(address, false)?;
            if expected != actual {
                return Err(Error::CrcMismatch {
                    address,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// SHA-256 over `size` bytes at `offset`.
    pub fn sha256_range(&self, offset: usize, size: usize) -> Result<[u8; 32]> {
        Ok(Sha256::digest(self.get_raw(offset, size)?).into())
    }

    /// SHA-384 over `size` bytes at `offset`.
    pub fn sha384_range(&self, offset: usize, size: usize) -> Result<[u8; 48]> {
        Ok(Sha384::digest(self.get_raw(offset, size)?).into())
    }

    /// Take bytes from `stream` without validating.
    ///
    /// Unbounded fragments read to end of stream; bounded ones read at most
    /// the bytes still missing, so a partially filled fragment can resume.
    pub fn fill(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let bytes = match self.max_size {
            None => stream.read_to_end()?,
            Some(max) => {
                let remaining = max.saturating_sub(self.raw.len());
                if remaining == 0 {
                    return Ok(0);
                }
                stream.read_up_to(remaining)?
            }
        };
        self.append(&bytes)?;
        Ok(bytes.len())
    }

    fn check_range(&self, offset: usize, size: usize) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.raw.len() => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                size,
                len: self.raw.len(),
            }),
        }
    }
}

/// Fail with [`Error::SizeExceeded`] when `size` is over `max_size`.
pub(crate) fn check_bound(size: usize, max_size: Option<usize>) -> Result<()> {
    match max_size {
        Some(max) if size > max => Err(Error::SizeExceeded {
            size,
            max_size: max,
        }),
        _ => Ok(()),
    }
}

impl Validate for BinaryFragment {
    fn validate(&self) -> Result<()> {
        check_bound(self.raw.len(), self.max_size)?;
        self.validate_magic()?;
        self.validate_crc()
    }
}

impl Fragment for BinaryFragment {
    fn size(&self) -> usize {
        self.raw.len()
    }

    fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.raw);
    }

    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        Ok(self.get_raw(offset, size)?.to_vec())
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.set_raw(bytes, offset)
    }

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let read = self.fill(stream)?;
        if self.is_complete() {
            self.validate()?;
        }
        Ok(read)
    }

    fn update(&mut self) -> Result<()> {
        self.update_crc()
    }
}

impl fmt::Display for BinaryFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " BinaryFragment [Size={}]", self.size())?;
        if let Some(description) = &self.description {
            writeln!(f, "  [Description: {description}]")?;
        }
        write_word_dump(f, &self.raw)
    }
}

/// Render `bytes` as little-endian words, one per line, truncated after 4 KiB.
pub(crate) fn write_word_dump(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, word) in bytes.chunks_exact(4).enumerate() {
        if (i + 1) * 4 > MAX_DUMP_BYTES {
            writeln!(f, "   0x{:04x}:   ...", i * 4)?;
            break;
        }
        let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        writeln!(f, "   0x{:04x}:   0x{value:08x}", i * 4)?;
    }
    Ok(())
}

/// Implement [`Fragment`] for a typed wrapper around a `fragment: BinaryFragment` field.
///
/// Reads validate through the wrapper's own [`Validate`] impl once complete.
macro_rules! fragment_newtype {
    ($ty:ty) => {
        impl $crate::bitstream::Fragment for $ty {
            fn size(&self) -> usize {
                self.fragment.size()
            }

            fn max_size(&self) -> Option<usize> {
                self.fragment.max_size()
            }

            fn serialize_into(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(self.fragment.as_bytes());
            }

            fn read_bytes(&self, offset: usize, size: usize) -> $crate::Result<Vec<u8>> {
                Ok(self.fragment.get_raw(offset, size)?.to_vec())
            }

            fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> $crate::Result<()> {
                self.fragment.set_raw(bytes, offset)
            }

            fn read(
                &mut self,
                stream: &mut $crate::bitstream::BitstreamReader<'_>,
            ) -> $crate::Result<usize> {
                let read = self.fragment.fill(stream)?;
                if self.fragment.is_complete() {
                    $crate::bitstream::Validate::validate(self)?;
                }
                Ok(read)
            }

            fn update(&mut self) -> $crate::Result<()> {
                self.fragment.update_crc()
            }
        }
    };
}

pub(crate) use fragment_newtype;
