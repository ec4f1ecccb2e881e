//! ECDSA public keys as embedded in signature chain entries.
//!
//! ## Layout
//!
//! ```text
//! 0x00  magic        PUBLIC_KEY_SINGLE_ROOT | PUBLIC_KEY_MULTI_ROOT
//! 0x04  x size       (single-root)  | fuse enable   (multi-root)
//! 0x08  y size       (single-root)  | contribution  (multi-root)
//! 0x0C  curve magic
//! 0x10  permission
//! 0x14  cancel id
//! 0x18  X || Y       big-endian coordinates
//! ```
//!
//! Multi-root keys reuse the size words, so their coordinate size comes from
//! the curve magic.

use super::constants::{
    ELLIPTIC_CURVE_SECP256R1, ELLIPTIC_CURVE_SECP384R1, KEY_FIELD_UNSET, PUBLIC_KEY_HEADER_SIZE,
    PUBLIC_KEY_MAGICS, PUBLIC_KEY_MAX_SIZE, PUBLIC_KEY_MULTI_ROOT, PUBLIC_KEY_SINGLE_ROOT,
};
use super::convert::{bytes_to_hex_string, Endian};
use super::fragment::{BinaryFragment, Fragment, Validate};
use super::sexp::Sexp;
use super::stream::BitstreamReader;
use super::Allocate;
use crate::{Error, Result};
use std::fmt;

/// On-disk key layout, selected by the key magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    #[default]
    SingleRoot,
    MultiRoot,
}

impl KeyFormat {
    pub const fn magic(self) -> u32 {
        match self {
            KeyFormat::SingleRoot => PUBLIC_KEY_SINGLE_ROOT,
            KeyFormat::MultiRoot => PUBLIC_KEY_MULTI_ROOT,
        }
    }

    pub const fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            PUBLIC_KEY_SINGLE_ROOT => Some(KeyFormat::SingleRoot),
            PUBLIC_KEY_MULTI_ROOT => Some(KeyFormat::MultiRoot),
            _ => None,
        }
    }
}

/// Supported elliptic curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// Also known as prime256v1
    Secp256r1,
    Secp384r1,
}

impl Curve {
    pub const fn magic(self) -> u32 {
        match self {
            Curve::Secp256r1 => ELLIPTIC_CURVE_SECP256R1,
            Curve::Secp384r1 => ELLIPTIC_CURVE_SECP384R1,
        }
    }

    pub const fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            ELLIPTIC_CURVE_SECP256R1 => Some(Curve::Secp256r1),
            ELLIPTIC_CURVE_SECP384R1 => Some(Curve::Secp384r1),
            _ => None,
        }
    }

    /// Size of one coordinate in bytes.
    pub const fn coordinate_size(self) -> usize {
        match self {
            Curve::Secp256r1 => 32,
            Curve::Secp384r1 => 48,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Curve::Secp256r1 => "prime256v1",
            Curve::Secp384r1 => "secp384r1",
        }
    }

    /// Names accepted in S-expression key types.
    const SEXP_NAMES: [(&'static str, Curve); 3] = [
        ("secp256r1", Curve::Secp256r1),
        ("secp384r1", Curve::Secp384r1),
        ("prime256v1", Curve::Secp256r1),
    ];
}

/// Optional header fields applied when building a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyOptions {
    /// Fuse enable word (multi-root only)
    pub fuse_enable: u32,
    /// Contribution word (multi-root only); `None` picks the layout default
    pub contribution: Option<u32>,
    pub permission: u32,
    pub cancel_id: u32,
    /// The key sits inside a public key entry, where the contribution word is reserved
    pub in_public_key_entry: bool,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            fuse_enable: 0,
            contribution: None,
            permission: KEY_FIELD_UNSET,
            cancel_id: KEY_FIELD_UNSET,
            in_public_key_entry: false,
        }
    }
}

/// An ECDSA public key fragment (at most 120 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaPublicKey {
    fragment: BinaryFragment,
    format: KeyFormat,
}

impl Default for EcdsaPublicKey {
    fn default() -> Self {
        Self::new(KeyFormat::SingleRoot)
    }
}

impl EcdsaPublicKey {
    /// Create an empty key ready to be read.
    pub fn new(format: KeyFormat) -> Self {
        Self {
            fragment: BinaryFragment::empty(Some(PUBLIC_KEY_MAX_SIZE)).with_magic(format.magic(), 0x0),
            format,
        }
    }

    /// Build a key from big-endian coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if either coordinate does not match the
    /// curve's coordinate size.
    pub fn from_xy(format: KeyFormat, curve: Curve, x: &[u8], y: &[u8], options: &KeyOptions) -> Result<Self> {
        let size = curve.coordinate_size();
        if x.len() != size || y.len() != size {
            return Err(Error::InvalidField(format!(
                "{} coordinates must be {size} bytes, got {} and {}",
                curve.name(),
                x.len(),
                y.len()
            )));
        }

        let mut key = Self::new(format);
        key.fragment.initialize(PUBLIC_KEY_HEADER_SIZE + 2 * size)?;
        match format {
            KeyFormat::SingleRoot => {
                key.fragment.set_u32(size as u32, 0x4)?;
                key.fragment.set_u32(size as u32, 0x8)?;
            }
            KeyFormat::MultiRoot => {
                let contribution = if options.in_public_key_entry {
                    0
                } else {
                    options.contribution.unwrap_or(KEY_FIELD_UNSET)
                };
                key.fragment.set_u32(options.fuse_enable, 0x4)?;
                key.fragment.set_u32(contribution, 0x8)?;
            }
        }
        key.fragment.set_u32(curve.magic(), 0xC)?;
        key.fragment.set_u32(options.permission, 0x10)?;
        key.fragment.set_u32(options.cancel_id, 0x14)?;
        key.fragment.set_raw(x, PUBLIC_KEY_HEADER_SIZE)?;
        key.fragment.set_raw(y, PUBLIC_KEY_HEADER_SIZE + size)?;
        Ok(key)
    }

    /// Build a key from an exported S-expression.
    ///
    /// Looks for `(public-key (ecdsa-<curve>-sha384 (qx ..) (qy ..)))` in either
    /// advanced or canonical encoding.
    pub fn from_sexp(format: KeyFormat, sexp: &[u8], options: &KeyOptions) -> Result<Self> {
        let tree = Sexp::parse(sexp)?;
        let public_key = tree
            .find("public-key")
            .ok_or_else(|| Error::InvalidField("no public-key in s-expression".to_string()))?;
        let public_key = Sexp::List(public_key.to_vec());

        for (name, curve) in Curve::SEXP_NAMES {
            let Some(params) = public_key.find(&format!("ecdsa-{name}-sha384")) else {
                continue;
            };
            let params = Sexp::List(params.to_vec());
            let x = params
                .value_of("qx")
                .ok_or_else(|| Error::InvalidField("no qx coordinate in s-expression".to_string()))?;
            let y = params
                .value_of("qy")
                .ok_or_else(|| Error::InvalidField("no qy coordinate in s-expression".to_string()))?;
            return Self::from_xy(format, curve, x, y, options);
        }
        Err(Error::InvalidField(
            "no supported ecdsa key type in s-expression".to_string(),
        ))
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// Underlying fragment.
    pub fn fragment(&self) -> &BinaryFragment {
        &self.fragment
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    pub fn curve(&self) -> Result<Option<Curve>> {
        Ok(Curve::from_magic(self.fragment.get_u32(0xC)?))
    }

    fn coordinate_size_from_curve(&self) -> Result<usize> {
        self.curve()?
            .map(Curve::coordinate_size)
            .ok_or_else(|| Error::InvalidField("elliptic curve type is unknown".to_string()))
    }

    pub fn x_size(&self) -> Result<usize> {
        match self.format {
            KeyFormat::SingleRoot => Ok(self.fragment.get_u32(0x4)? as usize),
            KeyFormat::MultiRoot => self.coordinate_size_from_curve(),
        }
    }

    pub fn y_size(&self) -> Result<usize> {
        match self.format {
            KeyFormat::SingleRoot => Ok(self.fragment.get_u32(0x8)? as usize),
            KeyFormat::MultiRoot => self.coordinate_size_from_curve(),
        }
    }

    /// Big-endian X coordinate.
    pub fn x(&self) -> Result<&[u8]> {
        self.fragment.get_raw(PUBLIC_KEY_HEADER_SIZE, self.x_size()?)
    }

    /// Big-endian Y coordinate.
    pub fn y(&self) -> Result<&[u8]> {
        self.fragment
            .get_raw(PUBLIC_KEY_HEADER_SIZE + self.x_size()?, self.y_size()?)
    }

    /// X || Y as stored.
    pub fn xy(&self) -> Result<&[u8]> {
        self.fragment
            .get_raw(PUBLIC_KEY_HEADER_SIZE, self.x_size()? + self.y_size()?)
    }

    /// SHA-384 over X || Y.
    pub fn public_key_sha384(&self) -> Result<[u8; 48]> {
        self.fragment
            .sha384_range(PUBLIC_KEY_HEADER_SIZE, self.x_size()? + self.y_size()?)
    }

    /// Most significant word (first 4 bytes) of [`public_key_sha384`](Self::public_key_sha384).
    pub fn msw_public_key_sha384(&self) -> Result<[u8; 4]> {
        let hash = self.public_key_sha384()?;
        Ok([hash[0], hash[1], hash[2], hash[3]])
    }

    pub fn fuse_enable(&self) -> Result<u32> {
        self.require_multi_root("fuse enable")?;
        self.fragment.get_u32(0x4)
    }

    pub fn set_fuse_enable(&mut self, value: u32) -> Result<()> {
        self.require_multi_root("fuse enable")?;
        self.fragment.set_u32(value, 0x4)
    }

    pub fn contribution(&self) -> Result<u32> {
        self.require_multi_root("contribution")?;
        self.fragment.get_u32(0x8)
    }

    pub fn set_contribution(&mut self, value: u32) -> Result<()> {
        self.require_multi_root("contribution")?;
        self.fragment.set_u32(value, 0x8)
    }

    pub fn permission(&self) -> Result<u32> {
        self.fragment.get_u32(0x10)
    }

    pub fn set_permission(&mut self, value: u32) -> Result<()> {
        self.fragment.set_u32(value, 0x10)
    }

    pub fn cancel_id(&self) -> Result<u32> {
        self.fragment.get_u32(0x14)
    }

    pub fn set_cancel_id(&mut self, value: u32) -> Result<()> {
        self.fragment.set_u32(value, 0x14)
    }

    fn require_multi_root(&self, field: &str) -> Result<()> {
        match self.format {
            KeyFormat::MultiRoot => Ok(()),
            KeyFormat::SingleRoot => Err(Error::InvariantViolation(format!(
                "{field} only exists on multi-root keys"
            ))),
        }
    }

    /// Total size announced by a key header.
    fn announced_size(format: KeyFormat, header: &[u8]) -> Result<usize> {
        let word = |offset: usize| {
            u32::from_le_bytes([
                header[offset],
                header[offset + 1],
                header[offset + 2],
                header[offset + 3],
            ]) as usize
        };
        let coordinates = match format {
            KeyFormat::SingleRoot => word(0x4).saturating_add(word(0x8)),
            KeyFormat::MultiRoot => {
                let curve = Curve::from_magic(word(0xC) as u32).ok_or_else(|| {
                    Error::InvalidField("elliptic curve type is unknown".to_string())
                })?;
                2 * curve.coordinate_size()
            }
        };
        Ok(PUBLIC_KEY_HEADER_SIZE.saturating_add(coordinates))
    }
}

impl Allocate for EcdsaPublicKey {
    fn allocate(stream: &mut BitstreamReader<'_>, _max_size_hint: Option<usize>) -> Result<Option<Self>> {
        let head = stream.peek(4)?;
        if head.len() < 4 {
            return Ok(None);
        }
        let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        Ok(KeyFormat::from_magic(magic).map(EcdsaPublicKey::new))
    }
}

impl Validate for EcdsaPublicKey {
    fn validate(&self) -> Result<()> {
        // Unused multi-root slots are empty
        if self.fragment.is_empty() {
            return Ok(());
        }
        if self.curve()?.is_none() {
            return Err(Error::InvalidField(
                "elliptic curve type is unknown".to_string(),
            ));
        }
        self.fragment.validate()?;

        let expected = PUBLIC_KEY_HEADER_SIZE + self.x_size()? + self.y_size()?;
        if expected != self.fragment.size() {
            return Err(Error::LengthMismatch {
                field: "public key",
                expected,
                actual: self.fragment.size(),
            });
        }
        Ok(())
    }
}

impl Fragment for EcdsaPublicKey {
    fn size(&self) -> usize {
        self.fragment.size()
    }

    fn max_size(&self) -> Option<usize> {
        self.fragment.max_size()
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.fragment.as_bytes());
    }

    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        Ok(self.fragment.get_raw(offset, size)?.to_vec())
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.fragment.set_raw(bytes, offset)
    }

    /// Reads exactly the size announced by the key header.
    ///
    /// Consumes nothing if the upcoming bytes are not a public key.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        if !self.fragment.is_empty() {
            return Ok(0);
        }
        let header = stream.peek(PUBLIC_KEY_HEADER_SIZE)?;
        if header.len() < 4 {
            return Ok(0);
        }
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if !PUBLIC_KEY_MAGICS.contains(&magic) {
            return Ok(0);
        }
        if header.len() < PUBLIC_KEY_HEADER_SIZE {
            return Err(Error::LengthMismatch {
                field: "public key header",
                expected: PUBLIC_KEY_HEADER_SIZE,
                actual: header.len(),
            });
        }

        let total = Self::announced_size(self.format, header)?;
        if total > PUBLIC_KEY_MAX_SIZE {
            return Err(Error::SizeExceeded {
                size: total,
                max_size: PUBLIC_KEY_MAX_SIZE,
            });
        }
        let bytes = stream.read_up_to(total)?;
        if bytes.len() != total {
            return Err(Error::LengthMismatch {
                field: "public key",
                expected: total,
                actual: bytes.len(),
            });
        }
        self.fragment.append(&bytes)?;
        self.validate()?;
        Ok(total)
    }
}

impl fmt::Display for EcdsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " EcdsaPublicKey [Size={}]", self.size())?;
        if self.is_empty() {
            return Ok(());
        }
        let curve = match self.curve() {
            Ok(Some(curve)) => curve.name(),
            _ => "unknown",
        };
        writeln!(f, "  Curve Type: {curve}")?;
        if let (Ok(x), Ok(y)) = (self.x(), self.y()) {
            writeln!(f, "  X: {}", bytes_to_hex_string(x, Endian::Big))?;
            writeln!(f, "  Y: {}", bytes_to_hex_string(y, Endian::Big))?;
        }
        if let Ok(hash) = self.public_key_sha384() {
            writeln!(f, "  KeyHash (qX||qY): {}", bytes_to_hex_string(&hash, Endian::Big))?;
        }
        if let Ok(permission) = self.permission() {
            writeln!(f, "  Permissions: {permission:#x}")?;
        }
        if let Ok(cancel_id) = self.cancel_id() {
            writeln!(f, "  Cancel ID: {cancel_id:#x}")?;
        }
        Ok(())
    }
}
