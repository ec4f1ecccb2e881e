//! Signature chain entries.
//!
//! Every entry is `header | data | signature`:
//!
//! ```text
//! header (0x18)
//!   0x00 magic           0x04 total length    0x08 data length
//!   0x0C signature length 0x10 reserved (0)    0x14 hash selector
//! data
//!   Root       8-byte reserved block (MSW key hash at 0) + public key
//!   MultiRoot  8-byte reserved block + 1..=3 public keys
//!   PublicKey  public key
//!   Block0     empty
//! signature
//!   empty for root entries, ECDSA signature otherwise
//! ```

use crate::bitstream::constants::{
    ECDSA_SIGNATURE_SIZE, ENTRY_HEADER_SIZE, KEY_FIELD_UNSET, MULTI_ROOT_MAX_KEYS,
    PUBLIC_KEY_MAX_SIZE, ROOT_ENTRY_RESERVED_SIZE, SIGNATURE_BLOCK0_ENTRY,
    SIGNATURE_MULTI_ROOT_ENTRY, SIGNATURE_PUBLIC_KEY_ENTRY, SIGNATURE_SINGLE_ROOT_ENTRY,
};
use crate::bitstream::convert::length_to_u32;
use crate::bitstream::{
    composite_fragment, Allocate, BinaryFragment, BitstreamReader, Composite, EcdsaPublicKey,
    EcdsaSignature, Fragment, FragmentCollection, HashSelector, KeyFormat, Validate,
};
use crate::{Error, Result};
use sha2::{Digest, Sha384};
use std::fmt;

const TOTAL_LENGTH_OFFSET: usize = 0x4;
const DATA_LENGTH_OFFSET: usize = 0x8;
const SIGNATURE_LENGTH_OFFSET: usize = 0xC;
const SHA_LENGTH_OFFSET: usize = 0x10;
const HASH_SELECTOR_OFFSET: usize = 0x14;

/// Contribution split written on the first two keys of a multi-root entry.
const MULTI_ROOT_CONTRIBUTIONS: [u32; 2] = [0xFFFF_0000, 0x0000_FFFF];

/// Entry variant, selected by the header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Root,
    MultiRoot,
    PublicKey,
    Block0,
}

impl EntryKind {
    pub const fn magic(self) -> u32 {
        match self {
            EntryKind::Root => SIGNATURE_SINGLE_ROOT_ENTRY,
            EntryKind::MultiRoot => SIGNATURE_MULTI_ROOT_ENTRY,
            EntryKind::PublicKey => SIGNATURE_PUBLIC_KEY_ENTRY,
            EntryKind::Block0 => SIGNATURE_BLOCK0_ENTRY,
        }
    }

    pub const fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            SIGNATURE_SINGLE_ROOT_ENTRY => Some(EntryKind::Root),
            SIGNATURE_MULTI_ROOT_ENTRY => Some(EntryKind::MultiRoot),
            SIGNATURE_PUBLIC_KEY_ENTRY => Some(EntryKind::PublicKey),
            SIGNATURE_BLOCK0_ENTRY => Some(EntryKind::Block0),
            _ => None,
        }
    }

    /// Root or multi-root.
    pub const fn is_root(self) -> bool {
        matches!(self, EntryKind::Root | EntryKind::MultiRoot)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Root => "Root",
            EntryKind::MultiRoot => "MultiRoot",
            EntryKind::PublicKey => "PublicKey",
            EntryKind::Block0 => "Block0",
        })
    }
}

/// Data of a single-root entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootData {
    reserved: BinaryFragment,
    key: EcdsaPublicKey,
}

/// Data of a multi-root entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRootData {
    reserved: BinaryFragment,
    keys: FragmentCollection<EcdsaPublicKey>,
}

fn reserved_block() -> BinaryFragment {
    BinaryFragment::empty(Some(ROOT_ENTRY_RESERVED_SIZE))
}

fn key_slots() -> FragmentCollection<EcdsaPublicKey> {
    FragmentCollection::new(Some(MULTI_ROOT_MAX_KEYS * PUBLIC_KEY_MAX_SIZE))
        .with_max_fragment_size(PUBLIC_KEY_MAX_SIZE)
        .with_max_fragments(MULTI_ROOT_MAX_KEYS)
}

/// Variant-specific data block of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    Root(RootData),
    MultiRoot(MultiRootData),
    PublicKey(EcdsaPublicKey),
    Block0,
}

impl EntryData {
    /// Empty data block of `kind`, ready to be read.
    fn empty(kind: EntryKind, key_format: KeyFormat) -> Self {
        match kind {
            EntryKind::Root => EntryData::Root(RootData {
                reserved: reserved_block(),
                key: EcdsaPublicKey::new(KeyFormat::SingleRoot),
            }),
            EntryKind::MultiRoot => EntryData::MultiRoot(MultiRootData {
                reserved: reserved_block(),
                keys: key_slots(),
            }),
            EntryKind::PublicKey => EntryData::PublicKey(EcdsaPublicKey::new(key_format)),
            EntryKind::Block0 => EntryData::Block0,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryData::Root(_) => EntryKind::Root,
            EntryData::MultiRoot(_) => EntryKind::MultiRoot,
            EntryData::PublicKey(_) => EntryKind::PublicKey,
            EntryData::Block0 => EntryKind::Block0,
        }
    }
}

impl Composite for EntryData {
    fn parts(&self) -> Vec<&dyn Fragment> {
        match self {
            EntryData::Root(data) => vec![&data.reserved as &dyn Fragment, &data.key as &dyn Fragment],
            EntryData::MultiRoot(data) => {
                vec![&data.reserved as &dyn Fragment, &data.keys as &dyn Fragment]
            }
            EntryData::PublicKey(key) => vec![key as &dyn Fragment],
            EntryData::Block0 => Vec::new(),
        }
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        match self {
            EntryData::Root(data) => vec![
                &mut data.reserved as &mut dyn Fragment,
                &mut data.key as &mut dyn Fragment,
            ],
            EntryData::MultiRoot(data) => vec![
                &mut data.reserved as &mut dyn Fragment,
                &mut data.keys as &mut dyn Fragment,
            ],
            EntryData::PublicKey(key) => vec![key as &mut dyn Fragment],
            EntryData::Block0 => Vec::new(),
        }
    }
}

impl Validate for EntryData {
    fn validate(&self) -> Result<()> {
        self.validate_parts()
    }
}

impl Fragment for EntryData {
    composite_fragment!();

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        self.read_parts(stream)
    }
}

/// One entry of a signature chain.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{Curve, EcdsaPublicKey, Fragment, HashSelector, KeyFormat, KeyOptions, Validate};
/// use cmfsign::chain::{EntryKind, SignatureChainEntry};
///
/// let key = EcdsaPublicKey::from_xy(KeyFormat::SingleRoot, Curve::Secp384r1, &[1; 48], &[2; 48], &KeyOptions::default())?;
/// let root = SignatureChainEntry::root(key, HashSelector::User)?;
/// root.validate()?;
/// assert_eq!(root.kind(), EntryKind::Root);
/// assert_eq!(root.size(), 152);
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChainEntry {
    header: BinaryFragment,
    data: EntryData,
    signature: BinaryFragment,
}

impl SignatureChainEntry {
    fn with_data(data: EntryData) -> Self {
        let header = BinaryFragment::empty(Some(ENTRY_HEADER_SIZE))
            .with_magic(data.kind().magic(), 0x0)
            .with_description("signature chain entry header");
        Self {
            header,
            data,
            signature: BinaryFragment::empty(None),
        }
    }

    /// Empty entry of `kind`, ready to be read.
    pub fn for_read(kind: EntryKind, key_format: KeyFormat) -> Self {
        Self::with_data(EntryData::empty(kind, key_format))
    }

    fn build(data: EntryData, signature: Vec<u8>, selector: HashSelector) -> Result<Self> {
        let mut entry = Self::with_data(data);
        entry.header.initialize(ENTRY_HEADER_SIZE)?;
        entry
            .header
            .set_u32(selector.value(), HASH_SELECTOR_OFFSET)?;
        entry.signature = BinaryFragment::new(Some(signature), None)?;
        entry.update()?;
        entry.validate()?;
        Ok(entry)
    }

    /// Root entry holding a single-root key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] for an empty or multi-root format key.
    pub fn root(key: EcdsaPublicKey, selector: HashSelector) -> Result<Self> {
        if key.is_empty() || key.format() != KeyFormat::SingleRoot {
            return Err(Error::InvalidField(
                "root entry requires a single-root public key".to_string(),
            ));
        }
        let mut reserved = reserved_block();
        reserved.initialize(ROOT_ENTRY_RESERVED_SIZE)?;
        reserved.set_raw(&key.msw_public_key_sha384()?, 0)?;
        Self::build(EntryData::Root(RootData { reserved, key }), Vec::new(), selector)
    }

    /// Multi-root entry holding one to three multi-root keys.
    ///
    /// With two or more keys, unset contributions on keys 0 and 1 are split
    /// `0xFFFF0000` / `0x0000FFFF`.
    pub fn multi_root(keys: Vec<EcdsaPublicKey>, selector: HashSelector) -> Result<Self> {
        if keys.is_empty() || keys.len() > MULTI_ROOT_MAX_KEYS {
            return Err(Error::InvalidField(format!(
                "multi-root entry takes 1 to {MULTI_ROOT_MAX_KEYS} keys, got {}",
                keys.len()
            )));
        }
        if keys
            .iter()
            .any(|key| key.is_empty() || key.format() != KeyFormat::MultiRoot)
        {
            return Err(Error::InvalidField(
                "multi-root entry requires multi-root format keys".to_string(),
            ));
        }

        let mut keys = keys;
        if keys.len() >= 2 {
            for (key, contribution) in keys.iter_mut().zip(MULTI_ROOT_CONTRIBUTIONS) {
                if key.contribution()? == KEY_FIELD_UNSET {
                    key.set_contribution(contribution)?;
                }
            }
        }

        let mut reserved = reserved_block();
        reserved.initialize(ROOT_ENTRY_RESERVED_SIZE)?;
        reserved.set_raw(&msw_of_keys(keys.iter())?, 0)?;
        let mut slots = key_slots();
        slots.extend(keys)?;
        Self::build(
            EntryData::MultiRoot(MultiRootData {
                reserved,
                keys: slots,
            }),
            Vec::new(),
            selector,
        )
    }

    /// Unsigned public key entry with a zero-filled signature placeholder.
    pub fn public_key(key: EcdsaPublicKey, selector: HashSelector) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::InvalidField(
                "public key entry requires a public key".to_string(),
            ));
        }
        Self::build(
            EntryData::PublicKey(key),
            vec![0; ECDSA_SIGNATURE_SIZE],
            selector,
        )
    }

    /// Unsigned block0 entry with a zero-filled signature placeholder.
    pub fn block0(selector: HashSelector) -> Result<Self> {
        Self::build(EntryData::Block0, vec![0; ECDSA_SIGNATURE_SIZE], selector)
    }

    /// Peek at `stream` and create an empty entry of the upcoming kind.
    ///
    /// Returns `None` when fewer than 8 bytes remain or the magic is not an
    /// entry magic. Public key entries peek the key magic at 0x18 to pick the
    /// key layout.
    pub fn sniff(stream: &mut BitstreamReader<'_>) -> Result<Option<Self>> {
        let head = stream.peek(8)?;
        if head.len() < 8 {
            return Ok(None);
        }
        let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let Some(kind) = EntryKind::from_magic(magic) else {
            return Ok(None);
        };

        let mut key_format = KeyFormat::SingleRoot;
        if kind == EntryKind::PublicKey {
            let head = stream.peek(ENTRY_HEADER_SIZE + 4)?;
            if head.len() < ENTRY_HEADER_SIZE + 4 {
                return Err(Error::UnknownStreamFormat(
                    "public key entry is too short".to_string(),
                ));
            }
            let at = ENTRY_HEADER_SIZE;
            let key_magic = u32::from_le_bytes([head[at], head[at + 1], head[at + 2], head[at + 3]]);
            key_format = KeyFormat::from_magic(key_magic).unwrap_or_default();
        }
        Ok(Some(Self::for_read(kind, key_format)))
    }

    pub fn kind(&self) -> EntryKind {
        self.data.kind()
    }

    pub fn data(&self) -> &EntryData {
        &self.data
    }

    pub fn magic(&self) -> Result<u32> {
        self.header.get_u32(0x0)
    }

    pub fn total_length(&self) -> Result<u32> {
        self.header.get_u32(TOTAL_LENGTH_OFFSET)
    }

    pub fn data_length(&self) -> Result<u32> {
        self.header.get_u32(DATA_LENGTH_OFFSET)
    }

    pub fn signature_length(&self) -> Result<u32> {
        self.header.get_u32(SIGNATURE_LENGTH_OFFSET)
    }

    pub fn hash_selector(&self) -> Result<HashSelector> {
        let value = self.header.get_u32(HASH_SELECTOR_OFFSET)?;
        HashSelector::from_value(value)
            .ok_or_else(|| Error::InvalidField(format!("hash selector {value} is not in 0..=5")))
    }

    /// The entry's public key: the root key, the first multi-root key, or the
    /// signed key of a public key entry. Block0 entries have none.
    pub fn key(&self) -> Option<&EcdsaPublicKey> {
        match &self.data {
            EntryData::Root(data) => Some(&data.key),
            EntryData::MultiRoot(data) => data.keys.first(),
            EntryData::PublicKey(key) => Some(key),
            EntryData::Block0 => None,
        }
    }

    /// All keys of a multi-root entry, or the single key of other kinds.
    pub fn public_keys(&self) -> Vec<&EcdsaPublicKey> {
        match &self.data {
            EntryData::MultiRoot(data) => data.keys.iter().collect(),
            _ => self.key().into_iter().collect(),
        }
    }

    /// MSW key hash stored in the reserved block of a root entry.
    pub fn msw_public_key_hash(&self) -> Option<[u8; 4]> {
        let reserved = match &self.data {
            EntryData::Root(data) => &data.reserved,
            EntryData::MultiRoot(data) => &data.reserved,
            _ => return None,
        };
        let bytes = reserved.get_raw(0, 4).ok()?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn signature_bytes(&self) -> &[u8] {
        self.signature.as_bytes()
    }

    /// Parsed signature, or `None` while the entry is unsigned.
    pub fn signature(&self) -> Result<Option<EcdsaSignature>> {
        let bytes = self.signature.as_bytes();
        if bytes.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        EcdsaSignature::from_bytes(bytes.to_vec()).map(Some)
    }

    /// Store a signature and refresh the header lengths.
    pub fn set_signature(&mut self, signature: EcdsaSignature) -> Result<()> {
        if self.kind().is_root() {
            return Err(Error::InvalidField(
                "root entries are self-signed and carry no signature".to_string(),
            ));
        }
        self.signature = BinaryFragment::new(Some(signature.into_bytes()), None)?;
        self.update()
    }

    /// Check the header length fields against the actual parts.
    pub fn validate_lengths(&self) -> Result<()> {
        let checks = [
            ("total length", self.total_length()?, self.size()),
            ("data length", self.data_length()?, self.data.size()),
            ("signature length", self.signature_length()?, self.signature.size()),
        ];
        for (field, stored, actual) in checks {
            if stored as usize != actual {
                return Err(Error::LengthMismatch {
                    field,
                    expected: actual,
                    actual: stored as usize,
                });
            }
        }

        let sha_length = self.header.get_u32(SHA_LENGTH_OFFSET)?;
        if sha_length != 0 {
            return Err(Error::ReservedFieldNonzero {
                offset: SHA_LENGTH_OFFSET,
                value: sha_length as u64,
            });
        }
        if self.size() % 8 != 0 {
            return Err(Error::Misaligned(self.size()));
        }
        Ok(())
    }

    fn validate_root_key(&self, key: &EcdsaPublicKey) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidField(format!(
                "{} entry is missing its public key",
                self.kind()
            )));
        }
        let cancel_id = key.cancel_id()?;
        if cancel_id != KEY_FIELD_UNSET {
            return Err(Error::InvalidField(format!(
                "root key cancel id is {cancel_id:#x}, root keys cannot be cancelled"
            )));
        }
        Ok(())
    }

    fn validate_root_msw(&self, expected: [u8; 4]) -> Result<()> {
        let stored = self.msw_public_key_hash().unwrap_or_default();
        if stored != expected {
            return Err(Error::HashChainMismatch(format!(
                "{} entry stores MSW key hash {} but the key hashes to {}",
                self.kind(),
                hex::encode(stored),
                hex::encode(expected)
            )));
        }
        Ok(())
    }

    fn warn_on_contribution_split(&self) {
        let EntryData::MultiRoot(data) = &self.data else {
            return;
        };
        if data.keys.len() < 2 {
            return;
        }
        for (index, (key, expected)) in data.keys.iter().zip(MULTI_ROOT_CONTRIBUTIONS).enumerate() {
            match key.contribution() {
                Ok(actual) if actual != expected => log::warn!(
                    "multi-root key {index} contribution is {actual:#010x}, expected {expected:#010x}"
                ),
                _ => {}
            }
        }
    }
}

/// MSW of SHA-384 over the concatenated X || Y of `keys`.
fn msw_of_keys<'a>(keys: impl Iterator<Item = &'a EcdsaPublicKey>) -> Result<[u8; 4]> {
    let mut hasher = Sha384::new();
    for key in keys {
        hasher.update(key.xy()?);
    }
    let hash = hasher.finalize();
    Ok([hash[0], hash[1], hash[2], hash[3]])
}

impl Composite for SignatureChainEntry {
    fn parts(&self) -> Vec<&dyn Fragment> {
        vec![
            &self.header as &dyn Fragment,
            &self.data as &dyn Fragment,
            &self.signature as &dyn Fragment,
        ]
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        vec![
            &mut self.header as &mut dyn Fragment,
            &mut self.data as &mut dyn Fragment,
            &mut self.signature as &mut dyn Fragment,
        ]
    }
}

impl Validate for SignatureChainEntry {
    fn validate(&self) -> Result<()> {
        self.validate_parts()?;
        self.validate_lengths()?;
        self.hash_selector()?;

        match &self.data {
            EntryData::Root(data) => {
                if !self.signature.is_empty() {
                    return Err(Error::LengthMismatch {
                        field: "root entry signature",
                        expected: 0,
                        actual: self.signature.size(),
                    });
                }
                self.validate_root_key(&data.key)?;
                self.validate_root_msw(data.key.msw_public_key_sha384()?)?;
            }
            EntryData::MultiRoot(data) => {
                if !self.signature.is_empty() {
                    return Err(Error::LengthMismatch {
                        field: "multi-root entry signature",
                        expected: 0,
                        actual: self.signature.size(),
                    });
                }
                if data.keys.is_empty() {
                    return Err(Error::InvalidField(
                        "multi-root entry requires at least one public key".to_string(),
                    ));
                }
                for key in &data.keys {
                    self.validate_root_key(key)?;
                }
                self.validate_root_msw(msw_of_keys(data.keys.iter())?)?;
            }
            EntryData::PublicKey(key) => {
                if key.is_empty() {
                    return Err(Error::InvalidField(
                        "public key entry is missing its public key".to_string(),
                    ));
                }
            }
            EntryData::Block0 => {}
        }
        Ok(())
    }
}

impl Fragment for SignatureChainEntry {
    composite_fragment!();

    /// Reads the header, exactly `data length` bytes of data and
    /// `signature length` bytes of signature, then validates.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        if !self.header.is_empty() {
            return Err(Error::InvariantViolation(
                "signature chain entry has already been read".to_string(),
            ));
        }

        let header = stream.read_up_to(ENTRY_HEADER_SIZE)?;
        if header.len() != ENTRY_HEADER_SIZE {
            return Err(Error::LengthMismatch {
                field: "entry header",
                expected: ENTRY_HEADER_SIZE,
                actual: header.len(),
            });
        }
        self.header.append(&header)?;
        self.header.validate()?;

        let data_length = self.data_length()? as usize;
        let data = stream.read_up_to(data_length)?;
        if data.len() != data_length {
            return Err(Error::LengthMismatch {
                field: "entry data",
                expected: data_length,
                actual: data.len(),
            });
        }
        let mut data_stream = BitstreamReader::from_bytes(&data);
        let consumed = self.data.read(&mut data_stream)?;
        if consumed != data_length {
            return Err(Error::LengthMismatch {
                field: "entry data",
                expected: data_length,
                actual: consumed,
            });
        }

        let signature_length = self.signature_length()? as usize;
        let signature = stream.read_up_to(signature_length)?;
        if signature.len() != signature_length {
            return Err(Error::LengthMismatch {
                field: "entry signature",
                expected: signature_length,
                actual: signature.len(),
            });
        }
        self.signature.append(&signature)?;

        self.warn_on_contribution_split();
        self.validate()?;
        log::debug!("read {} entry of {} bytes", self.kind(), self.size());
        Ok(self.size())
    }

    /// Write the data, signature and total lengths from the actual parts.
    fn update(&mut self) -> Result<()> {
        self.data.update()?;
        let total = length_to_u32(self.size())?;
        let data_length = length_to_u32(self.data.size())?;
        let signature_length = length_to_u32(self.signature.size())?;
        self.header.set_u32(total, TOTAL_LENGTH_OFFSET)?;
        self.header.set_u32(data_length, DATA_LENGTH_OFFSET)?;
        self.header
            .set_u32(signature_length, SIGNATURE_LENGTH_OFFSET)?;
        self.header.update_magic()
    }
}

impl Allocate for SignatureChainEntry {
    fn allocate(stream: &mut BitstreamReader<'_>, _max_size_hint: Option<usize>) -> Result<Option<Self>> {
        Self::sniff(stream)
    }
}

impl fmt::Display for SignatureChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            " SignatureChainEntry [Kind={}, Size={}]",
            self.kind(),
            self.size()
        )?;
        if let Ok(selector) = self.hash_selector() {
            writeln!(f, "  Hash Selector: {}", selector.name())?;
        }
        if let Some(msw) = self.msw_public_key_hash() {
            writeln!(f, "  MSW Key Hash: 0x{}", hex::encode(msw))?;
        }
        for key in self.public_keys() {
            write!(f, "{key}")?;
        }
        match self.signature() {
            Ok(Some(signature)) => write!(f, "{signature}")?,
            Ok(None) if !self.signature.is_empty() => writeln!(f, "  Signature: <unsigned>")?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{Curve, KeyOptions};

    fn single_key(seed: u8) -> EcdsaPublicKey {
        EcdsaPublicKey::from_xy(
            KeyFormat::SingleRoot,
            Curve::Secp384r1,
            &[seed; 48],
            &[seed.wrapping_add(1); 48],
            &KeyOptions::default(),
        )
        .unwrap()
    }

    fn multi_key(seed: u8) -> EcdsaPublicKey {
        EcdsaPublicKey::from_xy(
            KeyFormat::MultiRoot,
            Curve::Secp384r1,
            &[seed; 48],
            &[seed.wrapping_add(1); 48],
            &KeyOptions::default(),
        )
        .unwrap()
    }

    fn reparse(entry: &SignatureChainEntry) -> SignatureChainEntry {
        let bytes = entry.to_bytes();
        let mut stream = BitstreamReader::from_bytes(&bytes);
        let mut parsed = SignatureChainEntry::sniff(&mut stream).unwrap().unwrap();
        parsed.read(&mut stream).unwrap();
        assert!(stream.is_exhausted().unwrap());
        parsed
    }

    #[test]
    fn test_entry_sizes() {
        let root = SignatureChainEntry::root(single_key(1), HashSelector::Intel).unwrap();
        let public_key = SignatureChainEntry::public_key(single_key(2), HashSelector::Intel).unwrap();
        let block0 = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        assert_eq!(root.size(), 152);
        assert_eq!(public_key.size(), 256);
        assert_eq!(block0.size(), 136);
        for entry in [&root, &public_key, &block0] {
            entry.validate().unwrap();
            assert_eq!(entry.total_length().unwrap() as usize, entry.size());
        }
        assert_eq!(root.data_length().unwrap(), 128);
        assert_eq!(root.signature_length().unwrap(), 0);
    }

    #[test]
    fn test_root_msw_hash() {
        let key = single_key(7);
        let expected = key.msw_public_key_sha384().unwrap();
        let root = SignatureChainEntry::root(key, HashSelector::User).unwrap();
        assert_eq!(root.msw_public_key_hash(), Some(expected));
        assert_eq!(root.read_bytes(0x18, 4).unwrap(), expected.to_vec());
        assert_eq!(root.hash_selector().unwrap(), HashSelector::User);
    }

    #[test]
    fn test_root_msw_tamper_detected() {
        let mut root = SignatureChainEntry::root(single_key(3), HashSelector::Intel).unwrap();
        root.write_bytes(&[0, 0, 0, 0], 0x18).unwrap();
        assert!(matches!(root.validate(), Err(Error::HashChainMismatch(_))));
    }

    #[test]
    fn test_root_key_must_not_be_cancellable() {
        let key = EcdsaPublicKey::from_xy(
            KeyFormat::SingleRoot,
            Curve::Secp384r1,
            &[5; 48],
            &[6; 48],
            &KeyOptions {
                cancel_id: 3,
                ..KeyOptions::default()
            },
        )
        .unwrap();
        let result = SignatureChainEntry::root(key, HashSelector::Intel);
        assert!(matches!(result, Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_root_rejects_multi_root_key() {
        assert!(SignatureChainEntry::root(multi_key(1), HashSelector::Intel).is_err());
        assert!(
            SignatureChainEntry::root(EcdsaPublicKey::new(KeyFormat::SingleRoot), HashSelector::Intel)
                .is_err()
        );
    }

    #[test]
    fn test_length_mismatch() {
        let mut entry = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        entry.write_bytes(&100u32.to_le_bytes(), 0xC).unwrap();
        assert!(matches!(
            entry.validate(),
            Err(Error::LengthMismatch { field: "signature length", .. })
        ));
    }

    #[test]
    fn test_reserved_sha_length() {
        let mut entry = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        entry.write_bytes(&48u32.to_le_bytes(), 0x10).unwrap();
        assert!(matches!(
            entry.validate(),
            Err(Error::ReservedFieldNonzero { offset: 0x10, value: 48 })
        ));
    }

    #[test]
    fn test_misaligned_entry() {
        let mut entry = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        entry.signature = BinaryFragment::new(Some(vec![0; 100]), None).unwrap();
        entry.update().unwrap();
        assert!(matches!(entry.validate(), Err(Error::Misaligned(124))));
    }

    #[test]
    fn test_invalid_hash_selector() {
        let mut entry = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        entry.write_bytes(&6u32.to_le_bytes(), 0x14).unwrap();
        assert!(matches!(entry.validate(), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_multi_root_contributions() {
        let entry = SignatureChainEntry::multi_root(
            vec![multi_key(1), multi_key(3), multi_key(5)],
            HashSelector::Intel,
        )
        .unwrap();
        entry.validate().unwrap();
        let keys = entry.public_keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].contribution().unwrap(), 0xFFFF_0000);
        assert_eq!(keys[1].contribution().unwrap(), 0x0000_FFFF);
        assert_eq!(keys[2].contribution().unwrap(), KEY_FIELD_UNSET);
        assert_eq!(entry.size(), 0x18 + 8 + 3 * 120);
    }

    #[test]
    fn test_multi_root_single_key_keeps_contribution() {
        let entry = SignatureChainEntry::multi_root(vec![multi_key(1)], HashSelector::Intel).unwrap();
        assert_eq!(
            entry.key().unwrap().contribution().unwrap(),
            KEY_FIELD_UNSET
        );
        assert_eq!(
            entry.msw_public_key_hash().unwrap(),
            entry.key().unwrap().msw_public_key_sha384().unwrap()
        );
    }

    #[test]
    fn test_multi_root_key_count() {
        assert!(SignatureChainEntry::multi_root(vec![], HashSelector::Intel).is_err());
        let four = (0..4).map(multi_key).collect();
        assert!(SignatureChainEntry::multi_root(four, HashSelector::Intel).is_err());
        assert!(SignatureChainEntry::multi_root(vec![single_key(1)], HashSelector::Intel).is_err());
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let entries = [
            SignatureChainEntry::root(single_key(1), HashSelector::Intel).unwrap(),
            SignatureChainEntry::multi_root(vec![multi_key(2), multi_key(4)], HashSelector::User)
                .unwrap(),
            SignatureChainEntry::public_key(single_key(6), HashSelector::Intel).unwrap(),
            SignatureChainEntry::public_key(multi_key(8), HashSelector::Intel).unwrap(),
            SignatureChainEntry::block0(HashSelector::Slot).unwrap(),
        ];
        for entry in &entries {
            let parsed = reparse(entry);
            assert_eq!(parsed.kind(), entry.kind());
            assert_eq!(parsed.to_bytes(), entry.to_bytes());
        }
    }

    #[test]
    fn test_read_truncated_signature() {
        let entry = SignatureChainEntry::public_key(single_key(1), HashSelector::Intel).unwrap();
        let bytes = entry.to_bytes();
        let mut stream = BitstreamReader::from_bytes(&bytes[..200]);
        let mut parsed = SignatureChainEntry::sniff(&mut stream).unwrap().unwrap();
        assert!(matches!(
            parsed.read(&mut stream),
            Err(Error::LengthMismatch { field: "entry signature", .. })
        ));
    }

    #[test]
    fn test_sniff_unknown_magic() {
        let bytes = [0xAAu8; 32];
        let mut stream = BitstreamReader::from_bytes(&bytes);
        assert!(SignatureChainEntry::sniff(&mut stream).unwrap().is_none());
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_set_signature() {
        let mut entry = SignatureChainEntry::block0(HashSelector::Intel).unwrap();
        assert!(entry.signature().unwrap().is_none());
        let signature = EcdsaSignature::from_rs(&[0x11; 48], &[0x22; 48]).unwrap();
        entry.set_signature(signature).unwrap();
        entry.validate().unwrap();
        assert_eq!(entry.signature().unwrap().unwrap().r().unwrap(), &[0x11; 48]);

        let mut root = SignatureChainEntry::root(single_key(1), HashSelector::Intel).unwrap();
        let signature = EcdsaSignature::from_rs(&[0x11; 48], &[0x22; 48]).unwrap();
        assert!(root.set_signature(signature).is_err());
    }
}
