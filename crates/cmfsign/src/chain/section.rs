//! Fixed-size array of signature chains inside a signature descriptor.
//!
//! ```text
//! header (32 bytes)
//!   classic     4 x (entry count: u32, offset: u32)
//!   multi-root  8 x (offset: u32)
//! chain 0 .. chain N-1   back to back, empty chains take no space
//! padding                zero bytes up to the section size
//! ```
//!
//! Offsets are relative to the start of the section; an empty chain has
//! offset 0.

use super::chain::SignatureChain;
use crate::bitstream::constants::CHAIN_SECTION_HEADER_SIZE;
use crate::bitstream::{
    composite_fragment, BinaryFragment, BitstreamReader, Composite, DescriptorFormat, Fragment,
    Validate,
};
use crate::{Error, Result};
use std::fmt;

/// On-disk layout of a chain section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainSectionFormat {
    /// Four counted chains.
    #[default]
    Classic,
    /// Eight uncounted chains, read until their block0 entry.
    MultiRoot,
}

impl ChainSectionFormat {
    /// Value stored in the signature descriptor header.
    pub const fn value(self) -> u32 {
        match self {
            ChainSectionFormat::Classic => 0,
            ChainSectionFormat::MultiRoot => 1,
        }
    }

    pub const fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChainSectionFormat::Classic),
            1 => Some(ChainSectionFormat::MultiRoot),
            _ => None,
        }
    }

    pub const fn chain_count(self) -> usize {
        match self {
            ChainSectionFormat::Classic => 4,
            ChainSectionFormat::MultiRoot => 8,
        }
    }

    const fn slot_size(self) -> usize {
        CHAIN_SECTION_HEADER_SIZE / self.chain_count()
    }

    /// Layout used by descriptors of `format`; FM descriptors carry multi-root chains.
    pub fn for_descriptor(format: DescriptorFormat) -> Self {
        match format {
            DescriptorFormat::Fm => ChainSectionFormat::MultiRoot,
            _ => ChainSectionFormat::Classic,
        }
    }
}

impl fmt::Display for ChainSectionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChainSectionFormat::Classic => "classic",
            ChainSectionFormat::MultiRoot => "multi-root",
        })
    }
}

/// Header, a fixed number of chains and zero padding, `max_size` bytes in all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChainSection {
    format: ChainSectionFormat,
    max_size: usize,
    header: BinaryFragment,
    chains: Vec<SignatureChain>,
    padding: BinaryFragment,
}

impl SignatureChainSection {
    /// Section of empty chains, padded out to `max_size`.
    pub fn new(format: ChainSectionFormat, max_size: usize) -> Result<Self> {
        let mut section = Self::for_read(format, max_size);
        section.header.initialize(CHAIN_SECTION_HEADER_SIZE)?;
        section.chains = vec![SignatureChain::new(); format.chain_count()];
        section.update()?;
        Ok(section)
    }

    /// Empty section ready to be read.
    pub fn for_read(format: ChainSectionFormat, max_size: usize) -> Self {
        Self {
            format,
            max_size,
            header: BinaryFragment::empty(Some(CHAIN_SECTION_HEADER_SIZE))
                .with_description("signature chain section header"),
            chains: Vec::new(),
            padding: BinaryFragment::empty(None),
        }
    }

    pub fn format(&self) -> ChainSectionFormat {
        self.format
    }

    pub fn chains(&self) -> &[SignatureChain] {
        &self.chains
    }

    pub fn chain(&self, index: usize) -> Option<&SignatureChain> {
        self.chains.get(index)
    }

    pub fn chain_mut(&mut self, index: usize) -> Option<&mut SignatureChain> {
        self.chains.get_mut(index)
    }

    /// Chains holding at least one entry.
    pub fn populated_chains(&self) -> impl Iterator<Item = &SignatureChain> {
        self.chains.iter().filter(|chain| !chain.is_empty())
    }

    /// Stored offset of chain `index`.
    pub fn chain_offset(&self, index: usize) -> Result<u32> {
        let at = index * self.format.slot_size();
        match self.format {
            ChainSectionFormat::Classic => self.header.get_u32(at + 4),
            ChainSectionFormat::MultiRoot => self.header.get_u32(at),
        }
    }

    /// Stored entry count of chain `index`; multi-root headers have none.
    pub fn chain_entry_count(&self, index: usize) -> Result<Option<u32>> {
        match self.format {
            ChainSectionFormat::Classic => self.header.get_u32(index * 8).map(Some),
            ChainSectionFormat::MultiRoot => Ok(None),
        }
    }

    /// Store `chain` in the first empty slot and refresh the header.
    ///
    /// Returns the slot index.
    pub fn add_signature_chain(&mut self, chain: SignatureChain) -> Result<usize> {
        chain.validate()?;
        let index = self
            .chains
            .iter()
            .position(SignatureChain::is_empty)
            .ok_or_else(|| {
                Error::InvalidField(format!(
                    "all {} signature chain slots are in use",
                    self.chains.len()
                ))
            })?;
        let mut updated = self.clone();
        updated.chains[index] = chain;
        updated.update()?;
        *self = updated;
        Ok(index)
    }

    /// Header words for the current chains: `(count, offset)` per slot.
    fn layout(&self) -> Vec<(u32, u32)> {
        let mut next = CHAIN_SECTION_HEADER_SIZE;
        self.chains
            .iter()
            .map(|chain| {
                if chain.is_empty() {
                    return (0, 0);
                }
                let slot = (chain.len() as u32, next as u32);
                next += chain.size();
                slot
            })
            .collect()
    }

    /// Rewrite every slot of the header from the chains.
    pub fn update_header(&mut self) -> Result<()> {
        let slot_size = self.format.slot_size();
        for (index, (count, offset)) in self.layout().into_iter().enumerate() {
            let at = index * slot_size;
            match self.format {
                ChainSectionFormat::Classic => {
                    self.header.set_u32(count, at)?;
                    self.header.set_u32(offset, at + 4)?;
                }
                ChainSectionFormat::MultiRoot => self.header.set_u32(offset, at)?,
            }
        }
        Ok(())
    }

    /// Byte length of multi-root chain `index`, known when a later slot is populated.
    ///
    /// Multi-root chains carry no entry count, so an unterminated chain would
    /// otherwise read on into the next one.
    fn multi_root_span(&self, index: usize) -> Result<Option<usize>> {
        if self.format != ChainSectionFormat::MultiRoot {
            return Ok(None);
        }
        let offset = self.chain_offset(index)?;
        if offset == 0 {
            return Ok(None);
        }
        for later in index + 1..self.format.chain_count() {
            let next = self.chain_offset(later)?;
            if next == 0 {
                continue;
            }
            let span = next.checked_sub(offset).ok_or_else(|| {
                Error::InvalidField(format!(
                    "chain {later} offset {next:#x} precedes chain {index} offset {offset:#x}"
                ))
            })?;
            return Ok(Some(span as usize));
        }
        Ok(None)
    }

    fn read_bounded(
        chain: &mut SignatureChain,
        stream: &mut BitstreamReader<'_>,
        span: usize,
    ) -> Result<usize> {
        let bytes = stream.read_up_to(span)?;
        if bytes.len() != span {
            return Err(Error::LengthMismatch {
                field: "signature chain",
                expected: span,
                actual: bytes.len(),
            });
        }
        let mut bounded = BitstreamReader::from_bytes(&bytes);
        let read = chain.read(&mut bounded)?;
        if read != span {
            return Err(Error::LengthMismatch {
                field: "signature chain",
                expected: span,
                actual: read,
            });
        }
        Ok(read)
    }

    fn used_size(&self) -> usize {
        self.header.size() + self.chains.iter().map(Fragment::size).sum::<usize>()
    }

    fn validate_header(&self) -> Result<()> {
        for (index, (count, offset)) in self.layout().into_iter().enumerate() {
            let stored_offset = self.chain_offset(index)?;
            let stored_count = self.chain_entry_count(index)?;
            if stored_offset != offset || stored_count.is_some_and(|c| c != count) {
                return Err(Error::InvalidField(format!(
                    "chain {index} header slot (count {stored_count:?}, offset {stored_offset:#x}) \
                     does not match its chain (count {count}, offset {offset:#x})"
                )));
            }
        }
        Ok(())
    }
}

impl Composite for SignatureChainSection {
    fn parts(&self) -> Vec<&dyn Fragment> {
        let mut parts: Vec<&dyn Fragment> = Vec::with_capacity(self.chains.len() + 2);
        parts.push(&self.header);
        parts.extend(self.chains.iter().map(|c| c as &dyn Fragment));
        parts.push(&self.padding);
        parts
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment> {
        let mut parts: Vec<&mut dyn Fragment> = Vec::with_capacity(self.chains.len() + 2);
        parts.push(&mut self.header);
        parts.extend(self.chains.iter_mut().map(|c| c as &mut dyn Fragment));
        parts.push(&mut self.padding);
        parts
    }
}

impl Validate for SignatureChainSection {
    fn validate(&self) -> Result<()> {
        if self.header.size() != CHAIN_SECTION_HEADER_SIZE {
            return Err(Error::LengthMismatch {
                field: "signature chain section header",
                expected: CHAIN_SECTION_HEADER_SIZE,
                actual: self.header.size(),
            });
        }
        if self.chains.len() != self.format.chain_count() {
            return Err(Error::InvariantViolation(format!(
                "{} section holds {} chains instead of {}",
                self.format,
                self.chains.len(),
                self.format.chain_count()
            )));
        }
        self.validate_parts()?;
        self.validate_header()?;
        if self.size() != self.max_size {
            return Err(Error::LengthMismatch {
                field: "signature chain section",
                expected: self.max_size,
                actual: self.size(),
            });
        }
        Ok(())
    }
}

impl Fragment for SignatureChainSection {
    composite_fragment!();

    fn max_size(&self) -> Option<usize> {
        Some(self.max_size)
    }

    /// Reads the header, then each chain as announced by its slot, then the
    /// padding up to `max_size`.
    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        if !self.header.is_empty() {
            return Err(Error::InvariantViolation(
                "signature chain section has already been read".to_string(),
            ));
        }
        let mut read = self.header.read(stream)?;
        if !self.header.is_complete() {
            return Err(Error::LengthMismatch {
                field: "signature chain section header",
                expected: CHAIN_SECTION_HEADER_SIZE,
                actual: self.header.size(),
            });
        }

        self.chains.clear();
        for index in 0..self.format.chain_count() {
            let pending = match self.chain_entry_count(index)? {
                Some(count) => Some(count as usize),
                None if self.chain_offset(index)? != 0 => None,
                None => Some(0),
            };
            let mut chain = SignatureChain::for_read(pending);
            read += match self.multi_root_span(index)? {
                Some(span) => Self::read_bounded(&mut chain, stream, span)?,
                None => chain.read(stream)?,
            };
            log::debug!("chain {index}: {} entries, {} bytes", chain.len(), chain.size());
            self.chains.push(chain);
        }

        let remaining = self.max_size.checked_sub(self.used_size()).ok_or(Error::SizeExceeded {
            size: self.used_size(),
            max_size: self.max_size,
        })?;
        self.padding = BinaryFragment::empty(Some(remaining));
        read += self.padding.read(stream)?;

        self.validate()?;
        Ok(read)
    }

    /// Refresh every chain and the header, then resize the padding.
    fn update(&mut self) -> Result<()> {
        for chain in &mut self.chains {
            chain.update()?;
        }
        self.update_header()?;
        let used = self.used_size();
        let remaining = self.max_size.checked_sub(used).ok_or(Error::SizeExceeded {
            size: used,
            max_size: self.max_size,
        })?;
        self.padding = BinaryFragment::empty(Some(remaining));
        self.padding.initialize(remaining)
    }
}

impl fmt::Display for SignatureChainSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            " SignatureChainSection [Format={}, Chains={}, Size={}]",
            self.format,
            self.populated_chains().count(),
            self.size()
        )?;
        for (index, chain) in self.chains.iter().enumerate() {
            if chain.is_empty() {
                continue;
            }
            if let Ok(offset) = self.chain_offset(index) {
                writeln!(f, "  Chain {index} @ {offset:#x}")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{Curve, EcdsaPublicKey, HashSelector, KeyFormat, KeyOptions};
    use crate::chain::SignatureChainEntry;

    const SECTION_SIZE: usize = 0xFBC;

    fn chain(format: KeyFormat) -> SignatureChain {
        let key = |seed: u8| {
            EcdsaPublicKey::from_xy(
                format,
                Curve::Secp384r1,
                &[seed; 48],
                &[seed; 48],
                &KeyOptions::default(),
            )
            .unwrap()
        };
        let root = match format {
            KeyFormat::SingleRoot => SignatureChainEntry::root(key(1), HashSelector::Intel),
            KeyFormat::MultiRoot => {
                SignatureChainEntry::multi_root(vec![key(1), key(2)], HashSelector::Intel)
            }
        }
        .unwrap();
        let mut chain = SignatureChain::new();
        chain.append(root).unwrap();
        chain
            .append(SignatureChainEntry::public_key(key(3), HashSelector::Intel).unwrap())
            .unwrap();
        chain
            .append(SignatureChainEntry::block0(HashSelector::Intel).unwrap())
            .unwrap();
        chain
    }

    #[test]
    fn test_empty_section() {
        let section = SignatureChainSection::new(ChainSectionFormat::Classic, SECTION_SIZE).unwrap();
        section.validate().unwrap();
        assert_eq!(section.size(), SECTION_SIZE);
        assert_eq!(section.chains().len(), 4);
        assert!(section.to_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_classic_header() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::Classic, SECTION_SIZE).unwrap();
        let first = chain(KeyFormat::SingleRoot);
        let first_size = first.size();
        assert_eq!(section.add_signature_chain(first).unwrap(), 0);
        assert_eq!(section.add_signature_chain(chain(KeyFormat::SingleRoot)).unwrap(), 1);
        section.validate().unwrap();

        assert_eq!(section.chain_entry_count(0).unwrap(), Some(3));
        assert_eq!(section.chain_offset(0).unwrap(), 32);
        assert_eq!(section.chain_offset(1).unwrap() as usize, 32 + first_size);
        assert_eq!(section.chain_offset(2).unwrap(), 0);
        assert_eq!(section.chain_entry_count(3).unwrap(), Some(0));
        assert_eq!(section.size(), SECTION_SIZE);
    }

    #[test]
    fn test_multi_root_header() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::MultiRoot, SECTION_SIZE).unwrap();
        section.add_signature_chain(chain(KeyFormat::MultiRoot)).unwrap();
        assert_eq!(section.chains().len(), 8);
        assert_eq!(section.chain_offset(0).unwrap(), 32);
        assert_eq!(section.chain_offset(1).unwrap(), 0);
        assert_eq!(section.chain_entry_count(0).unwrap(), None);
        assert_eq!(section.read_bytes(0, 4).unwrap(), 32u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_read_round_trip() {
        for (format, key_format) in [
            (ChainSectionFormat::Classic, KeyFormat::SingleRoot),
            (ChainSectionFormat::MultiRoot, KeyFormat::MultiRoot),
        ] {
            let mut section = SignatureChainSection::new(format, SECTION_SIZE).unwrap();
            section.add_signature_chain(chain(key_format)).unwrap();
            section.add_signature_chain(chain(key_format)).unwrap();
            let bytes = section.to_bytes();

            let mut stream = BitstreamReader::from_bytes(&bytes);
            let mut parsed = SignatureChainSection::for_read(format, SECTION_SIZE);
            assert_eq!(parsed.read(&mut stream).unwrap(), SECTION_SIZE);
            assert_eq!(parsed.to_bytes(), bytes);
            assert_eq!(parsed.populated_chains().count(), 2);
        }
    }

    #[test]
    fn test_multi_root_unterminated_chains_round_trip() {
        let mut root_only = SignatureChain::new();
        root_only
            .append(chain(KeyFormat::MultiRoot).root_entry().unwrap().clone())
            .unwrap();
        let mut section = SignatureChainSection::new(ChainSectionFormat::MultiRoot, SECTION_SIZE).unwrap();
        section.add_signature_chain(root_only.clone()).unwrap();
        section.add_signature_chain(root_only.clone()).unwrap();
        section.add_signature_chain(chain(KeyFormat::MultiRoot)).unwrap();
        section.add_signature_chain(root_only).unwrap();
        section.validate().unwrap();
        let bytes = section.to_bytes();

        let mut stream = BitstreamReader::from_bytes(&bytes);
        let mut parsed = SignatureChainSection::for_read(ChainSectionFormat::MultiRoot, SECTION_SIZE);
        assert_eq!(parsed.read(&mut stream).unwrap(), SECTION_SIZE);
        assert_eq!(parsed.to_bytes(), bytes);
        let lengths: Vec<_> = parsed.populated_chains().map(SignatureChain::len).collect();
        assert_eq!(lengths, [1, 1, 3, 1]);
    }

    #[test]
    fn test_multi_root_offsets_out_of_order_rejected() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::MultiRoot, SECTION_SIZE).unwrap();
        section.add_signature_chain(chain(KeyFormat::MultiRoot)).unwrap();
        section.add_signature_chain(chain(KeyFormat::MultiRoot)).unwrap();
        let mut bytes = section.to_bytes();
        bytes[4..8].copy_from_slice(&16u32.to_le_bytes());

        let mut stream = BitstreamReader::from_bytes(&bytes);
        let mut parsed = SignatureChainSection::for_read(ChainSectionFormat::MultiRoot, SECTION_SIZE);
        assert!(matches!(parsed.read(&mut stream), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_stale_header_rejected() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::Classic, SECTION_SIZE).unwrap();
        section.add_signature_chain(chain(KeyFormat::SingleRoot)).unwrap();
        section.write_bytes(&2u32.to_le_bytes(), 0).unwrap();
        assert!(matches!(section.validate(), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_slots_exhausted() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::Classic, SECTION_SIZE).unwrap();
        for _ in 0..4 {
            section.add_signature_chain(chain(KeyFormat::SingleRoot)).unwrap();
        }
        let before = section.clone();
        assert!(section.add_signature_chain(chain(KeyFormat::SingleRoot)).is_err());
        assert_eq!(section, before);
    }

    #[test]
    fn test_overflow_rolls_back() {
        let mut section = SignatureChainSection::new(ChainSectionFormat::Classic, 600).unwrap();
        section.add_signature_chain(chain(KeyFormat::SingleRoot)).unwrap();
        let before = section.clone();
        assert!(matches!(
            section.add_signature_chain(chain(KeyFormat::SingleRoot)),
            Err(Error::SizeExceeded { .. })
        ));
        assert_eq!(section, before);
    }
}
