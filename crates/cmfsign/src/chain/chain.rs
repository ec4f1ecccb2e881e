//! Ordered signature chain: root entry, public key entries, block0 entry.

use super::entry::{EntryKind, SignatureChainEntry};
use crate::bitstream::{
    BitstreamReader, EcdsaPublicKey, Fragment, FragmentCollection, KeyFormat, Validate,
};
use crate::{Error, Result};
use std::fmt;

/// Position of a chain in its append state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Empty,
    HasRoot,
    /// Root followed by this many public key entries.
    HasRootAndKeys(usize),
    /// Ends with a block0 entry; nothing more may be appended.
    Terminated,
}

/// A sequence of [`SignatureChainEntry`] in chain order.
///
/// `entries_pending_read` drives streaming: `Some(n)` reads exactly `n`
/// entries, `None` reads until a block0 entry, an unknown magic or the end of
/// the stream. A chain only validates once it is `Some(0)`.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{Curve, EcdsaPublicKey, HashSelector, KeyFormat, KeyOptions, Validate};
/// use cmfsign::chain::{ChainState, SignatureChain, SignatureChainEntry};
/// use cmfsign::Error;
///
/// let key = |seed| EcdsaPublicKey::from_xy(KeyFormat::SingleRoot, Curve::Secp384r1, &[seed; 48], &[seed; 48], &KeyOptions::default());
///
/// let mut chain = SignatureChain::new();
/// chain.append(SignatureChainEntry::root(key(1)?, HashSelector::User)?)?;
/// chain.append(SignatureChainEntry::public_key(key(2)?, HashSelector::User)?)?;
/// chain.append(SignatureChainEntry::block0(HashSelector::User)?)?;
/// chain.validate()?;
/// assert_eq!(chain.state(), ChainState::Terminated);
///
/// let late = SignatureChainEntry::block0(HashSelector::User)?;
/// assert!(matches!(chain.append(late), Err(Error::ChainTerminated)));
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChain {
    entries: FragmentCollection<SignatureChainEntry>,
    entries_pending_read: Option<usize>,
}

impl Default for SignatureChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureChain {
    /// Empty chain built in memory; validates as-is.
    pub fn new() -> Self {
        Self {
            entries: FragmentCollection::default(),
            entries_pending_read: Some(0),
        }
    }

    /// Empty chain expecting `pending` entries from the next read.
    pub fn for_read(pending: Option<usize>) -> Self {
        Self {
            entries: FragmentCollection::default(),
            entries_pending_read: pending,
        }
    }

    pub fn entries_pending_read(&self) -> Option<usize> {
        self.entries_pending_read
    }

    pub fn set_entries_pending_read(&mut self, pending: Option<usize>) {
        self.entries_pending_read = pending;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&SignatureChainEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut SignatureChainEntry> {
        self.entries.get_mut(index)
    }

    pub fn entries(&self) -> &[SignatureChainEntry] {
        self.entries.as_slice()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SignatureChainEntry> {
        self.entries.iter()
    }

    pub fn state(&self) -> ChainState {
        match self.entries.last().map(SignatureChainEntry::kind) {
            None => ChainState::Empty,
            Some(EntryKind::Block0) => ChainState::Terminated,
            Some(_) => match self.entries.len() {
                1 => ChainState::HasRoot,
                n => ChainState::HasRootAndKeys(n - 1),
            },
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ChainState::Terminated
    }

    /// Append one entry, enforcing root -> public keys -> block0 order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidChainOrder`] for a non-root first entry, or a root
    ///   entry after the first
    /// - [`Error::ChainTerminated`] once a block0 entry has been appended
    pub fn append(&mut self, entry: SignatureChainEntry) -> Result<()> {
        match (self.state(), entry.kind()) {
            (ChainState::Empty, kind) if kind.is_root() => {}
            (ChainState::Empty, kind) => {
                return Err(Error::InvalidChainOrder(format!(
                    "a chain must start with a root entry, not a {kind} entry"
                )))
            }
            (ChainState::Terminated, _) => return Err(Error::ChainTerminated),
            (_, kind) if kind.is_root() => {
                return Err(Error::InvalidChainOrder(format!(
                    "a {kind} entry can only start a chain"
                )))
            }
            _ => {}
        }
        self.entries.append(entry)
    }

    /// Append every entry of `other`, all or nothing.
    pub fn extend_from(&mut self, other: SignatureChain) -> Result<()> {
        let mut extended = self.clone();
        for entry in other.entries.into_fragments() {
            extended.append(entry)?;
        }
        *self = extended;
        Ok(())
    }

    pub fn root_entry(&self) -> Option<&SignatureChainEntry> {
        self.entries.first().filter(|e| e.kind().is_root())
    }

    pub fn last_entry(&self) -> Option<&SignatureChainEntry> {
        self.entries.last()
    }

    /// Key that signs whatever follows the chain.
    ///
    /// The last entry's key, or the one before it when the chain ends with a
    /// block0 entry. `None` for an empty chain.
    pub fn last_key(&self) -> Result<Option<&EcdsaPublicKey>> {
        let entries = self.entries.as_slice();
        let entry = match entries {
            [] => return Ok(None),
            [.., before, last] if last.kind() == EntryKind::Block0 => before,
            [.., last] if last.kind() == EntryKind::Block0 => {
                return Err(Error::InvalidChainOrder(
                    "a block0 entry has no preceding key".to_string(),
                ))
            }
            [.., last] => last,
        };
        let key = entry.key().ok_or_else(|| {
            Error::InvalidChainOrder(format!("{} entry carries no public key", entry.kind()))
        })?;
        key.validate()?;
        Ok(Some(key))
    }

    /// Check the entry order without touching the entries' own invariants.
    fn validate_order(&self) -> Result<()> {
        let entries = self.entries.as_slice();
        let Some(first) = entries.first() else {
            return Ok(());
        };
        if !first.kind().is_root() {
            return Err(Error::InvalidChainOrder(format!(
                "entry 0 is a {} entry",
                first.kind()
            )));
        }
        if let Some(index) = entries[1..].iter().position(|e| e.kind().is_root()) {
            return Err(Error::InvalidChainOrder(format!(
                "entry {} is a second root entry",
                index + 1
            )));
        }
        // A chain signed directly by the root key has no public key entry.
        if entries.len() > 2 && entries[1].kind() != EntryKind::PublicKey {
            return Err(Error::InvalidChainOrder(format!(
                "entry 1 is a {} entry",
                entries[1].kind()
            )));
        }
        if let Some(index) = entries[..entries.len() - 1]
            .iter()
            .position(|e| e.kind() == EntryKind::Block0)
        {
            return Err(Error::InvalidChainOrder(format!(
                "block0 entry {index} is not the last entry"
            )));
        }
        Ok(())
    }
}

impl Validate for SignatureChain {
    fn validate(&self) -> Result<()> {
        if self.entries_pending_read != Some(0) {
            return Err(Error::UnfinishedRead(match self.entries_pending_read {
                Some(n) => format!("{n} entries still pending"),
                None => "entry count was never settled".to_string(),
            }));
        }
        self.validate_order()?;
        self.entries.validate()
    }
}

impl Fragment for SignatureChain {
    fn size(&self) -> usize {
        self.entries.size()
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        self.entries.serialize_into(out)
    }

    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        self.entries.get_raw(offset, size)
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.entries.set_raw(bytes, offset)
    }

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        if !self.entries.is_empty() {
            return Err(Error::InvariantViolation(
                "signature chain has already been read".to_string(),
            ));
        }

        let mut read = 0;
        while self.entries_pending_read != Some(0) {
            let head = stream.peek(8)?;
            if head.len() < 8 {
                break;
            }
            let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            let declared = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);

            let mut entry = match SignatureChainEntry::sniff(stream)? {
                Some(entry) => entry,
                None if self.entries_pending_read.is_none() => break,
                None => return Err(Error::UnknownSignatureEntry(magic)),
            };
            log::debug!(
                "reading {} entry ({declared} bytes) at stream offset {:#x}",
                entry.kind(),
                stream.position()
            );
            read += entry.read(stream)?;
            let kind = entry.kind();
            self.append(entry)?;

            match self.entries_pending_read.as_mut() {
                Some(pending) => *pending -= 1,
                None if kind == EntryKind::Block0 => break,
                None => {}
            }
        }

        if self.entries_pending_read.is_none() {
            self.entries_pending_read = Some(0);
        }
        self.validate()?;
        Ok(read)
    }

    fn update(&mut self) -> Result<()> {
        self.entries.update()
    }
}

impl fmt::Display for SignatureChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            " SignatureChain [Entries={}, Size={}]",
            self.len(),
            self.size()
        )?;
        for entry in self.iter() {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SignatureChain {
    type Item = &'a SignatureChainEntry;
    type IntoIter = std::slice::Iter<'a, SignatureChainEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Key format a public key entry should use after `chain`'s root entry.
pub fn key_format_after(chain: &SignatureChain) -> KeyFormat {
    match chain.root_entry().map(SignatureChainEntry::kind) {
        Some(EntryKind::MultiRoot) => KeyFormat::MultiRoot,
        _ => KeyFormat::SingleRoot,
    }
}
