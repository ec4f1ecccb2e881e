//! Ordered sequences of fragments presented as one logical buffer.
//!
//! Two shapes exist:
//!
//! - [`FragmentCollection<F>`]: a homogeneous, growable list of children that
//!   can allocate new children while streaming (signature chains, key slots).
//! - [`Composite`]: a fixed set of heterogeneous, named parts (an entry's
//!   header/data/signature, a container's descriptor/signature descriptor).
//!
//! Both address bytes through the concatenation of their children:
//!
//! ```text
//!   offset 0                                           size()
//!   │◄── child 0 ──►│◄──── child 1 ────►│◄─ child 2 ─►│
//!   └───────────────┴───────────────────┴─────────────┘
//!            set_raw may not straddle a │ boundary
//! ```

use super::convert::{bytes_to_integer, Endian};
use super::crc::crc32;
use super::fragment::{check_bound, BinaryFragment, Fragment, Validate};
use super::stream::BitstreamReader;
use crate::{Error, Result};
use std::fmt;

/// Types a collection can create on demand while reading a stream.
pub trait Allocate: Sized {
    /// Create an empty child for the upcoming bytes, or `None` to stop reading.
    ///
    /// `max_size_hint` is the room left in the collection (bounded by its
    /// per-child limit). Implementations may peek at `stream` to decide.
    fn allocate(stream: &mut BitstreamReader<'_>, max_size_hint: Option<usize>) -> Result<Option<Self>>;
}

impl Allocate for BinaryFragment {
    fn allocate(_stream: &mut BitstreamReader<'_>, max_size_hint: Option<usize>) -> Result<Option<Self>> {
        BinaryFragment::new(None, max_size_hint).map(Some)
    }
}

/// Copy `size` bytes at `offset` out of the concatenation of `parts`.
pub(crate) fn read_span<'a>(
    parts: impl IntoIterator<Item = &'a dyn Fragment>,
    offset: usize,
    size: usize,
) -> Result<Vec<u8>> {
    let end = offset.checked_add(size).ok_or(Error::OutOfBounds {
        offset,
        size,
        len: 0,
    })?;

    let mut out = Vec::with_capacity(size);
    let mut start = 0;
    for part in parts {
        let part_size = part.size();
        let part_end = start + part_size;
        if part_end > offset && start < end {
            let local = offset.max(start) - start;
            let take = end.min(part_end) - start - local;
            out.extend_from_slice(&part.read_bytes(local, take)?);
        }
        start = part_end;
    }

    if end > start {
        return Err(Error::OutOfBounds {
            offset,
            size,
            len: start,
        });
    }
    Ok(out)
}

/// Overwrite bytes at `offset` inside exactly one of `parts`.
pub(crate) fn write_span<'a>(
    parts: impl IntoIterator<Item = &'a mut dyn Fragment>,
    bytes: &[u8],
    offset: usize,
) -> Result<()> {
    let mut start = 0;
    for part in parts {
        let part_end = start + part.size();
        if offset >= start && offset < part_end {
            if offset + bytes.len() > part_end {
                return Err(Error::CrossFragmentWrite {
                    offset,
                    size: bytes.len(),
                });
            }
            return part.write_bytes(bytes, offset - start);
        }
        start = part_end;
    }

    if bytes.is_empty() && offset <= start {
        return Ok(());
    }
    Err(Error::OutOfBounds {
        offset,
        size: bytes.len(),
        len: start,
    })
}

/// A fixed set of heterogeneous parts laid out back to back.
pub trait Composite {
    /// Parts in layout order.
    fn parts(&self) -> Vec<&dyn Fragment>;

    /// Mutable parts in layout order.
    fn parts_mut(&mut self) -> Vec<&mut dyn Fragment>;

    fn composite_size(&self) -> usize {
        self.parts().iter().map(|p| p.size()).sum()
    }

    fn composite_serialize(&self, out: &mut Vec<u8>) {
        for part in self.parts() {
            part.serialize_into(out);
        }
    }

    fn composite_read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        read_span(self.parts(), offset, size)
    }

    fn composite_write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        write_span(self.parts_mut(), bytes, offset)
    }

    /// Validate every part in layout order.
    fn validate_parts(&self) -> Result<()> {
        for part in self.parts() {
            part.validate()?;
        }
        Ok(())
    }

    /// Read every part in layout order, returning the bytes consumed.
    fn read_parts(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        let mut read = 0;
        for part in self.parts_mut() {
            read += part.read(stream)?;
        }
        Ok(read)
    }
}

/// Implement the byte-addressing half of [`Fragment`] through [`Composite`].
///
/// Expands inside an `impl Fragment for T` block; `read`, `update` and
/// `max_size` stay type-specific.
macro_rules! composite_fragment {
    () => {
        fn size(&self) -> usize {
            $crate::bitstream::Composite::composite_size(self)
        }

        fn serialize_into(&self, out: &mut Vec<u8>) {
            $crate::bitstream::Composite::composite_serialize(self, out)
        }

        fn read_bytes(&self, offset: usize, size: usize) -> $crate::Result<Vec<u8>> {
            $crate::bitstream::Composite::composite_read_bytes(self, offset, size)
        }

        fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> $crate::Result<()> {
            $crate::bitstream::Composite::composite_write_bytes(self, bytes, offset)
        }
    };
}

pub(crate) use composite_fragment;

/// An ordered, owned list of children of one type.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{BinaryFragment, Fragment, FragmentCollection};
///
/// let mut pages = FragmentCollection::new(Some(8));
/// pages.append(BinaryFragment::new(Some(vec![1, 2, 3, 4]), None)?)?;
/// pages.append(BinaryFragment::new(Some(vec![5, 6, 7, 8]), None)?)?;
/// assert_eq!(pages.get_raw(2, 4)?, vec![3, 4, 5, 6]);
/// assert!(pages.set_raw(&[0, 0], 3).is_err());
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentCollection<F> {
    fragments: Vec<F>,
    max_size: Option<usize>,
    max_fragment_size: Option<usize>,
    max_fragments: Option<usize>,
    magics: Vec<(u32, usize)>,
    crc_addresses: Vec<usize>,
}

impl<F> Default for FragmentCollection<F> {
    fn default() -> Self {
        Self {
            fragments: Vec::new(),
            max_size: None,
            max_fragment_size: None,
            max_fragments: None,
            magics: Vec::new(),
            crc_addresses: Vec::new(),
        }
    }
}

impl<F: Fragment> FragmentCollection<F> {
    /// Create an empty collection bounded by `max_size` bytes.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Bound the size of any single child.
    pub fn with_max_fragment_size(mut self, max: usize) -> Self {
        self.max_fragment_size = Some(max);
        self
    }

    /// Stop allocating children during reads once `max` exist.
    pub fn with_max_fragments(mut self, max: usize) -> Self {
        self.max_fragments = Some(max);
        self
    }

    /// Register a magic number checked on the concatenated view.
    pub fn with_magic(mut self, magic: u32, offset: usize) -> Self {
        self.magics.push((magic, offset));
        self
    }

    /// Register a CRC word on the concatenated view.
    pub fn with_crc(mut self, address: usize) -> Self {
        if !self.crc_addresses.contains(&address) {
            self.crc_addresses.push(address);
        }
        self
    }

    pub fn max_fragments(&self) -> Option<usize> {
        self.max_fragments
    }

    pub fn max_fragment_size(&self) -> Option<usize> {
        self.max_fragment_size
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total size of all children.
    pub fn total_size(&self) -> usize {
        self.fragments.iter().map(|f| f.size()).sum()
    }

    pub fn get(&self, index: usize) -> Option<&F> {
        self.fragments.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut F> {
        self.fragments.get_mut(index)
    }

    pub fn first(&self) -> Option<&F> {
        self.fragments.first()
    }

    pub fn last(&self) -> Option<&F> {
        self.fragments.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, F> {
        self.fragments.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, F> {
        self.fragments.iter_mut()
    }

    pub fn as_slice(&self) -> &[F] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<F> {
        self.fragments
    }

    /// Append one child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeExceeded`] if the child is over the per-child bound
    /// or the collection would grow past `max_size`. The collection is left
    /// unchanged on error.
    pub fn append(&mut self, fragment: F) -> Result<()> {
        self.check_child(&fragment)?;
        check_bound(self.total_size() + fragment.size(), self.max_size)?;
        self.fragments.push(fragment);
        Ok(())
    }

    /// Append several children, all or nothing.
    pub fn extend(&mut self, fragments: Vec<F>) -> Result<()> {
        let mut total = self.total_size();
        for fragment in &fragments {
            self.check_child(fragment)?;
            total += fragment.size();
        }
        check_bound(total, self.max_size)?;
        self.fragments.extend(fragments);
        Ok(())
    }

    /// Swap the child at `index` for `fragment`, returning the old child.
    pub fn replace(&mut self, index: usize, fragment: F) -> Result<F> {
        let old_size = self
            .fragments
            .get(index)
            .map(|f| f.size())
            .ok_or_else(|| Error::InvariantViolation(format!("no fragment at index {index}")))?;
        self.check_child(&fragment)?;
        check_bound(self.total_size() - old_size + fragment.size(), self.max_size)?;
        Ok(std::mem::replace(&mut self.fragments[index], fragment))
    }

    /// Find the child holding byte `offset`, with the offset local to that child.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (index, fragment) in self.fragments.iter().enumerate() {
            let end = start + fragment.size();
            if offset < end {
                return Some((index, offset - start));
            }
            start = end;
        }
        None
    }

    /// Copy bytes from the concatenated view; reads may span children.
    pub fn get_raw(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        read_span(self.fragments.iter().map(|f| f as &dyn Fragment), offset, size)
    }

    /// Overwrite bytes inside one child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CrossFragmentWrite`] if the range straddles two children.
    pub fn set_raw(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        write_span(
            self.fragments.iter_mut().map(|f| f as &mut dyn Fragment),
            bytes,
            offset,
        )
    }

    /// Read a `size`-byte unsigned integer from the concatenated view.
    pub fn get_value(&self, offset: usize, size: usize, endian: Endian) -> Result<u64> {
        bytes_to_integer(&self.get_raw(offset, size)?, endian)
    }

    fn get_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.get_raw(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Stored or computed CRC over the concatenated view.
    pub fn crc(&self, address: usize, calculate: bool) -> Result<u32> {
        if !self.crc_addresses.contains(&address) {
            return Err(Error::InvalidCrcAddress(address));
        }
        if calculate {
            Ok(crc32(&self.get_raw(0, address)?))
        } else {
            self.get_u32(address)
        }
    }

    /// Recompute every registered CRC, lowest address first.
    pub fn update_crc(&mut self) -> Result<()> {
        let mut addresses = self.crc_addresses.clone();
        addresses.sort_unstable();
        for address in addresses {
            let value = self.crc(address, true)?;
            self.set_raw(&value.to_le_bytes(), address)?;
        }
        Ok(())
    }

    /// Write every registered magic number.
    pub fn update_magic(&mut self) -> Result<()> {
        for (magic, offset) in self.magics.clone() {
            self.set_raw(&magic.to_le_bytes(), offset)?;
        }
        Ok(())
    }

    /// Read into existing children, then allocate new ones with `allocate`.
    ///
    /// Existing children are filled first so a partially read collection can
    /// resume. Allocation stops at end of stream, when the collection is full,
    /// when the child cap is reached, when `allocate` declines, or when a new
    /// child consumes nothing.
    pub fn read_with<A>(&mut self, stream: &mut BitstreamReader<'_>, mut allocate: A) -> Result<usize>
    where
        A: FnMut(&mut BitstreamReader<'_>, Option<usize>) -> Result<Option<F>>,
    {
        let mut read = 0;
        for fragment in &mut self.fragments {
            read += fragment.read(stream)?;
        }

        loop {
            if self.max_fragments.is_some_and(|max| self.fragments.len() >= max) {
                break;
            }
            let remaining = self.max_size.map(|max| max.saturating_sub(self.total_size()));
            if remaining == Some(0) || stream.is_exhausted()? {
                break;
            }
            let hint = match (remaining, self.max_fragment_size) {
                (Some(r), Some(f)) => Some(r.min(f)),
                (r, f) => r.or(f),
            };

            let Some(mut fragment) = allocate(stream, hint)? else {
                break;
            };
            let consumed = fragment.read(stream)?;
            if consumed == 0 {
                break;
            }
            self.append(fragment)?;
            read += consumed;
        }
        Ok(read)
    }

    fn check_child(&self, fragment: &F) -> Result<()> {
        check_bound(fragment.size(), self.max_fragment_size)
    }
}

impl<F: Fragment> Validate for FragmentCollection<F> {
    fn validate(&self) -> Result<()> {
        for fragment in &self.fragments {
            fragment.validate()?;
            self.check_child(fragment)?;
        }
        check_bound(self.total_size(), self.max_size)?;
        if let Some(max) = self.max_fragments {
            if self.fragments.len() > max {
                return Err(Error::InvariantViolation(format!(
                    "{} fragments exceed the limit of {max}",
                    self.fragments.len()
                )));
            }
        }

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
}

impl<F: Fragment + Allocate> Fragment for FragmentCollection<F> {
    fn size(&self) -> usize {
        self.total_size()
    }

    fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        for fragment in &self.fragments {
            fragment.serialize_into(out);
        }
    }

    fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        self.get_raw(offset, size)
    }

    fn write_bytes(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        self.set_raw(bytes, offset)
    }

    fn read(&mut self, stream: &mut BitstreamReader<'_>) -> Result<usize> {
        self.read_with(stream, F::allocate)
    }

    fn update(&mut self) -> Result<()> {
        for fragment in &mut self.fragments {
            fragment.update()?;
        }
        self.update_crc()
    }
}

impl<F: fmt::Display> fmt::Display for FragmentCollection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " FragmentCollection [Fragments={}]", self.fragments.len())?;
        for (i, fragment) in self.fragments.iter().enumerate() {
            writeln!(f, "  [{i}]")?;
            write!(f, "{fragment}")?;
        }
        Ok(())
    }
}

impl<'a, F> IntoIterator for &'a FragmentCollection<F> {
    type Item = &'a F;
    type IntoIter = std::slice::Iter<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}
