//! The 4 KiB CMF descriptor (bootrom header) leading every configuration file.
//!
//! ## Layout (selected fields)
//!
//! ```text
//! 0x000  CMF_DESCRIPTOR magic
//! 0x004  descriptor format   0x0 SDM-lite | 0x10 SDM-full | 0x20 FM
//! 0x008  bootrom header length (0x400)
//! 0x00C  flags (0)
//! 0x080  tool information (64 bytes, zero before signing)
//! 0x094  OSC1 clock
//! 0x13C  SHA type magic
//! 0x180  JTAG id, 0x184 JTAG id mask
//! 0x3B4  inner CRC over [0, 0x3B4)
//! 0x400  CMF description block (a section descriptor typed "CMF")
//! 0x404  release flag, 0x408 sections remaining, 0x40C section type
//! 0x420  ACDS version, 0x42C build number, 0x434 physical JTAG id
//! 0x499  HPS flags, 0x49B configuration type
//! 0xFE0  build label (28 bytes)
//! 0xFFC  outer CRC over [0, 0xFFC)
//! ```

use super::constants::{
    CMF_DESCRIPTOR, CMF_DESCRIPTOR_CMF_DESCRIPTION, CMF_SECTION_DESCRIPTOR, DESCRIPTOR_SIZE,
    HASH_SHA_384, HASH_SHA_512,
};
use super::fragment::{fragment_newtype, BinaryFragment, Validate};
use crate::{Error, Result};
use std::fmt;

const FORMAT_OFFSET: usize = 0x4;
const HEADER_LENGTH_OFFSET: usize = 0x8;
const FLAGS_OFFSET: usize = 0xC;
const TOOL_INFORMATION_OFFSET: usize = 0x80;
const TOOL_INFORMATION_SIZE: usize = 0x40;
const OSC1_CLOCK_OFFSET: usize = 0x94;
const SHA_TYPE_OFFSET: usize = 0x13C;
const JTAG_ID_OFFSET: usize = 0x180;
const JTAG_MASK_OFFSET: usize = 0x184;
const INNER_CRC_OFFSET: usize = 0x3B4;
const DESCRIPTION_OFFSET: usize = 0x400;
const RELEASE_OFFSET: usize = 0x404;
const SECTIONS_REMAINING_OFFSET: usize = 0x408;
const SECTION_TYPE_OFFSET: usize = 0x40C;
const VERSION_OFFSET: usize = 0x420;
const BUILD_NUMBER_OFFSET: usize = 0x42C;
const PHYSICAL_JTAG_OFFSET: usize = 0x434;
const HPS_FLAGS_OFFSET: usize = 0x499;
const CONFIGURATION_TYPE_OFFSET: usize = 0x49B;
const BUILD_LABEL_OFFSET: usize = 0xFE0;
const BUILD_LABEL_SIZE: usize = 28;
const OUTER_CRC_OFFSET: usize = 0xFFC;

const BOOTROM_HEADER_LENGTH: u32 = 0x400;
const RELEASE_FLAG: u32 = 1 << 31;

/// Descriptor format version at 0x4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    SdmLite,
    SdmFull,
    Fm,
    Unknown(u32),
}

impl DescriptorFormat {
    pub const fn from_value(value: u32) -> Self {
        match value {
            0x0 => DescriptorFormat::SdmLite,
            0x10 => DescriptorFormat::SdmFull,
            0x20 => DescriptorFormat::Fm,
            other => DescriptorFormat::Unknown(other),
        }
    }

    pub const fn value(self) -> u32 {
        match self {
            DescriptorFormat::SdmLite => 0x0,
            DescriptorFormat::SdmFull => 0x10,
            DescriptorFormat::Fm => 0x20,
            DescriptorFormat::Unknown(other) => other,
        }
    }

    /// SHA type the bootrom expects for this format.
    pub const fn required_sha(self) -> Option<ShaType> {
        match self {
            DescriptorFormat::SdmLite => Some(ShaType::Sha384),
            DescriptorFormat::SdmFull | DescriptorFormat::Fm => Some(ShaType::Sha512),
            DescriptorFormat::Unknown(_) => None,
        }
    }
}

impl fmt::Display for DescriptorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DescriptorFormat::SdmLite => "SDM-lite",
            DescriptorFormat::SdmFull => "SDM-full",
            DescriptorFormat::Fm => "FM",
            DescriptorFormat::Unknown(_) => "unknown",
        })
    }
}

/// Hash type magic at 0x13C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaType {
    Sha384,
    Sha512,
    Unknown(u32),
}

impl ShaType {
    pub const fn from_magic(magic: u32) -> Self {
        match magic {
            HASH_SHA_384 => ShaType::Sha384,
            HASH_SHA_512 => ShaType::Sha512,
            other => ShaType::Unknown(other),
        }
    }

    pub const fn magic(self) -> u32 {
        match self {
            ShaType::Sha384 => HASH_SHA_384,
            ShaType::Sha512 => HASH_SHA_512,
            ShaType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ShaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaType::Sha384 => "SHA-384",
            ShaType::Sha512 => "SHA-512",
            ShaType::Unknown(_) => "unknown",
        })
    }
}

/// CMF descriptor.
///
/// # Example
///
/// ```
/// use cmfsign::bitstream::{CmfDescriptor, Validate};
///
/// let mut descriptor = CmfDescriptor::new();
/// descriptor.initialize()?;
/// descriptor.validate()?;
/// assert_eq!(descriptor.format()?.to_string(), "SDM-full");
/// assert_eq!(descriptor.sha_type()?.to_string(), "SHA-512");
/// # Ok::<(), cmfsign::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmfDescriptor {
    fragment: BinaryFragment,
}

impl Default for CmfDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl CmfDescriptor {
    /// Create an empty descriptor ready to be read or initialized.
    pub fn new() -> Self {
        Self {
            fragment: Self::layout(BinaryFragment::empty(Some(DESCRIPTOR_SIZE))),
        }
    }

    /// Wrap existing descriptor bytes without validating them.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            fragment: Self::layout(BinaryFragment::new(Some(bytes), Some(DESCRIPTOR_SIZE))?),
        })
    }

    fn layout(fragment: BinaryFragment) -> BinaryFragment {
        fragment
            .with_magic(CMF_DESCRIPTOR, 0x0)
            .with_magic(CMF_DESCRIPTOR_CMF_DESCRIPTION, DESCRIPTION_OFFSET)
            .with_crc(OUTER_CRC_OFFSET)
            .with_crc(INNER_CRC_OFFSET)
            .with_description("CMF descriptor")
    }

    /// Reset to a zeroed SDM-full descriptor with valid magics and CRCs.
    pub fn initialize(&mut self) -> Result<()> {
        self.fragment.initialize(DESCRIPTOR_SIZE)?;
        self.fragment
            .set_u32(DescriptorFormat::SdmFull.value(), FORMAT_OFFSET)?;
        self.fragment.set_u32(HASH_SHA_512, SHA_TYPE_OFFSET)?;
        self.fragment
            .set_u32(BOOTROM_HEADER_LENGTH, HEADER_LENGTH_OFFSET)?;
        self.fragment
            .set_u32(CMF_SECTION_DESCRIPTOR, SECTION_TYPE_OFFSET)?;
        self.fragment.update_crc()
    }

    pub fn fragment(&self) -> &BinaryFragment {
        &self.fragment
    }

    pub fn fragment_mut(&mut self) -> &mut BinaryFragment {
        &mut self.fragment
    }

    pub fn format(&self) -> Result<DescriptorFormat> {
        Ok(DescriptorFormat::from_value(self.fragment.get_u32(FORMAT_OFFSET)?))
    }

    /// Set the descriptor format together with the SHA type it requires.
    ///
    /// CRCs are stale afterwards; call [`update`](crate::bitstream::Fragment::update).
    pub fn set_format(&mut self, format: DescriptorFormat) -> Result<()> {
        self.fragment.set_u32(format.value(), FORMAT_OFFSET)?;
        if let Some(sha) = format.required_sha() {
            self.fragment.set_u32(sha.magic(), SHA_TYPE_OFFSET)?;
        }
        Ok(())
    }

    pub fn is_fm_format(&self) -> Result<bool> {
        Ok(self.format()? == DescriptorFormat::Fm)
    }

    pub fn sha_type(&self) -> Result<ShaType> {
        Ok(ShaType::from_magic(self.fragment.get_u32(SHA_TYPE_OFFSET)?))
    }

    /// The 64-byte tool information block.
    pub fn tool_information(&self) -> Result<&[u8]> {
        self.fragment
            .get_raw(TOOL_INFORMATION_OFFSET, TOOL_INFORMATION_SIZE)
    }

    pub fn build_number(&self) -> Result<u32> {
        self.fragment.get_u32(BUILD_NUMBER_OFFSET)
    }

    /// Packed ACDS version: major, minor, update, patch from the top byte down.
    pub fn version(&self) -> Result<u32> {
        self.fragment.get_u32(VERSION_OFFSET)
    }

    /// Render the version as `major.minor[.update] bBUILD[ pPATCH]`.
    pub fn version_string(&self) -> Result<String> {
        let version = self.version()?;
        let major = (version >> 24) & 0xFF;
        let minor = (version >> 16) & 0xFF;
        let update = (version >> 8) & 0xFF;
        let patch = version & 0xFF;

        let mut text = format!("{major}.{minor}");
        if update != 0 {
            text.push_str(&format!(".{update}"));
        }
        text.push_str(&format!(" b{}", self.build_number()?));
        if patch != 0 {
            text.push_str(&format!(" p{patch}"));
        }
        Ok(text)
    }

    /// NUL-trimmed build label.
    pub fn build_label(&self) -> Result<String> {
        let raw = self.fragment.get_raw(BUILD_LABEL_OFFSET, BUILD_LABEL_SIZE)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub fn physical_jtag(&self) -> Result<String> {
        Ok(format!("0x{:7X}", self.fragment.get_u32(PHYSICAL_JTAG_OFFSET)?))
    }

    /// JTAG id with masked nibbles rendered as `X` (zero) or `&` (non-zero).
    ///
    /// SDM-lite descriptors carry either the raw id or one with the fixed
    /// 0x032000DD bits stripped; the latter is shown "cooked".
    pub fn jtag_id(&self) -> Result<String> {
        let id = self.fragment.get_u32(JTAG_ID_OFFSET)?;
        let mask = self.fragment.get_u32(JTAG_MASK_OFFSET)?;

        let mut note = "";
        if self.format()? == DescriptorFormat::SdmLite {
            let masked = id & 0x0FF0_0FFF;
            note = if masked == 0x0320_00DD {
                "(raw)"
            } else {
                "(cooked)"
            };
        }

        let mut text = String::new();
        let mut show_mask = false;
        for shift in (0..8).rev().map(|i| i * 4) {
            let m = (mask >> shift) & 0xF;
            let d = (id >> shift) & 0xF;
            match (m, d) {
                (0, 0) => text.push('X'),
                (0, _) => text.push('&'),
                _ => {
                    text.push_str(&format!("{d:X}"));
                    show_mask |= m != 0xF;
                }
            }
        }
        if show_mask {
            text.push_str(&format!("/{mask:08X}"));
        }
        text.push_str(note);
        Ok(text)
    }

    pub fn osc1_clock(&self) -> Result<String> {
        let value = self.fragment.get_u32(OSC1_CLOCK_OFFSET)?;
        if value & (1 << 31) != 0 {
            return Ok("Internal Oscillator".to_string());
        }
        let frequency = value & ((1 << 28) - 1);
        Ok(match frequency {
            0 => "Disabled".to_string(),
            hz => format!("{hz}Hz"),
        })
    }

    pub fn configuration_type(&self) -> Result<&'static str> {
        let value = self
            .fragment
            .get_raw(CONFIGURATION_TYPE_OFFSET, 1)?[0];
        Ok(match value {
            0 => "other",
            8 => "AVSTx32",
            9 => "QSPI",
            10 => "NAND",
            12 => "SDMMC",
            13 => "AVSTx16",
            14 => "AVSTx8",
            _ => "unknown",
        })
    }

    pub fn hps_flags(&self) -> Result<&'static str> {
        let value = self.fragment.get_raw(HPS_FLAGS_OFFSET, 1)?[0];
        Ok(match value & 0x3 {
            0x3 => "HPS-JTAG: Illegal Setting",
            0x1 => "HPS-JTAG & SDM-JTAG: Same Chain",
            0x2 => "HPS-JTAG & SDM-JTAG: Separate",
            _ => "HPS-JTAG: Disabled",
        })
    }

    /// Release flag (bit 31 at 0x404).
    pub fn is_release(&self) -> Result<bool> {
        Ok(self.fragment.get_u32(RELEASE_OFFSET)? & RELEASE_FLAG != 0)
    }

    /// Number of sections following this CMF in the same file.
    pub fn sections_remaining(&self) -> Result<u32> {
        self.fragment.get_u32(SECTIONS_REMAINING_OFFSET)
    }

    pub fn set_sections_remaining(&mut self, count: u32) -> Result<()> {
        self.fragment.set_u32(count, SECTIONS_REMAINING_OFFSET)
    }

    /// [`validate`](Validate::validate) plus the checks the signing service applies.
    pub fn validate_for_signing(&self) -> Result<()> {
        self.validate()?;
        if self.tool_information()?.iter().any(|&b| b != 0) {
            return Err(Error::InvalidField(
                "cmf descriptor tool information at 0x80 must be zero before signing".to_string(),
            ));
        }
        Ok(())
    }

    fn check_word(&self, offset: usize, accepted: &[u32], what: &str) -> Result<()> {
        let value = self.fragment.get_u32(offset)?;
        if accepted.contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidField(format!(
                "cmf descriptor {what} at {offset:#x} is {value:#x}"
            )))
        }
    }
}

impl Validate for CmfDescriptor {
    fn validate(&self) -> Result<()> {
        if self.fragment.size() != DESCRIPTOR_SIZE {
            return Err(Error::LengthMismatch {
                field: "cmf descriptor",
                expected: DESCRIPTOR_SIZE,
                actual: self.fragment.size(),
            });
        }
        self.fragment.validate()?;

        let format = self.format()?;
        let sha = self.sha_type()?;
        let Some(required) = format.required_sha() else {
            return Err(Error::InvalidField(format!(
                "cmf descriptor format {:#x} is not SDM-lite, SDM-full or FM",
                format.value()
            )));
        };
        if sha != required {
            return Err(Error::InvalidField(format!(
                "SHA type {sha} at 0x13C is not valid for {format}"
            )));
        }

        self.check_word(HEADER_LENGTH_OFFSET, &[BOOTROM_HEADER_LENGTH], "bootrom header length")?;
        self.check_word(FLAGS_OFFSET, &[0], "flags")?;
        self.check_word(RELEASE_OFFSET, &[0, RELEASE_FLAG], "public version")?;
        self.check_word(SECTION_TYPE_OFFSET, &[CMF_SECTION_DESCRIPTOR], "section type")
    }
}

fragment_newtype!(CmfDescriptor);

impl fmt::Display for CmfDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " CmfDescriptor [Size={}]", self.fragment.size())?;
        if self.fragment.size() != DESCRIPTOR_SIZE {
            return Ok(());
        }
        let show = |r: Result<String>| r.unwrap_or_else(|e| format!("<{e}>"));
        writeln!(f, "  [Size: {} KBytes]", self.fragment.size() / 1024)?;
        writeln!(f, "  Format: {}", show(self.format().map(|v| v.to_string())))?;
        writeln!(f, "  SHA Type: {}", show(self.sha_type().map(|v| v.to_string())))?;
        writeln!(f, "  Version: {}", show(self.version_string()))?;
        writeln!(f, "  Build Label: {}", show(self.build_label()))?;
        writeln!(f, "  Jtag Physical ID: {}", show(self.physical_jtag()))?;
        writeln!(f, "  Jtag ID/Mask: {}", show(self.jtag_id()))?;
        writeln!(f, "  OSC Clock: {}", show(self.osc1_clock()))?;
        writeln!(f, "  HPS Flags: {}", show(self.hps_flags().map(str::to_string)))?;
        writeln!(
            f,
            "  Configuration Type: {}",
            show(self.configuration_type().map(str::to_string))
        )?;
        writeln!(f, "  Release: {}", show(self.is_release().map(|v| v.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::Fragment;

    /// Hand-built SDM-lite descriptor with both CRCs computed in order.
    fn init_cmf() -> CmfDescriptor {
        let mut cmf = CmfDescriptor::from_bytes(vec![0; DESCRIPTOR_SIZE]).unwrap();
        let fragment = cmf.fragment_mut();
        fragment.set_u32(0x6229_4895, 0).unwrap();
        fragment.set_u32(0x9756_6593, 0x400).unwrap();
        fragment.set_u32(0x4930_3819, 0x13C).unwrap();
        fragment.set_u32(0x400, 0x8).unwrap();
        fragment.set_u32(0x46_4D43, 0x40C).unwrap();
        let inner = fragment.crc(0x3B4, true).unwrap();
        fragment.set_u32(inner, 0x3B4).unwrap();
        let outer = fragment.crc(0xFFC, true).unwrap();
        fragment.set_u32(outer, 0xFFC).unwrap();
        cmf
    }

    #[test]
    fn test_constructor() {
        let mut cmf = init_cmf();
        cmf.validate().unwrap();
        cmf.update().unwrap();
        cmf.validate().unwrap();
        assert!(!cmf.is_fm_format().unwrap());
        assert_eq!(cmf.format().unwrap(), DescriptorFormat::SdmLite);
    }

    #[test]
    fn test_initialize_defaults() {
        let mut cmf = CmfDescriptor::new();
        cmf.initialize().unwrap();
        cmf.validate().unwrap();
        assert_eq!(cmf.format().unwrap().to_string(), "SDM-full");
        assert_eq!(cmf.sha_type().unwrap().to_string(), "SHA-512");
        assert_eq!(cmf.size(), DESCRIPTOR_SIZE);
        cmf.validate_for_signing().unwrap();
    }

    #[test]
    fn test_crc_update() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(0x0, 0x4).unwrap();
        cmf.fragment_mut().set_u32(0x400, 0x8).unwrap();
        cmf.fragment_mut().set_u32(0x0, 0xC).unwrap();
        cmf.update().unwrap();
        cmf.validate().unwrap();
    }

    #[test]
    fn test_inner_crc_tamper() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(0xDEAD, 0x200).unwrap();
        assert!(matches!(
            cmf.validate(),
            Err(Error::CrcMismatch { address: 0x3B4, .. })
        ));
    }

    #[test]
    fn test_fm_format() {
        let mut cmf = init_cmf();
        cmf.set_format(DescriptorFormat::Fm).unwrap();
        cmf.update().unwrap();
        cmf.validate().unwrap();
        assert!(cmf.is_fm_format().unwrap());
        assert_eq!(cmf.sha_type().unwrap(), ShaType::Sha512);
    }

    #[test]
    fn test_format_sha_mismatch() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(0x10, 0x4).unwrap();
        cmf.update().unwrap();
        assert!(matches!(cmf.validate(), Err(Error::InvalidField(_))));

        cmf.fragment_mut().set_u32(0x30, 0x4).unwrap();
        cmf.update().unwrap();
        assert!(matches!(cmf.validate(), Err(Error::InvalidField(_))));
    }

    #[test]
    fn test_field_constraints() {
        for (offset, value) in [(0x8, 0x200), (0xC, 1), (0x404, 1), (0x40C, 0)] {
            let mut cmf = init_cmf();
            cmf.fragment_mut().set_u32(value, offset).unwrap();
            cmf.update().unwrap();
            assert!(
                matches!(cmf.validate(), Err(Error::InvalidField(_))),
                "offset {offset:#x}"
            );
        }

        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(1 << 31, 0x404).unwrap();
        cmf.update().unwrap();
        cmf.validate().unwrap();
        assert!(cmf.is_release().unwrap());
    }

    #[test]
    fn test_size_mismatch() {
        let cmf = CmfDescriptor::from_bytes(vec![0; 100]).unwrap();
        assert!(matches!(
            cmf.validate(),
            Err(Error::LengthMismatch { expected: 4096, actual: 100, .. })
        ));
        assert!(CmfDescriptor::from_bytes(vec![0; 4097]).is_err());
    }

    #[test]
    fn test_version_string() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(0x1200_0043, 0x420).unwrap();
        cmf.fragment_mut().set_u32(67, 0x42C).unwrap();
        assert_eq!(cmf.version_string().unwrap(), "18.0 b67 p67");

        cmf.fragment_mut().set_u32(0x1301_0200, 0x420).unwrap();
        assert_eq!(cmf.version_string().unwrap(), "19.1.2 b67");
    }

    #[test]
    fn test_build_label() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_raw(b"pro-build", 0xFE0).unwrap();
        assert_eq!(cmf.build_label().unwrap(), "pro-build");
    }

    #[test]
    fn test_jtag_id() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_u32(0x0341_20DD, 0x180).unwrap();
        cmf.fragment_mut().set_u32(0x0FFF_FFFF, 0x184).unwrap();
        assert_eq!(cmf.jtag_id().unwrap(), "X34120DD(cooked)");

        cmf.fragment_mut().set_u32(0x10, 0x4).unwrap();
        cmf.fragment_mut().set_u32(0xF0FF_FFF8, 0x184).unwrap();
        assert_eq!(cmf.jtag_id().unwrap(), "0&4120DD/F0FFFFF8");
    }

    #[test]
    fn test_osc_and_flags() {
        let mut cmf = init_cmf();
        assert_eq!(cmf.osc1_clock().unwrap(), "Disabled");
        cmf.fragment_mut().set_u32(125_000_000, 0x94).unwrap();
        assert_eq!(cmf.osc1_clock().unwrap(), "125000000Hz");
        cmf.fragment_mut().set_u32(1 << 31, 0x94).unwrap();
        assert_eq!(cmf.osc1_clock().unwrap(), "Internal Oscillator");

        cmf.fragment_mut().set_raw(&[0x3], 0x499).unwrap();
        assert_eq!(cmf.hps_flags().unwrap(), "HPS-JTAG: Illegal Setting");
        cmf.fragment_mut().set_raw(&[9], 0x49B).unwrap();
        assert_eq!(cmf.configuration_type().unwrap(), "QSPI");
    }

    #[test]
    fn test_hps_flags_values() {
        let mut cmf = init_cmf();
        for (value, expected) in [
            (0x0, "HPS-JTAG: Disabled"),
            (0x1, "HPS-JTAG & SDM-JTAG: Same Chain"),
            (0x2, "HPS-JTAG & SDM-JTAG: Separate"),
            (0x3, "HPS-JTAG: Illegal Setting"),
            (0x7, "HPS-JTAG: Illegal Setting"),
        ] {
            cmf.fragment_mut().set_raw(&[value], 0x499).unwrap();
            assert_eq!(cmf.hps_flags().unwrap(), expected);
        }
    }

    #[test]
    fn test_tool_information_blocks_signing() {
        let mut cmf = init_cmf();
        cmf.fragment_mut().set_raw(&[1], 0x90).unwrap();
        cmf.update().unwrap();
        cmf.validate().unwrap();
        assert!(matches!(
            cmf.validate_for_signing(),
            Err(Error::InvalidField(_))
        ));
    }

    #[test]
    fn test_display() {
        let mut cmf = CmfDescriptor::new();
        cmf.initialize().unwrap();
        let text = cmf.to_string();
        assert!(text.contains("Format: SDM-full"));
        assert!(text.contains("SHA Type: SHA-512"));
        assert!(text.contains("Version: 0.0 b0"));
    }
}
