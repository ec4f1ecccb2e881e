//! Magic numbers, field sizes and selectors for the secure-boot bitstream format
//!
//! All magic numbers are stored on disk as 4-byte little-endian integers.

// =============================================================================
// Descriptor Magic Numbers
// =============================================================================

/// CMF descriptor (bootrom header) magic at offset 0x0
pub const CMF_DESCRIPTOR: u32 = 0x6229_4895;

/// Generic section descriptor magic
pub const SECTION_DESCRIPTOR: u32 = 0x9756_6593;

/// Description block embedded at 0x400 of a CMF descriptor.
///
/// This block is itself a section descriptor whose type is [`CMF_SECTION_DESCRIPTOR`].
pub const CMF_DESCRIPTOR_CMF_DESCRIPTION: u32 = SECTION_DESCRIPTOR;

/// Section type "CMF" (ASCII, little-endian)
pub const CMF_SECTION_DESCRIPTOR: u32 = 0x0046_4D43;

/// Section type "CRT" (ASCII, little-endian) used by engineering certificates
pub const CERT_SECTION_DESCRIPTOR: u32 = 0x0054_5243;

/// Engineering certificate body magic
pub const CERTIFICATE_ENGINEERING: u32 = 0x31F4_E4C9;

/// Signature descriptor magic
pub const SIGNATURE_DESCRIPTOR: u32 = 0x52B2_C55D;

// =============================================================================
// Signature Chain Entry Magic Numbers
// =============================================================================

/// Root entry holding a single root public key
pub const SIGNATURE_SINGLE_ROOT_ENTRY: u32 = 0x7105_0792;

/// Root entry holding up to three root public keys
pub const SIGNATURE_MULTI_ROOT_ENTRY: u32 = 0x3533_6850;

/// Public key entry signed by the previous key in the chain
pub const SIGNATURE_PUBLIC_KEY_ENTRY: u32 = 0x9254_0917;

/// Terminal entry holding the payload signature
pub const SIGNATURE_BLOCK0_ENTRY: u32 = 0x1536_4367;

// =============================================================================
// Key and Signature Magic Numbers
// =============================================================================

/// Public key in single-root layout (x/y sizes at 0x4/0x8)
pub const PUBLIC_KEY_SINGLE_ROOT: u32 = 0x4065_6643;

/// Public key in multi-root layout (fuse enable/contribution at 0x4/0x8)
pub const PUBLIC_KEY_MULTI_ROOT: u32 = 0x5870_0660;

/// Both public key layouts
pub const PUBLIC_KEY_MAGICS: [u32; 2] = [PUBLIC_KEY_SINGLE_ROOT, PUBLIC_KEY_MULTI_ROOT];

/// ECDSA signature blob
pub const ECDSA_SIGNATURE: u32 = 0x7488_1520;

/// Curve magic for secp256r1 / prime256v1
pub const ELLIPTIC_CURVE_SECP256R1: u32 = 0xC7B8_8C74;

/// Curve magic for secp384r1
pub const ELLIPTIC_CURVE_SECP384R1: u32 = 0x08F0_7B47;

// =============================================================================
// Hash Type Magic Numbers
// =============================================================================

/// SHA-384 hash type
pub const HASH_SHA_384: u32 = 0x4930_3819;

/// SHA-512 hash type
pub const HASH_SHA_512: u32 = 0x2E9D_3A27;

// =============================================================================
// Sizes
// =============================================================================

/// CMF descriptor, section descriptor and certificate header size
pub const DESCRIPTOR_SIZE: usize = 4096;

/// Signature descriptor size
pub const SIGNATURE_DESCRIPTOR_SIZE: usize = 4096;

/// Engineering certificate file size (header + signature descriptor)
pub const ENGINEERING_CERT_SIZE: usize = DESCRIPTOR_SIZE + SIGNATURE_DESCRIPTOR_SIZE;

/// Signature chain entry header size
pub const ENTRY_HEADER_SIZE: usize = 0x18;

/// Reserved block preceding the key(s) of a root entry (MSW hash + reserved word)
pub const ROOT_ENTRY_RESERVED_SIZE: usize = 8;

/// Maximum public key size (secp384r1: 0x18 header + 2 * 48 coordinates)
pub const PUBLIC_KEY_MAX_SIZE: usize = 120;

/// Public key header size preceding the coordinates
pub const PUBLIC_KEY_HEADER_SIZE: usize = 0x18;

/// Maximum number of keys in a multi-root entry
pub const MULTI_ROOT_MAX_KEYS: usize = 3;

/// ECDSA signature header size preceding r and s
pub const ECDSA_SIGNATURE_HEADER_SIZE: usize = 0x10;

/// ECDSA P-384 signature size (header + r + s)
pub const ECDSA_SIGNATURE_SIZE: usize = ECDSA_SIGNATURE_HEADER_SIZE + 2 * 48;

/// Signature chain section header size
pub const CHAIN_SECTION_HEADER_SIZE: usize = 32;

/// Cancel id / permission value meaning "not set"
pub const KEY_FIELD_UNSET: u32 = 0xFFFF_FFFF;

// =============================================================================
// Hash Selectors
// =============================================================================

/// Signature chain hash selector (header offset 0x14).
///
/// Selects which fused key hash the root entry is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashSelector {
    /// Intel-owned root key
    #[default]
    Intel,
    /// User (owner) root key
    User,
    /// Engineering certificate root key
    Engineering,
    /// Manufacturing root key
    Manufacturing,
    /// Firmware upgrade root key
    Upgrade,
    /// Slot-specific key
    Slot,
}

impl HashSelector {
    /// Raw header value.
    pub const fn value(self) -> u32 {
        match self {
            HashSelector::Intel => 0,
            HashSelector::User => 1,
            HashSelector::Engineering => 2,
            HashSelector::Manufacturing => 3,
            HashSelector::Upgrade => 4,
            HashSelector::Slot => 5,
        }
    }

    /// Decode a raw header value.
    pub const fn from_value(value: u32) -> Option<Self> {
        Some(match value {
            0 => HashSelector::Intel,
            1 => HashSelector::User,
            2 => HashSelector::Engineering,
            3 => HashSelector::Manufacturing,
            4 => HashSelector::Upgrade,
            5 => HashSelector::Slot,
            _ => return None,
        })
    }

    /// Lowercase name as printed by `info`.
    pub const fn name(self) -> &'static str {
        match self {
            HashSelector::Intel => "intel",
            HashSelector::User => "user",
            HashSelector::Engineering => "engineering",
            HashSelector::Manufacturing => "manufacturing",
            HashSelector::Upgrade => "upgrade",
            HashSelector::Slot => "slot",
        }
    }
}

// =============================================================================
// Stream Tags
// =============================================================================

/// Magic numbers that may lead a stream handed to the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    CmfDescriptor,
    SectionDescriptor,
    SignatureSingleRootEntry,
    SignatureMultiRootEntry,
    SignaturePublicKeyEntry,
}

impl StreamTag {
    /// Classify the leading magic number of a stream.
    pub const fn from_magic(magic: u32) -> Option<Self> {
        Some(match magic {
            CMF_DESCRIPTOR => StreamTag::CmfDescriptor,
            SECTION_DESCRIPTOR => StreamTag::SectionDescriptor,
            SIGNATURE_SINGLE_ROOT_ENTRY => StreamTag::SignatureSingleRootEntry,
            SIGNATURE_MULTI_ROOT_ENTRY => StreamTag::SignatureMultiRootEntry,
            SIGNATURE_PUBLIC_KEY_ENTRY => StreamTag::SignaturePublicKeyEntry,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmf_section_type_is_ascii() {
        assert_eq!(&CMF_SECTION_DESCRIPTOR.to_le_bytes()[..3], b"CMF");
        assert_eq!(&CERT_SECTION_DESCRIPTOR.to_le_bytes()[..3], b"CRT");
    }

    #[test]
    fn test_hash_selector_values() {
        for value in 0..6 {
            let sel = HashSelector::from_value(value).unwrap();
            assert_eq!(sel.value(), value);
        }
        assert_eq!(HashSelector::from_value(6), None);
    }

    #[test]
    fn test_stream_tags() {
        assert_eq!(StreamTag::from_magic(CMF_DESCRIPTOR), Some(StreamTag::CmfDescriptor));
        assert_eq!(
            StreamTag::from_magic(SIGNATURE_MULTI_ROOT_ENTRY),
            Some(StreamTag::SignatureMultiRootEntry)
        );
        assert_eq!(StreamTag::from_magic(SIGNATURE_BLOCK0_ENTRY), None);
        assert_eq!(StreamTag::from_magic(0), None);
    }

    #[test]
    fn test_entry_sizes_are_aligned() {
        let root = ENTRY_HEADER_SIZE + ROOT_ENTRY_RESERVED_SIZE + PUBLIC_KEY_MAX_SIZE;
        let public_key = ENTRY_HEADER_SIZE + PUBLIC_KEY_MAX_SIZE + ECDSA_SIGNATURE_SIZE;
        let block0 = ENTRY_HEADER_SIZE + ECDSA_SIGNATURE_SIZE;
        assert_eq!((root, public_key, block0), (152, 256, 136));
        assert_eq!(root % 8 + public_key % 8 + block0 % 8, 0);
    }
}
