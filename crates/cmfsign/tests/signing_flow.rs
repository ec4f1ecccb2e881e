//! End-to-end offline signing: keychain creation, key delegation, CMF and
//! certificate signing, persistence and zip packaging.

use cmfsign::bitstream::{
    Curve, DescriptorFormat, EcdsaPublicKey, EcdsaSignature, HashSelector, KeyFormat, KeyOptions,
};
use cmfsign::chain::{ChainSectionFormat, EntryKind, SignatureChain, SignatureChainEntry};
use cmfsign::container::{BitstreamSection, Cmf, EngineeringCert};
use cmfsign::{
    Bitstream, BitstreamFactory, BitstreamZip, CmfSigner, CompressionLevel, CssModule, Error,
    Fragment, ModuleSigner, Result, Validate,
};
use hex_literal::hex;
use std::cell::RefCell;
use tempfile::TempDir;

const ROOT_X: [u8; 48] = hex!(
    "aa87ca22be8b05378eb1c71ef320ad746e1d3b628ba79b9859f741e082542a385502f25dbf55296c3a545e3872760ab7"
);
const ROOT_Y: [u8; 48] = hex!(
    "3617de4a96262c6f5d9e98bf9292dc29f8f41dbd289a147ce9da3113b5f0b8c00a60b1ce1d7e819d7a431d7c90ea0e5f"
);

/// Stand-in for the signing service: signs with r = digest, s = reversed
/// digest and remembers what it was asked to sign.
#[derive(Default)]
struct RecordingService {
    requests: RefCell<Vec<[u8; 48]>>,
}

impl ModuleSigner for RecordingService {
    fn sign(&self, module: &CssModule) -> Result<EcdsaSignature> {
        let digest = module.payload_sha384()?;
        self.requests.borrow_mut().push(digest);
        let mut s = digest;
        s.reverse();
        EcdsaSignature::from_rs(&digest, &s)
    }
}

fn root_key(format: KeyFormat) -> EcdsaPublicKey {
    EcdsaPublicKey::from_xy(format, Curve::Secp384r1, &ROOT_X, &ROOT_Y, &KeyOptions::default())
        .unwrap()
}

fn code_signing_key(seed: u8) -> EcdsaPublicKey {
    EcdsaPublicKey::from_xy(
        KeyFormat::SingleRoot,
        Curve::Secp384r1,
        &[seed; 48],
        &[seed ^ 0xFF; 48],
        &KeyOptions::default(),
    )
    .unwrap()
}

fn root_keychain() -> SignatureChain {
    let mut chain = SignatureChain::new();
    chain
        .append(SignatureChainEntry::root(root_key(KeyFormat::SingleRoot), HashSelector::Intel).unwrap())
        .unwrap();
    chain
}

#[test]
fn test_sign_cmf_through_delegated_keychain() {
    let dir = TempDir::new().unwrap();
    let service = RecordingService::default();

    let root_path = dir.path().join("keys").join("root.qky");
    root_keychain().save(&root_path).unwrap();

    let delegated = CmfSigner::new()
        .keychain_file(&root_path)
        .sign_key(code_signing_key(0x21), &service)
        .unwrap();
    let delegated_path = dir.path().join("keys").join("code.qky");
    delegated.save(&delegated_path).unwrap();

    let mut cmf = Cmf::new(DescriptorFormat::SdmFull).unwrap();
    cmf.push_section(
        BitstreamSection::new(0x4F49_5348, vec![0x5A; 256], ChainSectionFormat::Classic).unwrap(),
    )
    .unwrap();
    cmf.set_payload(b"fabric configuration".to_vec()).unwrap();
    let unsigned_path = dir.path().join("design.cmf");
    cmf.save(&unsigned_path).unwrap();
    assert!(BitstreamFactory::load(&unsigned_path)
        .unwrap()
        .needs_signing()
        .unwrap());

    let mut cmf = Cmf::for_read();
    cmf.load(&unsigned_path).unwrap();
    CmfSigner::new()
        .keychain_file(&delegated_path)
        .hash_selector(HashSelector::User)
        .sign_cmf(&mut cmf, &service)
        .unwrap();
    let signed_path = dir.path().join("design_signed.cmf");
    cmf.save(&signed_path).unwrap();

    let reloaded = BitstreamFactory::load(&signed_path).unwrap();
    assert!(!reloaded.needs_signing().unwrap());
    let cmf = reloaded.as_cmf().unwrap();
    assert_eq!(cmf.sections().len(), 1);
    assert_eq!(cmf.payload(), b"fabric configuration");

    let chain = cmf.signature_descriptor().signature_chains().next().unwrap();
    let kinds: Vec<_> = chain.iter().map(|entry| entry.kind()).collect();
    assert_eq!(kinds, [EntryKind::Root, EntryKind::PublicKey, EntryKind::Block0]);

    let requests = service.requests.borrow();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], cmf.cmf_descriptor().sha384());
    let block0 = chain.last_entry().unwrap().signature().unwrap().unwrap();
    assert_eq!(block0.r().unwrap(), cmf.cmf_descriptor().sha384().as_slice());
}

#[test]
fn test_fm_cmf_with_multi_root_keychain() {
    let service = RecordingService::default();
    let mut second = root_key(KeyFormat::MultiRoot);
    second.set_permission(0x1).unwrap();
    let mut keychain = SignatureChain::new();
    keychain
        .append(
            SignatureChainEntry::multi_root(
                vec![root_key(KeyFormat::MultiRoot), second],
                HashSelector::Intel,
            )
            .unwrap(),
        )
        .unwrap();

    let mut cmf = Cmf::new(DescriptorFormat::Fm).unwrap();
    assert_eq!(
        cmf.signature_descriptor().format().unwrap(),
        ChainSectionFormat::MultiRoot
    );
    CmfSigner::new()
        .keychain(keychain)
        .sign_cmf(&mut cmf, &service)
        .unwrap();

    let parsed = BitstreamFactory::from_bytes(&cmf.to_bytes()).unwrap();
    let chain = parsed
        .as_cmf()
        .unwrap()
        .signature_descriptor()
        .signature_chains()
        .next()
        .unwrap()
        .clone();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.root_entry().unwrap().public_keys().len(), 2);
    assert_eq!(
        chain.root_entry().unwrap().public_keys()[1].contribution().unwrap(),
        0x0000_FFFF
    );
}

#[test]
fn test_sign_cert_and_package() {
    let dir = TempDir::new().unwrap();
    let service = RecordingService::default();

    let mut cert = EngineeringCert::new("0x0123456789abcdef", "0x0", "0x0").unwrap();
    CmfSigner::new()
        .keychain(root_keychain())
        .sign_cert(&mut cert, &service)
        .unwrap();

    let mut cmf = Cmf::new(DescriptorFormat::SdmFull).unwrap();
    CmfSigner::new()
        .keychain(root_keychain())
        .sign_cmf(&mut cmf, &service)
        .unwrap();

    let mut zip = BitstreamZip::new();
    zip.insert("device.cert", Bitstream::EngineeringCert(cert.clone()));
    zip.insert("design.cmf", Bitstream::Cmf(cmf));
    zip.insert("root.qky", Bitstream::SignatureChain(root_keychain()));
    let path = dir.path().join("bundle.zip");
    zip.save(&path, CompressionLevel::MAX).unwrap();

    let loaded = BitstreamZip::load(&path).unwrap();
    loaded.validate().unwrap();
    assert_eq!(
        loaded.names().collect::<Vec<_>>(),
        ["device.cert", "design.cmf", "root.qky"]
    );
    assert_eq!(
        loaded.get("device.cert").unwrap().to_bytes(),
        cert.to_bytes()
    );
}

#[test]
fn test_signed_module_round_trip() {
    let cmf = Cmf::new(DescriptorFormat::SdmFull).unwrap();
    let service = RecordingService::default();

    let mut module = CssModule::for_cmf_descriptor(cmf.cmf_descriptor().clone()).unwrap();
    let signature = service.sign(&module).unwrap();
    module.set_signature(signature.clone()).unwrap();

    match BitstreamFactory::from_bytes(&module.to_bytes()).unwrap() {
        Bitstream::Module(parsed) => {
            assert_eq!(parsed.signature().unwrap(), Some(signature));
            assert_eq!(parsed.payload().unwrap(), cmf.cmf_descriptor().to_bytes());
        }
        other => panic!("parsed as {}", other.kind()),
    }
}

#[test]
fn test_tampered_signed_cmf_rejected() {
    let service = RecordingService::default();
    let mut cmf = Cmf::new(DescriptorFormat::SdmFull).unwrap();
    CmfSigner::new()
        .keychain(root_keychain())
        .sign_cmf(&mut cmf, &service)
        .unwrap();

    let mut bytes = cmf.to_bytes();
    // Build number inside the signed descriptor.
    bytes[0x42C] ^= 0x01;
    assert!(matches!(
        BitstreamFactory::from_bytes(&bytes),
        Err(Error::CrcMismatch { .. })
    ));
}
