//! Bitstream zip archives.
//!
//! A zip holds named bitstream files plus a `<stem>_sha256.chk` manifest
//! listing `<sha256>  <name>` for every other entry, in archive order.
//! Loading verifies each entry against the manifest before parsing it.
//!
//! # Examples
//!
//! ```no_run
//! use cmfsign::archive::{BitstreamZip, CompressionLevel};
//! use cmfsign::BitstreamFactory;
//!
//! let mut zip = BitstreamZip::new();
//! zip.insert("design.cmf", BitstreamFactory::load("design.cmf")?);
//! zip.save("release.zip", CompressionLevel::DEFAULT)?;
//!
//! let loaded = BitstreamZip::load("release.zip")?;
//! assert_eq!(loaded.names().collect::<Vec<_>>(), ["design.cmf"]);
//! # Ok::<(), cmfsign::Error>(())
//! ```

use crate::bitstream::{Fragment, Validate};
use crate::factory::{Bitstream, BitstreamFactory};
use crate::{Error, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Suffix of the manifest entry name.
pub const MANIFEST_SUFFIX: &str = "_sha256.chk";

/// ZIP compression level (0-9).
///
/// ```
/// use cmfsign::archive::CompressionLevel;
///
/// assert_eq!(CompressionLevel::new(15).level(), 9);
/// assert_eq!(CompressionLevel::default(), CompressionLevel::DEFAULT);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// Stored entries.
    pub const NONE: CompressionLevel = CompressionLevel(0);
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);
    pub const MAX: CompressionLevel = CompressionLevel(9);

    /// Values above 9 are clamped.
    #[must_use]
    pub fn new(level: u32) -> Self {
        CompressionLevel(level.min(9))
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.0
    }

    fn options(self) -> SimpleFileOptions {
        if self.0 == 0 {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(self.0 as i64))
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An ordered name → [`Bitstream`] map stored as a zip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitstreamZip {
    entries: Vec<(String, Bitstream)>,
}

impl BitstreamZip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bitstream` under `name`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, bitstream: Bitstream) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = bitstream,
            None => self.entries.push((name, bitstream)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Bitstream> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, bitstream)| bitstream)
    }

    pub fn remove(&mut self, name: &str) -> Option<Bitstream> {
        let index = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bitstream)> {
        self.entries
            .iter()
            .map(|(name, bitstream)| (name.as_str(), bitstream))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Manifest text: one `<sha256>  <name>` line per entry.
    pub fn manifest(&self) -> String {
        self.entries
            .iter()
            .map(|(name, bitstream)| format!("{}  {name}\n", bitstream.sha256sum()))
            .collect()
    }

    /// Validate every entry and write the zip with its manifest.
    ///
    /// Nothing is written if any entry fails validation.
    pub fn save(&self, path: impl AsRef<Path>, level: CompressionLevel) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidField(format!("{} has no file name", path.display())))?;
        let manifest_name = format!("{stem}{MANIFEST_SUFFIX}");
        if self.get(&manifest_name).is_some() {
            return Err(Error::InvalidField(format!(
                "entry name {manifest_name} is reserved for the manifest"
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let options = level.options();
        let mut zip = ZipWriter::new(File::create(path)?);
        for (name, bitstream) in &self.entries {
            debug!("archive: writing {name} ({} bytes)", bitstream.size());
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bitstream.to_bytes())?;
        }
        zip.start_file(manifest_name.as_str(), options)?;
        zip.write_all(self.manifest().as_bytes())?;
        zip.finish()?;
        Ok(())
    }

    /// Read a zip, verify it against its manifest and parse every entry.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;

        let mut files = Vec::with_capacity(archive.len());
        let mut manifest = None;
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            if name.ends_with(MANIFEST_SUFFIX) {
                if manifest.is_some() {
                    return Err(Error::ManifestMismatch(format!(
                        "second manifest {name} in {}",
                        path.display()
                    )));
                }
                manifest = Some(String::from_utf8_lossy(&bytes).into_owned());
            } else {
                files.push((name, bytes));
            }
        }

        let manifest = manifest.ok_or_else(|| {
            Error::ManifestMismatch(format!("{} has no manifest", path.display()))
        })?;
        verify_manifest(&manifest, &files)?;

        let mut zip = Self::new();
        for (name, bytes) in files {
            debug!("archive: parsing {name}");
            zip.insert(name, BitstreamFactory::from_bytes(&bytes)?);
        }
        Ok(zip)
    }
}

impl Validate for BitstreamZip {
    fn validate(&self) -> Result<()> {
        for (_, bitstream) in &self.entries {
            bitstream.validate()?;
        }
        Ok(())
    }
}

fn parse_manifest(manifest: &str) -> Result<HashMap<&str, &str>> {
    let mut digests = HashMap::new();
    for line in manifest.lines().filter(|line| !line.trim().is_empty()) {
        let (digest, name) = line
            .split_once("  ")
            .ok_or_else(|| Error::ManifestMismatch(format!("malformed manifest line {line:?}")))?;
        if digests.insert(name.trim(), digest.trim()).is_some() {
            return Err(Error::ManifestMismatch(format!(
                "{name} is listed twice in the manifest"
            )));
        }
    }
    Ok(digests)
}

fn verify_manifest(manifest: &str, files: &[(String, Vec<u8>)]) -> Result<()> {
    let mut digests = parse_manifest(manifest)?;
    for (name, bytes) in files {
        let expected = digests
            .remove(name.as_str())
            .ok_or_else(|| Error::ManifestMismatch(format!("{name} is not in the manifest")))?;
        let actual = hex::encode(Sha256::digest(bytes));
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(Error::ManifestMismatch(format!(
                "{name}: manifest has {expected}, content hashes to {actual}"
            )));
        }
    }
    if let Some(name) = digests.keys().next() {
        return Err(Error::ManifestMismatch(format!(
            "{name} is listed in the manifest but missing from the archive"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::DescriptorFormat;
    use crate::container::{Cmf, EngineeringCert};
    use tempfile::TempDir;

    fn sample() -> BitstreamZip {
        let mut zip = BitstreamZip::new();
        zip.insert(
            "design.cmf",
            Bitstream::Cmf(Cmf::new(DescriptorFormat::SdmLite).unwrap()),
        );
        zip.insert(
            "device.cert",
            Bitstream::EngineeringCert(EngineeringCert::new("0x5", "0x0", "0x0").unwrap()),
        );
        zip
    }

    /// Rewrite `path` with `edit` applied to the (name, bytes) list.
    fn rewrite(path: &Path, edit: impl FnOnce(&mut Vec<(String, Vec<u8>)>)) {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut files = Vec::new();
        for index in 0..archive.len() {
            let mut file = archive.by_index(index).unwrap();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).unwrap();
            files.push((file.name().to_string(), bytes));
        }
        drop(archive);
        edit(&mut files);

        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in files {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut zip = sample();
        zip.insert(
            "design.cmf",
            Bitstream::Cmf(Cmf::new(DescriptorFormat::SdmFull).unwrap()),
        );
        assert_eq!(zip.names().collect::<Vec<_>>(), ["design.cmf", "device.cert"]);
        assert!(zip.remove("device.cert").is_some());
        assert_eq!(zip.len(), 1);
    }

    #[test]
    fn test_manifest_format() {
        let zip = sample();
        let manifest = zip.manifest();
        let first = manifest.lines().next().unwrap();
        let (digest, name) = first.split_once("  ").unwrap();
        assert_eq!(name, "design.cmf");
        assert_eq!(digest, zip.get("design.cmf").unwrap().sha256sum());
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("release.zip");
        let zip = sample();
        zip.save(&path, CompressionLevel::DEFAULT).unwrap();

        let archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert!(archive.file_names().any(|name| name == "release_sha256.chk"));

        let loaded = BitstreamZip::load(&path).unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), ["design.cmf", "device.cert"]);
        for (name, bitstream) in zip.iter() {
            assert_eq!(loaded.get(name).unwrap().to_bytes(), bitstream.to_bytes());
        }
    }

    #[test]
    fn test_stored_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stored.zip");
        sample().save(&path, CompressionLevel::NONE).unwrap();
        assert_eq!(BitstreamZip::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_tampered_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.zip");
        sample().save(&path, CompressionLevel::DEFAULT).unwrap();
        rewrite(&path, |files| {
            let cert = files.iter_mut().find(|(name, _)| name == "device.cert").unwrap();
            cert.1[0x800] ^= 1;
        });
        assert!(matches!(
            BitstreamZip::load(&path),
            Err(Error::ManifestMismatch(_))
        ));
    }

    #[test]
    fn test_missing_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.zip");
        sample().save(&path, CompressionLevel::DEFAULT).unwrap();
        rewrite(&path, |files| files.retain(|(name, _)| name != "design.cmf"));
        assert!(matches!(
            BitstreamZip::load(&path),
            Err(Error::ManifestMismatch(_))
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.zip");
        sample().save(&path, CompressionLevel::DEFAULT).unwrap();
        rewrite(&path, |files| files.retain(|(name, _)| !name.ends_with(MANIFEST_SUFFIX)));
        assert!(matches!(
            BitstreamZip::load(&path),
            Err(Error::ManifestMismatch(_))
        ));
    }

    #[test]
    fn test_invalid_entry_not_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        let mut cmf = Cmf::new(DescriptorFormat::SdmLite).unwrap();
        cmf.write_bytes(&[0xFF], 0x10).unwrap();
        let mut zip = BitstreamZip::new();
        zip.insert("broken.cmf", Bitstream::Cmf(cmf));
        assert!(zip.save(&path, CompressionLevel::DEFAULT).is_err());
        assert!(!path.exists());
    }
}
