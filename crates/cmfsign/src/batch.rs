//! Parallel validation of many artifacts.
//!
//! Every file is parsed into its own object graph on a rayon worker; results
//! come back in input order.

use crate::archive::BitstreamZip;
use crate::bitstream::Validate;
use crate::factory::BitstreamFactory;
use crate::{Error, Result};
use log::debug;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions recognized as bitstream artifacts.
pub const ARTIFACT_EXTENSIONS: [&str; 4] = ["cmf", "cert", "qky", "zip"];

/// Outcome of validating one file.
#[derive(Debug)]
pub struct ValidationReport {
    pub path: PathBuf,
    /// What the file parsed as, when parsing got that far.
    pub kind: Option<&'static str>,
    pub result: Result<()>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARTIFACT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// All artifact files below `dir`, sorted by path.
pub fn collect_artifacts(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).follow_links(false) {
        let entry = entry
            .map_err(|e| Error::Io(io::Error::other(format!("Failed to walk directory: {e}"))))?;
        if entry.file_type().is_file() && is_artifact(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!("batch: {} artifacts below {}", found.len(), dir.as_ref().display());
    Ok(found)
}

/// Replace each directory in `paths` by the artifacts it contains.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(collect_artifacts(path)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn validate_file(path: &Path) -> (Option<&'static str>, Result<()>) {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        return (Some("zip"), BitstreamZip::load(path).and_then(|zip| zip.validate()));
    }
    match BitstreamFactory::load(path) {
        Ok(bitstream) => (Some(bitstream.kind()), bitstream.validate()),
        Err(e) => (None, Err(e)),
    }
}

/// Validate `paths` in parallel.
pub fn validate_files(paths: &[PathBuf]) -> Vec<ValidationReport> {
    paths
        .par_iter()
        .map(|path| {
            let (kind, result) = validate_file(path);
            let status = if result.is_ok() { "ok" } else { "failed" };
            debug!("batch: {} -> {status}", path.display());
            ValidationReport {
                path: path.clone(),
                kind,
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{DescriptorFormat, Fragment};
    use crate::container::{Cmf, EngineeringCert};
    use std::fs;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        Cmf::new(DescriptorFormat::SdmFull)
            .unwrap()
            .save(dir.join("a.cmf"))
            .unwrap();
        EngineeringCert::new("0x1", "0x0", "0x0")
            .unwrap()
            .save(dir.join("nested").join("b.cert"))
            .unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    }

    #[test]
    fn test_collect_artifacts() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let found = collect_artifacts(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.cmf"), dir.path().join("nested").join("b.cert")]
        );
    }

    #[test]
    fn test_validate_files_keeps_order() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let corrupt = dir.path().join("corrupt.cmf");
        let mut bytes = fs::read(dir.path().join("a.cmf")).unwrap();
        bytes[0x40] ^= 0xFF;
        fs::write(&corrupt, bytes).unwrap();

        let paths = vec![
            corrupt.clone(),
            dir.path().join("a.cmf"),
            dir.path().join("nested").join("b.cert"),
            dir.path().join("missing.qky"),
        ];
        let reports = validate_files(&paths);
        assert_eq!(
            reports.iter().map(|r| r.path.clone()).collect::<Vec<_>>(),
            paths
        );
        assert!(!reports[0].is_ok());
        assert!(reports[1].is_ok());
        assert_eq!(reports[1].kind, Some("cmf"));
        assert_eq!(reports[2].kind, Some("engineering certificate"));
        assert!(matches!(reports[3].result, Err(Error::Io(_))));
    }

    #[test]
    fn test_expand_paths() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let single = dir.path().join("notes.txt");
        let files = expand_paths(&[single.clone(), dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], single);
    }
}
