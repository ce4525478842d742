//! Gzip tarball extraction with a single-root contract.
//!
//! A plugin tarball must unpack to exactly one top-level directory, which
//! becomes the plugin root. Anything else is rejected rather than guessed at.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use {flate2::read::GzDecoder, tar::Archive, tracing::debug};

use crate::error::{Error, IoContext, Result};

/// Unpack `archive` into `dest` and return the single top-level directory.
///
/// `dest` must be empty; it is created if missing.
pub fn extract_tarball(archive: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest).fs_context(|| format!("create {}", dest.display()))?;

    let file = File::open(archive).fs_context(|| format!("open {}", archive.display()))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_overwrite(true);

    let entries = tar
        .entries()
        .map_err(|e| Error::ExtractFailed(format!("read {}: {e}", archive.display())))?;

    let mut unpacked = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ExtractFailed(format!("bad tar entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::ExtractFailed(format!("bad tar path: {e}")))?
            .into_owned();

        let inside = entry
            .unpack_in(dest)
            .map_err(|e| Error::ExtractFailed(format!("unpack {}: {e}", path.display())))?;
        if !inside {
            return Err(Error::ExtractFailed(format!(
                "entry escapes destination: {}",
                path.display()
            )));
        }
        unpacked += 1;
    }

    debug!(archive = %archive.display(), entries = unpacked, "extracted tarball");
    single_root(dest)
}

/// The one top-level directory under `dir`.
pub fn single_root(dir: &Path) -> Result<PathBuf> {
    let mut roots = Vec::new();
    for entry in std::fs::read_dir(dir).fs_context(|| format!("read {}", dir.display()))? {
        let entry = entry.fs_context(|| format!("read {}", dir.display()))?;
        roots.push(entry);
    }

    match roots.as_slice() {
        [] => Err(Error::ExtractFailed("archive is empty".into())),
        [only] => {
            let file_type = only
                .file_type()
                .fs_context(|| format!("stat {}", only.path().display()))?;
            if file_type.is_dir() {
                Ok(only.path())
            } else {
                Err(Error::ExtractFailed(format!(
                    "top-level entry {} is not a directory",
                    only.file_name().to_string_lossy()
                )))
            }
        },
        many => {
            let mut names: Vec<String> = many
                .iter()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            Err(Error::ExtractFailed(format!(
                "expected one top-level directory, found {}: {}",
                names.len(),
                names.join(", ")
            )))
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        flate2::{Compression, write::GzEncoder},
    };

    /// Build a `.tar.gz` from `(path, contents)` pairs.
    pub(crate) fn build_tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn write_tarball(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("plugin.tar.gz");
        std::fs::write(&path, build_tarball(files)).unwrap();
        path
    }

    #[test]
    fn test_single_root_extracted() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_tarball(
            tmp.path(),
            &[
                ("demo-1.2.0/plugin.json", "{}"),
                ("demo-1.2.0/commands/run.md", "# run"),
            ],
        );

        let root = extract_tarball(&archive, &tmp.path().join("out")).unwrap();
        assert_eq!(root.file_name().unwrap(), "demo-1.2.0");
        assert_eq!(
            std::fs::read_to_string(root.join("commands/run.md")).unwrap(),
            "# run"
        );
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_tarball(tmp.path(), &[("a/one.txt", "1"), ("b/two.txt", "2")]);

        let err = extract_tarball(&archive, &tmp.path().join("out")).unwrap_err();
        match err {
            Error::ExtractFailed(msg) => assert!(msg.contains("found 2: a, b"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_top_level_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_tarball(tmp.path(), &[("README.md", "hi")]);

        let err = extract_tarball(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::ExtractFailed(ref msg) if msg.contains("not a directory")));
    }

    #[test]
    fn test_empty_archive_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_tarball(tmp.path(), &[]);

        let err = extract_tarball(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::ExtractFailed(ref msg) if msg == "archive is empty"));
    }

    #[test]
    fn test_not_gzip_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("plugin.tar.gz");
        std::fs::write(&archive, b"<html>not found</html>").unwrap();

        let err = extract_tarball(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::ExtractFailed(_)));
    }
}
