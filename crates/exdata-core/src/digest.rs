//! # Content Digest — Algorithm-Tagged File Hashes
//!
//! Defines `HashAlgorithm` and `HashRef`, the content-addressed identifier
//! for every artifact the engine touches. The algorithm token doubles as
//! the cache subdirectory name and as the sidecar file suffix key
//! (`foo.bin` → `foo.bin.sha512`).
//!
//! ## Integrity Invariant
//!
//! A `HashRef` produced by [`HashAlgorithm::compute`] always carries a
//! non-empty lowercase hex value. The empty/unknown sentinel state
//! ([`HashRef::empty`]) exists only for files that have never been
//! tracked, and is rejected anywhere a computed digest is required.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::DigestError;

/// The hash algorithm used to identify artifact contents.
///
/// Only SHA-512 is in use today. Every digest carries an algorithm tag so
/// that cache layouts and sidecar files stay self-describing if another
/// algorithm is ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-512, rendered as 128 lowercase hex characters.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the algorithm identifier token (e.g. `"sha512"`).
    ///
    /// Used both as a cache subdirectory name and as the sidecar suffix key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
        }
    }

    /// Returns the sidecar file suffix, including the leading dot.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Sha512 => ".sha512",
        }
    }

    /// Compute the digest of a file's contents, streaming.
    ///
    /// Fails with [`DigestError::Io`] if the file is missing or unreadable.
    pub fn compute(&self, path: &Path) -> Result<HashRef, DigestError> {
        let mut file = File::open(path).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut hasher = Sha512::new();
        io::copy(&mut file, &mut hasher).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
        Ok(HashRef {
            algorithm: *self,
            value,
        })
    }

    /// Compute the sidecar path for a data file (`foo.bin` → `foo.bin.sha512`).
    pub fn sidecar_path(&self, data_path: &Path) -> PathBuf {
        let mut os = data_path.as_os_str().to_os_string();
        os.push(self.suffix());
        PathBuf::from(os)
    }

    /// Strip the sidecar suffix, recovering the data-file path.
    ///
    /// Returns `None` if `sidecar` does not end with this algorithm's suffix.
    pub fn strip_sidecar(&self, sidecar: &Path) -> Option<PathBuf> {
        let s = sidecar.to_str()?;
        let stripped = s.strip_suffix(self.suffix())?;
        if stripped.is_empty() {
            return None;
        }
        Some(PathBuf::from(stripped))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An algorithm-tagged content digest.
///
/// Equality covers both the algorithm and the hex value. Two refs with the
/// same hex value but different algorithms are different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRef {
    algorithm: HashAlgorithm,
    value: String,
}

impl HashRef {
    /// Create a digest from a known hex value.
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }

    /// The empty/unknown sentinel for a file that has never been hashed.
    pub fn empty(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            value: String::new(),
        }
    }

    /// Whether this ref carries a computed value.
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// The lowercase hex digest value. Empty for the sentinel state.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The algorithm that produced this digest.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Recompute the digest of `path` with this ref's algorithm and compare.
    pub fn verify(&self, path: &Path) -> Result<bool, DigestError> {
        let actual = self.algorithm.compute(path)?;
        Ok(*self == actual)
    }

    /// Like [`verify`](Self::verify), but a mismatch is an error carrying
    /// both digests and the offending path.
    pub fn check(&self, path: &Path) -> Result<(), DigestError> {
        let actual = self.algorithm.compute(path)?;
        if *self == actual {
            Ok(())
        } else {
            Err(DigestError::Mismatch {
                expected: Box::new(self.clone()),
                actual: Box::new(actual),
                path: path.to_path_buf(),
            })
        }
    }

    /// Render the plain-text sidecar representation: hex digest plus newline.
    pub fn to_sidecar_value(&self) -> String {
        format!("{}\n", self.value)
    }

    /// Parse a sidecar value (the hex digest, surrounding whitespace ignored).
    pub fn from_sidecar_value(
        algorithm: HashAlgorithm,
        text: &str,
    ) -> Result<Self, DigestError> {
        let value = text.trim();
        if value.is_empty() {
            return Err(DigestError::EmptySidecarValue);
        }
        Ok(Self::new(algorithm, value))
    }

    /// Read and parse a sidecar file.
    pub fn from_sidecar_file(algorithm: HashAlgorithm, path: &Path) -> Result<Self, DigestError> {
        let text = std::fs::read_to_string(path).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_sidecar_value(algorithm, &text)
    }

    /// Write (or refresh) a sidecar file with this digest.
    pub fn write_sidecar_file(&self, path: &Path) -> Result<(), DigestError> {
        std::fs::write(path, self.to_sidecar_value()).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for HashRef {
    /// Renders `sha512:<hex>`; the sentinel renders `sha512:<empty>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_value() {
            write!(f, "{}:{}", self.algorithm, self.value)
        } else {
            write!(f, "{}:<empty>", self.algorithm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // SHA-512 of "Example contents\n".
    const EXAMPLE_HEX: &str = "7f3f25018046549d08c6c9c97808e344aee60071164789a2077a5e34f4a219e4\
                               5b4f30bc671dc71d2f05d05cec9235a523ebba436254a2b0b3b794f0afd9a7c3";

    fn example_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("data.bin");
        fs::write(&path, "Example contents\n").unwrap();
        path
    }

    #[test]
    fn test_compute_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = example_file(&dir);
        let hash = HashAlgorithm::Sha512.compute(&path).unwrap();
        assert_eq!(hash.value(), EXAMPLE_HEX);
        assert!(hash.has_value());
    }

    #[test]
    fn test_compute_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = HashAlgorithm::Sha512
            .compute(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, DigestError::Io { .. }));
    }

    #[test]
    fn test_verify_and_check() {
        let dir = TempDir::new().unwrap();
        let path = example_file(&dir);
        let good = HashRef::new(HashAlgorithm::Sha512, EXAMPLE_HEX);
        assert!(good.verify(&path).unwrap());
        good.check(&path).unwrap();

        let bad = HashRef::new(HashAlgorithm::Sha512, "ab".repeat(64));
        assert!(!bad.verify(&path).unwrap());
        let err = bad.check(&path).unwrap_err();
        assert!(matches!(err, DigestError::Mismatch { .. }));
    }

    #[test]
    fn test_equality_covers_both_fields() {
        let a = HashRef::new(HashAlgorithm::Sha512, "aa");
        let b = HashRef::new(HashAlgorithm::Sha512, "aa");
        let c = HashRef::new(HashAlgorithm::Sha512, "bb");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_sentinel() {
        let empty = HashRef::empty(HashAlgorithm::Sha512);
        assert!(!empty.has_value());
        assert_eq!(empty.to_string(), "sha512:<empty>");
    }

    #[test]
    fn test_sidecar_round_trip() {
        let hash = HashRef::new(HashAlgorithm::Sha512, EXAMPLE_HEX);
        let text = hash.to_sidecar_value();
        assert_eq!(text, format!("{EXAMPLE_HEX}\n"));
        let parsed = HashRef::from_sidecar_value(HashAlgorithm::Sha512, &text).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_sidecar_value_rejects_empty() {
        let err = HashRef::from_sidecar_value(HashAlgorithm::Sha512, "  \n").unwrap_err();
        assert!(matches!(err, DigestError::EmptySidecarValue));
    }

    #[test]
    fn test_sidecar_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("data.bin.sha512");
        let hash = HashRef::new(HashAlgorithm::Sha512, EXAMPLE_HEX);
        hash.write_sidecar_file(&sidecar).unwrap();
        let read = HashRef::from_sidecar_file(HashAlgorithm::Sha512, &sidecar).unwrap();
        assert_eq!(read, hash);
    }

    #[test]
    fn test_sidecar_path_helpers() {
        let algo = HashAlgorithm::Sha512;
        let sidecar = algo.sidecar_path(Path::new("/p/sub/data/x.bin"));
        assert_eq!(sidecar, Path::new("/p/sub/data/x.bin.sha512"));
        let data = algo.strip_sidecar(&sidecar).unwrap();
        assert_eq!(data, Path::new("/p/sub/data/x.bin"));
        assert!(algo.strip_sidecar(Path::new("/p/x.bin")).is_none());
        assert!(algo.strip_sidecar(Path::new(".sha512")).is_none());
    }

    #[test]
    fn test_display() {
        let hash = HashRef::new(HashAlgorithm::Sha512, "abcd");
        assert_eq!(hash.to_string(), "sha512:abcd");
        assert_eq!(HashAlgorithm::Sha512.to_string(), "sha512");
    }
}
