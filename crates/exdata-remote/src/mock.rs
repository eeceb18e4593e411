//! # Mock Backend — Directory-Backed Storage
//!
//! The built-in `mock` backend serves artifacts from a project-relative
//! directory and accepts uploads into a second directory. Both are
//! crawled at construction time and indexed by digest, so the digest
//! remains the authoritative key even though the underlying files carry
//! arbitrary names.
//!
//! Used as a test double throughout the workspace and as a real backend
//! tag for fixture-driven projects.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use exdata_core::{ConfigError, HashAlgorithm, HashRef, TransferError};

use crate::backend::{config_str, Backend, BackendContext, BackendFactory};

/// Directory-backed backend keyed by content digest.
#[derive(Debug)]
pub struct MockBackend {
    dir: PathBuf,
    upload_dir: PathBuf,
    map: RefCell<HashMap<HashRef, PathBuf>>,
}

impl MockBackend {
    /// Config node: `{ backend: mock, dir: <relpath>, upload_dir: <relpath> }`.
    ///
    /// Both directories are resolved against the project root. The serve
    /// directory must exist; the upload directory is created on first put.
    pub fn from_config(
        config: &serde_yaml::Mapping,
        context: &BackendContext,
    ) -> Result<Self, ConfigError> {
        let dir = context.project_root.join(config_str(config, "dir", context)?);
        let upload_dir = context
            .project_root
            .join(config_str(config, "upload_dir", context)?);
        if !dir.is_dir() {
            return Err(ConfigError::Invalid {
                path: context.config_file.clone(),
                reason: format!("mock backend dir does not exist: {}", dir.display()),
            });
        }
        let mut map = HashMap::new();
        crawl_into(&dir, context.algorithm, &mut map)?;
        if upload_dir.is_dir() {
            crawl_into(&upload_dir, context.algorithm, &mut map)?;
        }
        Ok(Self {
            dir,
            upload_dir,
            map: RefCell::new(map),
        })
    }

    /// The factory registered under the `mock` tag.
    pub fn factory() -> BackendFactory {
        Box::new(|config, context| {
            Ok(Box::new(Self::from_config(config, context)?) as Box<dyn Backend>)
        })
    }
}

/// Index every regular file directly under `dir` by its digest.
fn crawl_into(
    dir: &Path,
    algorithm: HashAlgorithm,
    map: &mut HashMap<HashRef, PathBuf>,
) -> Result<(), ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            let hash = algorithm.compute(&path).map_err(|err| ConfigError::Invalid {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            map.insert(hash, path);
        }
    }
    Ok(())
}

impl Backend for MockBackend {
    fn describe(&self) -> String {
        format!("mock:{}", self.dir.display())
    }

    fn can_upload(&self) -> bool {
        true
    }

    fn has(&self, hash: &HashRef, _relpath: Option<&Path>) -> Result<bool, TransferError> {
        Ok(self.map.borrow().contains_key(hash))
    }

    fn fetch(
        &self,
        hash: &HashRef,
        _relpath: Option<&Path>,
        dest: &Path,
    ) -> Result<(), TransferError> {
        let source = match self.map.borrow().get(hash) {
            Some(path) => path.clone(),
            None => {
                return Err(TransferError::NotFound {
                    backend: self.describe(),
                    hash: hash.clone(),
                })
            }
        };
        fs::copy(&source, dest)?;
        Ok(())
    }

    fn put(&self, hash: &HashRef, _relpath: &Path, source: &Path) -> Result<(), TransferError> {
        if !self.upload_dir.is_dir() {
            fs::create_dir_all(&self.upload_dir)?;
        }
        let dest = self.upload_dir.join(hash.value());
        fs::copy(source, &dest)?;
        self.map.borrow_mut().insert(hash.clone(), dest);
        Ok(())
    }
}
