//! The configured root directory.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while establishing the root directory.
#[derive(Debug, Error)]
pub enum RootError {
    /// The configured path does not exist.
    #[error("root directory does not exist: {0}")]
    Missing(PathBuf),

    /// The configured path exists but is not a directory.
    #[error("root directory is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// IO error while canonicalizing the path.
    #[error("failed to open root directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Absolute, canonical path bounding every servable file.
///
/// Built once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDirectory {
    path: PathBuf,
}

impl RootDirectory {
    /// Validate and canonicalize `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, RootError> {
        let path = path.as_ref();

        let canonical = fs::canonicalize(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RootError::Missing(path.to_path_buf())
            } else {
                RootError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if !canonical.is_dir() {
            return Err(RootError::NotADirectory(path.to_path_buf()));
        }

        Ok(Self { path: canonical })
    }

    /// The canonical root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `candidate` is the root itself or lies below it.
    ///
    /// `candidate` must already be lexically normalized. Components are
    /// compared as raw OS strings, so `/files2` never matches a root of
    /// `/files` and names that are not valid UTF-8 compare exactly.
    pub fn contains(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.path)
    }

    /// Express `path` relative to the root, `None` if it is outside.
    ///
    /// The root itself maps to the empty string.
    pub fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.path)
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}
