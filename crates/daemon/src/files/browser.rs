//! Directory listing below the root with per-file flags.

use std::fs;
use std::io;
use std::path::Path;

use protocol::messages::{FileEntry, FileEntryType, FileListResponse};
use protocol::{ErrorCode, ErrorResponse, HEARD_FLAG};
use thiserror::Error;
use tracing::{debug, warn};

use super::resolver::PathResolver;
use crate::attributes::AttributeStore;

/// Errors that can occur during directory browsing.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The requested directory does not exist.
    #[error("directory does not exist: {0}")]
    PathNotFound(String),

    /// The requested path is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BrowserError {
    /// Client-facing projection of this error.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            BrowserError::PathNotFound(_) => ErrorResponse::not_found(),
            BrowserError::NotADirectory(_) => {
                ErrorResponse::with_message(ErrorCode::BadRequest, "not a directory")
            }
            BrowserError::Io(_) => ErrorResponse::internal(),
        }
    }
}

/// Lists directories below the root.
///
/// Hidden entries (names starting with `.`) are never listed.
#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    resolver: PathResolver,
    attributes: AttributeStore,
}

impl DirectoryBrowser {
    /// Create a browser over `resolver`'s root, reading flags from `attributes`.
    pub fn new(resolver: PathResolver, attributes: AttributeStore) -> Self {
        Self {
            resolver,
            attributes,
        }
    }

    /// List the directory named by `reference`.
    ///
    /// An empty reference lists the root. A malformed or out-of-bounds
    /// reference also lists the root rather than failing.
    pub fn list(&self, reference: &str) -> Result<FileListResponse, BrowserError> {
        let root = self.resolver.root();
        let dir = match self.resolver.resolve_path(reference) {
            Ok(path) => path,
            Err(e) => {
                debug!("Listing root instead of {:?}: {}", reference, e);
                root.path().to_path_buf()
            }
        };

        let metadata = fs::metadata(&dir).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BrowserError::PathNotFound(reference.to_string())
            } else {
                BrowserError::Io(e)
            }
        })?;
        if !metadata.is_dir() {
            return Err(BrowserError::NotADirectory(reference.to_string()));
        }

        let relative_path = root.relative(&dir).unwrap_or_default();
        let parent_relative_path = if dir == root.path() {
            None
        } else {
            dir.parent().and_then(|p| root.relative(p))
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            // Follows symlinks; dangling links end up as `Other`.
            let (entry_type, size) = match fs::metadata(&path) {
                Ok(m) if m.is_dir() => (FileEntryType::Directory, 0),
                Ok(m) if m.is_file() => (FileEntryType::File, m.len()),
                _ => (FileEntryType::Other, 0),
            };

            let heard = entry_type == FileEntryType::File && self.heard(&path);

            entries.push(FileEntry {
                relative_path: join_relative(&relative_path, &name),
                name,
                entry_type,
                size,
                heard,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(FileListResponse {
            relative_path,
            parent_relative_path,
            entries,
        })
    }

    fn heard(&self, path: &Path) -> bool {
        match self.attributes.get_flag(path, HEARD_FLAG) {
            Ok(value) => value.unwrap_or(false),
            Err(e) if e.is_unsupported() => {
                debug!("Flags unavailable for {}: {}", path.display(), e);
                false
            }
            Err(e) => {
                warn!("Reporting {} as unheard: {}", path.display(), e);
                false
            }
        }
    }
}

fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
