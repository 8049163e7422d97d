//! Resolution of client-supplied paths into readable files.
//!
//! A reference such as `albums/intro.mp3` is joined onto the root directory,
//! lexically normalized and checked for containment before anything touches
//! the filesystem. Only then is the file opened and handed back as a stream.

use std::io;
use std::path::{Component, Path, PathBuf};

use protocol::ErrorResponse;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::content_type::content_type_for;
use super::root::RootDirectory;

/// Encoded forms that would smuggle separators or NULs past the textual check.
const FORBIDDEN_ENCODINGS: &[&str] = &["%2f", "%5c", "%00"];

/// Errors that can occur while resolving a reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The reference points outside the root directory.
    #[error("path is outside the root directory: {0}")]
    OutOfBoundsPath(String),

    /// No regular file exists at the resolved path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The reference itself is malformed.
    #[error("invalid path reference: {0}")]
    InvalidArgument(String),

    /// IO error while opening the file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ResolveError {
    /// Whether the failure was caused by client input.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ResolveError::Io(_))
    }

    /// Client-facing projection of this error.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            ResolveError::OutOfBoundsPath(_) | ResolveError::InvalidArgument(_) => {
                ErrorResponse::bad_request()
            }
            ResolveError::NotFound(_) => ErrorResponse::not_found(),
            ResolveError::Io(_) => ErrorResponse::internal(),
        }
    }
}

/// An opened file ready to be streamed to a client.
///
/// Dropping this value, or the stream produced from it, closes the handle.
#[derive(Debug)]
pub struct ResolvedFile {
    file: File,
    path: PathBuf,
    file_name: String,
    content_type: &'static str,
    len: u64,
}

impl ResolvedFile {
    /// Absolute path of the opened file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, suitable as a suggested download name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content type inferred from the extension.
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// File length at the time it was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file was empty when opened.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert into a stream of byte chunks.
    pub fn into_stream(self) -> ReaderStream<File> {
        ReaderStream::new(self.file)
    }

    /// Read the whole file into memory.
    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// Resolves relative references against a [`RootDirectory`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: RootDirectory,
}

impl PathResolver {
    /// Create a resolver bounded by `root`.
    pub fn new(root: RootDirectory) -> Self {
        Self { root }
    }

    /// The root directory this resolver is bounded by.
    pub fn root(&self) -> &RootDirectory {
        &self.root
    }

    /// Join `reference` onto the root and verify containment.
    ///
    /// Returns the normalized absolute path, which may be the root itself.
    /// Nothing on disk is consulted.
    pub fn resolve_path(&self, reference: &str) -> Result<PathBuf, ResolveError> {
        check_reference(reference)?;

        let candidate = normalize(&self.root.path().join(reference));
        if !self.root.contains(&candidate) {
            debug!("Rejected out-of-bounds reference {:?}", reference);
            return Err(ResolveError::OutOfBoundsPath(reference.to_string()));
        }

        Ok(candidate)
    }

    /// Resolve `reference` to an existing regular file below the root.
    pub fn resolve_file_path(&self, reference: &str) -> Result<PathBuf, ResolveError> {
        let path = self.resolve_path(reference)?;
        if path == self.root.path() || names_directory(reference) || !path.is_file() {
            debug!("No file for reference {:?}", reference);
            return Err(ResolveError::NotFound(reference.to_string()));
        }
        Ok(path)
    }

    /// Resolve `reference` and open the file for streaming.
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedFile, ResolveError> {
        let path = self.resolve_path(reference)?;
        if path == self.root.path() || names_directory(reference) {
            debug!("No file for reference {:?}", reference);
            return Err(ResolveError::NotFound(reference.to_string()));
        }

        let not_found = |e: io::Error| {
            if e.kind() == io::ErrorKind::NotFound {
                debug!("No file for reference {:?}", reference);
                ResolveError::NotFound(reference.to_string())
            } else {
                error!("Failed to open {}: {}", path.display(), e);
                ResolveError::Io(e)
            }
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(not_found)?;
        if !metadata.is_file() {
            debug!("Reference {:?} is not a regular file", reference);
            return Err(ResolveError::NotFound(reference.to_string()));
        }

        let file = File::open(&path).await.map_err(not_found)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ResolvedFile {
            file,
            content_type: content_type_for(&path),
            file_name,
            len: metadata.len(),
            path,
        })
    }
}

/// Reject references that could slip past the textual containment check.
fn check_reference(reference: &str) -> Result<(), ResolveError> {
    if reference.contains('\0') {
        return Err(ResolveError::InvalidArgument(
            "reference contains a NUL byte".to_string(),
        ));
    }

    if reference.contains('\\') {
        return Err(ResolveError::InvalidArgument(
            "reference contains a backslash".to_string(),
        ));
    }

    let lowered = reference.to_ascii_lowercase();
    if FORBIDDEN_ENCODINGS.iter().any(|enc| lowered.contains(enc)) {
        return Err(ResolveError::InvalidArgument(
            "reference contains an encoded separator".to_string(),
        ));
    }

    Ok(())
}

/// Whether `reference` can only name a directory, like `a.mp3/` or `a.mp3/.`.
///
/// Normalization drops the trailing component, so this is checked on the
/// reference itself.
fn names_directory(reference: &str) -> bool {
    reference.ends_with('/') || reference.ends_with("/.")
}

/// Lexically resolve `.` and `..` components.
///
/// `..` never climbs above the filesystem root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
