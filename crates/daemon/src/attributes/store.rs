//! Typed boolean flags on top of an [`AttributeBackend`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::ErrorResponse;
use thiserror::Error;
use tracing::{debug, error};

use super::backend::{platform_backend, AttributeBackend};

/// Namespace every flag name is placed under.
pub const ATTRIBUTE_NAMESPACE: &str = "user.";

/// Errors raised by the attribute store.
///
/// `code` fields carry the raw platform error number (0 when unknown).
#[derive(Debug, Error)]
pub enum AttributeError {
    /// Writing the attribute failed.
    #[error("failed to write attribute {name} on {path}: {source} (code {code})")]
    MetadataWriteFailed {
        path: PathBuf,
        name: String,
        code: i32,
        #[source]
        source: io::Error,
    },

    /// Reading the attribute failed for a reason other than absence.
    #[error("failed to read attribute {name} on {path}: {source} (code {code})")]
    MetadataReadFailed {
        path: PathBuf,
        name: String,
        code: i32,
        #[source]
        source: io::Error,
    },

    /// The stored value is not a single 0 or 1 byte.
    #[error("attribute {name} on {path} holds an unexpected value: {detail}")]
    MetadataCorrupt {
        path: PathBuf,
        name: String,
        detail: String,
    },

    /// Extended attributes do not exist on this platform.
    #[error("extended attributes are not supported on this platform")]
    UnsupportedPlatform,

    /// The filesystem holding the file does not support extended attributes.
    #[error("filesystem does not support extended attributes: {path}")]
    UnsupportedFilesystem { path: PathBuf },

    /// The flag name is not usable as an attribute name.
    #[error("invalid flag name: {0:?}")]
    InvalidArgument(String),
}

impl AttributeError {
    /// Whether this error means the mechanism is missing rather than broken.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            AttributeError::UnsupportedPlatform | AttributeError::UnsupportedFilesystem { .. }
        )
    }

    /// Platform error code, if the error came from a syscall.
    pub fn code(&self) -> Option<i32> {
        match self {
            AttributeError::MetadataWriteFailed { code, .. }
            | AttributeError::MetadataReadFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Client-facing projection of this error.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            AttributeError::InvalidArgument(_) => ErrorResponse::bad_request(),
            _ => ErrorResponse::internal(),
        }
    }
}

/// Store for named boolean flags on files.
///
/// Every call goes straight to the backend; nothing is cached.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    backend: Arc<dyn AttributeBackend>,
}

impl AttributeStore {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<dyn AttributeBackend>) -> Self {
        Self { backend }
    }

    /// Create a store over the current platform's backend.
    pub fn platform() -> Self {
        Self::new(platform_backend())
    }

    /// Name of the backend in use.
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Store `value` as flag `name` on `path`.
    pub fn set_flag(&self, path: &Path, name: &str, value: bool) -> Result<(), AttributeError> {
        let attr = attribute_name(name)?;
        self.backend
            .set(path, &attr, &[u8::from(value)])
            .inspect_err(|e| log_failure("set", &attr, path, e))?;

        debug!("Set flag {}={} on {}", attr, value, path.display());
        Ok(())
    }

    /// Read flag `name` on `path`; `None` means it was never set.
    pub fn get_flag(&self, path: &Path, name: &str) -> Result<Option<bool>, AttributeError> {
        let attr = attribute_name(name)?;
        let data = self
            .backend
            .get(path, &attr)
            .inspect_err(|e| log_failure("read", &attr, path, e))?;

        let Some(data) = data else {
            return Ok(None);
        };

        let corrupt = |detail: String| {
            let err = AttributeError::MetadataCorrupt {
                path: path.to_path_buf(),
                name: attr.clone(),
                detail,
            };
            error!("{}", err);
            err
        };

        match data.as_slice() {
            [0] => Ok(Some(false)),
            [1] => Ok(Some(true)),
            [other] => Err(corrupt(format!("byte {other} is not 0 or 1"))),
            _ => Err(corrupt(format!("expected 1 byte, got {}", data.len()))),
        }
    }

    /// Flip flag `name` on `path`, treating an unset flag as `false`.
    ///
    /// Returns the new value.
    pub fn toggle_flag(&self, path: &Path, name: &str) -> Result<bool, AttributeError> {
        let new_value = !self.get_flag(path, name)?.unwrap_or(false);
        self.set_flag(path, name, new_value)?;
        Ok(new_value)
    }

    /// Remove flag `name` from `path`. Clearing an unset flag succeeds.
    pub fn clear_flag(&self, path: &Path, name: &str) -> Result<(), AttributeError> {
        let attr = attribute_name(name)?;
        self.backend
            .remove(path, &attr)
            .inspect_err(|e| log_failure("clear", &attr, path, e))
    }
}

/// Log a backend failure. A missing mechanism is expected on some hosts and
/// stays at `debug`; everything else is a fault.
fn log_failure(action: &str, attr: &str, path: &Path, err: &AttributeError) {
    if err.is_unsupported() {
        debug!("Cannot {} flag {} on {}: {}", action, attr, path.display(), err);
    } else {
        error!("Failed to {} flag {} on {}: {}", action, attr, path.display(), err);
    }
}

/// Build the namespaced attribute name for flag `name`.
fn attribute_name(name: &str) -> Result<String, AttributeError> {
    if name.is_empty() || name.contains('\0') {
        return Err(AttributeError::InvalidArgument(name.to_string()));
    }
    Ok(format!("{ATTRIBUTE_NAMESPACE}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::backend::{MemoryBackend, UnsupportedBackend};
    use protocol::ErrorCode;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber that records formatted log lines.
    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        (out, text)
    }

    fn memory_store() -> (AttributeStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (AttributeStore::new(backend.clone()), backend)
    }

    #[test]
    fn test_attribute_name() {
        assert_eq!(attribute_name("heard").unwrap(), "user.heard");
        assert!(matches!(
            attribute_name(""),
            Err(AttributeError::InvalidArgument(_))
        ));
        assert!(matches!(
            attribute_name("a\0b"),
            Err(AttributeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_then_get() {
        let (store, _) = memory_store();
        let path = Path::new("/music/a.mp3");

        assert_eq!(store.get_flag(path, "played").unwrap(), None);

        store.set_flag(path, "played", true).unwrap();
        assert_eq!(store.get_flag(path, "played").unwrap(), Some(true));

        store.set_flag(path, "played", false).unwrap();
        assert_eq!(store.get_flag(path, "played").unwrap(), Some(false));
    }

    #[test]
    fn test_encoding_is_single_byte_in_user_namespace() {
        let (store, backend) = memory_store();
        let path = Path::new("/music/a.mp3");

        store.set_flag(path, "heard", true).unwrap();
        assert_eq!(backend.get(path, "user.heard").unwrap(), Some(vec![1]));

        store.set_flag(path, "heard", false).unwrap();
        assert_eq!(backend.get(path, "user.heard").unwrap(), Some(vec![0]));
    }

    #[test]
    fn test_corrupt_values() {
        let (store, backend) = memory_store();
        let path = Path::new("/music/a.mp3");

        backend.set(path, "user.heard", &[2]).unwrap();
        assert!(matches!(
            store.get_flag(path, "heard"),
            Err(AttributeError::MetadataCorrupt { .. })
        ));

        backend.set(path, "user.heard", &[1, 0]).unwrap();
        assert!(matches!(
            store.get_flag(path, "heard"),
            Err(AttributeError::MetadataCorrupt { .. })
        ));

        backend.set(path, "user.heard", &[]).unwrap();
        assert!(matches!(
            store.get_flag(path, "heard"),
            Err(AttributeError::MetadataCorrupt { .. })
        ));
    }

    #[test]
    fn test_toggle() {
        let (store, _) = memory_store();
        let path = Path::new("/music/a.mp3");

        assert!(store.toggle_flag(path, "heard").unwrap());
        assert!(!store.toggle_flag(path, "heard").unwrap());
        assert_eq!(store.get_flag(path, "heard").unwrap(), Some(false));
    }

    #[test]
    fn test_clear() {
        let (store, _) = memory_store();
        let path = Path::new("/music/a.mp3");

        store.set_flag(path, "heard", true).unwrap();
        store.clear_flag(path, "heard").unwrap();
        store.clear_flag(path, "heard").unwrap();
        assert_eq!(store.get_flag(path, "heard").unwrap(), None);
    }

    #[test]
    fn test_unsupported_platform_is_distinguishable() {
        let store = AttributeStore::new(Arc::new(UnsupportedBackend));
        let err = store.get_flag(Path::new("/a.mp3"), "heard").unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.to_response().code, ErrorCode::Internal);
        assert_eq!(store.backend_kind(), "unsupported");
    }

    #[test]
    fn test_unsupported_read_logs_below_error() {
        let store = AttributeStore::new(Arc::new(UnsupportedBackend));

        let (result, logs) = with_captured_logs(|| store.get_flag(Path::new("/a.mp3"), "heard"));
        assert!(result.unwrap_err().is_unsupported());
        assert!(logs.contains("DEBUG"), "{logs}");
        assert!(!logs.contains("ERROR"), "{logs}");
    }

    #[test]
    fn test_corrupt_read_logs_error() {
        let (store, backend) = memory_store();
        let path = Path::new("/music/a.mp3");
        backend.set(path, "user.heard", &[9]).unwrap();

        let (result, logs) = with_captured_logs(|| store.get_flag(path, "heard"));
        assert!(result.is_err());
        assert!(logs.contains("ERROR"), "{logs}");
    }

    #[test]
    fn test_error_code_accessor() {
        let err = AttributeError::MetadataWriteFailed {
            path: PathBuf::from("/a.mp3"),
            name: "user.heard".to_string(),
            code: 13,
            source: io::Error::from_raw_os_error(13),
        };
        assert_eq!(err.code(), Some(13));
        assert!(!err.is_unsupported());
        assert!(err.to_string().contains("code 13"));
        assert_eq!(AttributeError::UnsupportedPlatform.code(), None);
    }

    #[test]
    fn test_platform_store_roundtrip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("song.mp3");
        fs::write(&file, "ID3").unwrap();

        let store = AttributeStore::platform();
        match store.get_flag(&file, "played") {
            Ok(None) => {}
            Err(e) if e.is_unsupported() => return,
            other => panic!("unexpected result: {other:?}"),
        }

        store.set_flag(&file, "played", true).unwrap();
        assert_eq!(store.get_flag(&file, "played").unwrap(), Some(true));

        store.set_flag(&file, "played", false).unwrap();
        assert_eq!(store.get_flag(&file, "played").unwrap(), Some(false));
    }
}
