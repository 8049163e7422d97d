//! Platform implementations of raw attribute access.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::store::AttributeError;

/// Raw extended attribute operations on a single file.
///
/// `name` is the fully namespaced attribute name. Implementations translate
/// platform error codes into [`AttributeError`]; a missing attribute is
/// `Ok(None)` from [`get`](Self::get), never an error.
pub trait AttributeBackend: Send + Sync + fmt::Debug {
    /// Read an attribute value.
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, AttributeError>;

    /// Create or replace an attribute value.
    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), AttributeError>;

    /// Remove an attribute. Removing a missing attribute succeeds.
    fn remove(&self, path: &Path, name: &str) -> Result<(), AttributeError>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Backend for the current platform.
pub fn platform_backend() -> Arc<dyn AttributeBackend> {
    #[cfg(unix)]
    {
        if xattr::SUPPORTED_PLATFORM {
            return Arc::new(XattrBackend);
        }
    }
    Arc::new(UnsupportedBackend)
}

#[cfg(unix)]
pub use self::unix::XattrBackend;

#[cfg(unix)]
mod unix {
    use std::io;
    use std::path::Path;

    use nix::errno::Errno;

    use super::AttributeBackend;
    use crate::attributes::store::AttributeError;

    /// Error code reported when an attribute does not exist.
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    const MISSING_ATTRIBUTE: Errno = Errno::ENOATTR;
    #[cfg(not(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    const MISSING_ATTRIBUTE: Errno = Errno::ENODATA;

    /// Extended attributes through the host's `*xattr` syscalls.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct XattrBackend;

    enum Op {
        Read,
        Write,
    }

    fn errno(err: &io::Error) -> Option<Errno> {
        err.raw_os_error().map(Errno::from_raw)
    }

    fn is_missing_attribute(err: &io::Error) -> bool {
        errno(err) == Some(MISSING_ATTRIBUTE)
    }

    fn classify(err: io::Error, path: &Path, name: &str, op: Op) -> AttributeError {
        if !xattr::SUPPORTED_PLATFORM {
            return AttributeError::UnsupportedPlatform;
        }

        let unsupported = errno(&err).is_some_and(|e| e == Errno::ENOTSUP || e == Errno::EOPNOTSUPP);
        if unsupported || err.kind() == io::ErrorKind::Unsupported {
            return AttributeError::UnsupportedFilesystem {
                path: path.to_path_buf(),
            };
        }

        let code = err.raw_os_error().unwrap_or(0);
        match op {
            Op::Read => AttributeError::MetadataReadFailed {
                path: path.to_path_buf(),
                name: name.to_string(),
                code,
                source: err,
            },
            Op::Write => AttributeError::MetadataWriteFailed {
                path: path.to_path_buf(),
                name: name.to_string(),
                code,
                source: err,
            },
        }
    }

    impl AttributeBackend for XattrBackend {
        fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, AttributeError> {
            match xattr::get(path, name) {
                Ok(value) => Ok(value),
                Err(e) if is_missing_attribute(&e) => Ok(None),
                Err(e) => Err(classify(e, path, name, Op::Read)),
            }
        }

        fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), AttributeError> {
            xattr::set(path, name, value).map_err(|e| classify(e, path, name, Op::Write))
        }

        fn remove(&self, path: &Path, name: &str) -> Result<(), AttributeError> {
            match xattr::remove(path, name) {
                Ok(()) => Ok(()),
                Err(e) if is_missing_attribute(&e) => Ok(()),
                Err(e) => Err(classify(e, path, name, Op::Write)),
            }
        }

        fn kind(&self) -> &'static str {
            "xattr"
        }
    }
}

/// Backend for platforms without extended attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBackend;

impl AttributeBackend for UnsupportedBackend {
    fn get(&self, _path: &Path, _name: &str) -> Result<Option<Vec<u8>>, AttributeError> {
        Err(AttributeError::UnsupportedPlatform)
    }

    fn set(&self, _path: &Path, _name: &str, _value: &[u8]) -> Result<(), AttributeError> {
        Err(AttributeError::UnsupportedPlatform)
    }

    fn remove(&self, _path: &Path, _name: &str) -> Result<(), AttributeError> {
        Err(AttributeError::UnsupportedPlatform)
    }

    fn kind(&self) -> &'static str {
        "unsupported"
    }
}

/// In-process backend keyed by path and attribute name.
///
/// Useful for hosts running on filesystems without attribute support and
/// for tests. Values do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: DashMap<(PathBuf, String), Vec<u8>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no attribute is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl AttributeBackend for MemoryBackend {
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, AttributeError> {
        Ok(self
            .values
            .get(&(path.to_path_buf(), name.to_string()))
            .map(|v| v.value().clone()))
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), AttributeError> {
        self.values
            .insert((path.to_path_buf(), name.to_string()), value.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path, name: &str) -> Result<(), AttributeError> {
        self.values.remove(&(path.to_path_buf(), name.to_string()));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unsupported_backend_always_fails() {
        let backend = UnsupportedBackend;
        let path = Path::new("/any/file.mp3");

        assert!(matches!(
            backend.get(path, "user.heard"),
            Err(AttributeError::UnsupportedPlatform)
        ));
        assert!(matches!(
            backend.set(path, "user.heard", &[1]),
            Err(AttributeError::UnsupportedPlatform)
        ));
        assert!(matches!(
            backend.remove(path, "user.heard"),
            Err(AttributeError::UnsupportedPlatform)
        ));
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        let path = Path::new("/music/a.mp3");

        assert_eq!(backend.get(path, "user.heard").unwrap(), None);
        backend.set(path, "user.heard", &[1]).unwrap();
        assert_eq!(backend.get(path, "user.heard").unwrap(), Some(vec![1]));
        assert_eq!(backend.len(), 1);

        backend.remove(path, "user.heard").unwrap();
        backend.remove(path, "user.heard").unwrap();
        assert!(backend.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_xattr_backend_missing_attribute_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.mp3");
        std::fs::write(&file, "x").unwrap();

        match XattrBackend.get(&file, "user.never_set") {
            Ok(value) => assert_eq!(value, None),
            Err(AttributeError::UnsupportedFilesystem { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_xattr_backend_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.mp3");
        std::fs::write(&file, "x").unwrap();

        match XattrBackend.set(&file, "user.flag", &[1]) {
            Ok(()) => {}
            Err(AttributeError::UnsupportedFilesystem { .. }) => return,
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(XattrBackend.get(&file, "user.flag").unwrap(), Some(vec![1]));

        XattrBackend.remove(&file, "user.flag").unwrap();
        XattrBackend.remove(&file, "user.flag").unwrap();
        assert_eq!(XattrBackend.get(&file, "user.flag").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_xattr_backend_missing_file_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.mp3");

        match XattrBackend.get(&missing, "user.flag") {
            Err(AttributeError::MetadataReadFailed { code, .. }) => {
                assert_eq!(code, nix::errno::Errno::ENOENT as i32)
            }
            Err(AttributeError::UnsupportedFilesystem { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }

        match XattrBackend.set(&missing, "user.flag", &[0]) {
            Err(AttributeError::MetadataWriteFailed { code, .. }) => {
                assert_eq!(code, nix::errno::Errno::ENOENT as i32)
            }
            Err(AttributeError::UnsupportedFilesystem { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
