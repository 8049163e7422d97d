//! Boolean per-file flags stored as extended attributes.
//!
//! Flags live out-of-band from file contents in the `user.` attribute
//! namespace, one byte per flag. Deleting a file deletes its flags.
//!
//! The syscall layer sits behind [`AttributeBackend`] so that platforms
//! without extended attributes report [`AttributeError::UnsupportedPlatform`]
//! instead of silently doing nothing.

pub mod backend;
pub mod store;

pub use backend::{platform_backend, AttributeBackend, MemoryBackend, UnsupportedBackend};
#[cfg(unix)]
pub use backend::XattrBackend;
pub use store::{AttributeError, AttributeStore, ATTRIBUTE_NAMESPACE};
