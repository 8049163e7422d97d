//! File access module for the served root directory.
//!
//! This module provides secure file operations including:
//! - A validated, immutable root directory
//! - Resolution of client-supplied relative paths with containment checks
//! - Content type lookup and byte streaming
//! - Directory listing with per-file flags
//!
//! # Security
//!
//! Every client-supplied reference is joined onto the root, lexically
//! normalized and then required to start with the root path followed by a
//! separator. Symlinks inside the root that point outside of it are not
//! followed up on: the check is textual, so such links remain reachable.

pub mod browser;
pub mod content_type;
pub mod resolver;
pub mod root;

pub use browser::{BrowserError, DirectoryBrowser};
pub use content_type::{content_type_for, DEFAULT_CONTENT_TYPE};
pub use resolver::{PathResolver, ResolveError, ResolvedFile};
pub use root::{RootDirectory, RootError};
