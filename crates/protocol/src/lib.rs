//! # AudioBrowser Protocol Library
//!
//! Wire types shared between the AudioBrowser core and the web layer that
//! renders listings, streams files and toggles flags.
//!
//! ## Overview
//!
//! - **Message Definitions**: listing entries, flag requests and the change
//!   event name pushed to browsers
//! - **Error Responses**: the client-facing projection of core errors, which
//!   never carries filesystem paths
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::{FileEntry, FileEntryType, FileListResponse};
//!
//! let listing = FileListResponse {
//!     relative_path: "albums".to_string(),
//!     parent_relative_path: Some(String::new()),
//!     entries: vec![FileEntry {
//!         name: "intro.mp3".to_string(),
//!         relative_path: "albums/intro.mp3".to_string(),
//!         entry_type: FileEntryType::File,
//!         size: 4096,
//!         heard: false,
//!     }],
//! };
//!
//! let json = listing.to_json().unwrap();
//! assert_eq!(FileListResponse::from_json(&json).unwrap(), listing);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Listing and flag message definitions
//! - [`error`]: Error types and client-facing error responses

pub mod error;
pub mod messages;

pub use error::{ErrorCode, ErrorResponse, ProtocolError, Result};
pub use messages::{
    FileEntry, FileEntryType, FileListRequest, FileListResponse, FlagState, FlagUpdateRequest,
    FILES_CHANGED_EVENT, HEARD_FLAG,
};
