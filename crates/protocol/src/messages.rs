//! Message definitions for AudioBrowser.
//!
//! These types travel between the core and the web layer as JSON. The core
//! fills them in; the web layer renders them.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the server-sent event emitted when the watched tree changed.
///
/// The event carries no payload; clients re-request the listing.
pub const FILES_CHANGED_EVENT: &str = "fileUpdated";

/// Attribute name used to remember whether a file has been listened to.
pub const HEARD_FLAG: &str = "heard";

/// Request to list a directory under the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListRequest {
    /// Root-relative directory path. Empty means the root itself.
    #[serde(default)]
    pub path: String,
}

/// Listing of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    /// Root-relative path of the listed directory.
    pub relative_path: String,
    /// Root-relative path of the parent, `None` when listing the root.
    pub parent_relative_path: Option<String>,
    /// Entries, sorted by name.
    pub entries: Vec<FileEntry>,
}

impl FileListResponse {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Path relative to the root directory.
    pub relative_path: String,
    /// Entry type.
    pub entry_type: FileEntryType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the file has been marked as heard.
    pub heard: bool,
}

impl FileEntry {
    /// Human readable size in whole kilobytes, as shown in listings.
    pub fn display_size(&self) -> String {
        format!("{} KB", self.size / 1024)
    }
}

/// Type of file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Other (device, socket, dangling symlink, etc.).
    Other,
}

/// Request to change a flag on a file.
///
/// When `value` is absent the flag is toggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagUpdateRequest {
    /// Root-relative file path.
    pub path: String,
    /// Flag name, without namespace prefix.
    #[serde(default = "default_flag_name")]
    pub name: String,
    /// Explicit new value. `None` toggles.
    #[serde(default)]
    pub value: Option<bool>,
}

fn default_flag_name() -> String {
    HEARD_FLAG.to_string()
}

/// Current state of a flag on a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagState {
    /// Root-relative file path.
    pub path: String,
    /// Flag name.
    pub name: String,
    /// Stored value, `None` when the flag was never set.
    pub value: Option<bool>,
}
