//! Raw event classification.

use std::path::Path;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::config::WatcherConfig;

/// Kind of change an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// An entry appeared.
    Created,
    /// An entry was renamed or moved.
    Renamed,
    /// An entry disappeared.
    Removed,
    /// An entry's content or metadata changed in place.
    Modified,
}

/// Outcome of classifying one raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The event should raise a change notification.
    Qualifying(ChangeKind),
    /// The event concerns an entry whose name marks an in-progress write.
    Temporary(ChangeKind),
    /// The event kind is not observed (access, or modification when disabled).
    Ignored,
    /// The event has a shape the filter cannot interpret.
    Malformed(&'static str),
}

/// Decides which raw filesystem events become change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    temp_suffix: String,
    include_modified: bool,
}

impl EventFilter {
    /// Create a filter discarding names ending in `temp_suffix`.
    pub fn new(temp_suffix: impl Into<String>, include_modified: bool) -> Self {
        Self {
            temp_suffix: temp_suffix.into(),
            include_modified,
        }
    }

    /// Create a filter from watcher settings.
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.temp_suffix.clone(), config.include_modified)
    }

    /// Whether the entry name of `path` marks an in-progress write.
    ///
    /// This is a plain suffix test on the final component, so with the
    /// default `tmp` suffix both `song.mp3.tmp` and `song_tmp` match.
    pub fn is_temporary(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(self.temp_suffix.as_str()))
    }

    /// Classify a raw event.
    ///
    /// Renames are judged by the destination half. A rename-from half is
    /// judged by its source like a removal. The combined `Both` event is
    /// ignored: backends that emit it also emit the `To` half for the same
    /// rename, so counting it would report one rename twice.
    pub fn classify(&self, event: &Event) -> Classification {
        let (kind, path) = match event.kind {
            EventKind::Create(_) => (ChangeKind::Created, event.paths.last()),
            EventKind::Remove(_) => (ChangeKind::Removed, event.paths.last()),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                return Classification::Ignored
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                (ChangeKind::Renamed, event.paths.first())
            }
            EventKind::Modify(ModifyKind::Name(_)) => (ChangeKind::Renamed, event.paths.last()),
            EventKind::Modify(_) => {
                if !self.include_modified {
                    return Classification::Ignored;
                }
                (ChangeKind::Modified, event.paths.last())
            }
            // Access, Any and Other
            _ => return Classification::Ignored,
        };

        match path {
            None => Classification::Malformed("event carries no path"),
            Some(path) if path.file_name().is_none() => {
                Classification::Malformed("event path has no file name")
            }
            Some(path) if self.is_temporary(path) => Classification::Temporary(kind),
            Some(_) => Classification::Qualifying(kind),
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}
