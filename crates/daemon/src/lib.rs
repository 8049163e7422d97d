//! # AudioBrowser Core Library
//!
//! This crate provides the core of AudioBrowser, a web-based browser for a
//! directory tree of audio files.
//!
//! ## Overview
//!
//! The core sits below a thin web layer and provides:
//!
//! - **Safe File Access**: Resolve client-supplied relative paths against a
//!   fixed root directory and stream the bytes back
//! - **Change Notifications**: Watch the root recursively and tell
//!   subscribers when its contents changed
//! - **Per-file Flags**: Persist boolean flags such as `heard` in extended
//!   attributes, next to the file itself
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ PathResolver │  │  Directory   │  │  AttributeStore    │  │
//! │  │  (streams)   │  │   Browser    │  │  (xattr flags)     │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │   DirectoryWatcher ──▶ EventFilter ──▶ Subscribers     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use audiobrowser::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!
//!     let orchestrator = Orchestrator::new(config)?;
//!     orchestrator.subscribe(|| println!("files changed"));
//!     orchestrator.start().await?;
//!
//!     let listing = orchestrator.list("")?;
//!     println!("{} entries", listing.entries.len());
//!
//!     orchestrator.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Root directory, path resolution, streaming and listings
//! - [`attributes`]: Extended-attribute flag storage
//! - [`watcher`]: Recursive directory watcher and subscriber registry
//! - [`orchestrator`]: Wires the components for one served root

pub mod attributes;
pub mod config;
pub mod files;
pub mod orchestrator;
pub mod watcher;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export file types for convenience
pub use files::{
    BrowserError, DirectoryBrowser, PathResolver, ResolveError, ResolvedFile, RootDirectory,
    RootError,
};

// Re-export attribute types for convenience
pub use attributes::{AttributeBackend, AttributeError, AttributeStore, MemoryBackend};

// Re-export watcher types for convenience
pub use watcher::{
    DirectoryWatcher, EventFilter, SubscriberRegistry, SubscriptionHandle, WatcherError,
    WatcherState,
};

// Re-export orchestrator types for convenience
pub use orchestrator::{Orchestrator, RequestError};
