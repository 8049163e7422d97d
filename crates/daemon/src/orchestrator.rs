//! Orchestrator wiring the core components together.
//!
//! The `Orchestrator` owns the root directory, the path resolver, the
//! attribute store, the directory browser, the subscriber registry and the
//! directory watcher. Hosts construct one per served root and call into it
//! from their request handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use protocol::{ErrorResponse, FileListRequest, FileListResponse, FlagState, FlagUpdateRequest};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::attributes::{AttributeBackend, AttributeError, AttributeStore};
use crate::config::Config;
use crate::files::{
    BrowserError, DirectoryBrowser, PathResolver, ResolveError, ResolvedFile, RootDirectory,
};
use crate::watcher::{
    DirectoryWatcher, SubscriberRegistry, SubscriptionHandle, WatcherError, WatcherState,
};

/// Errors from operations that take a root-relative file reference.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The reference did not resolve to a file below the root.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The flag operation itself failed.
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

impl RequestError {
    /// Client-facing projection of this error.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            RequestError::Resolve(e) => e.to_response(),
            RequestError::Attribute(e) => e.to_response(),
        }
    }
}

/// Core service for one served root directory.
pub struct Orchestrator {
    config: Config,
    root: RootDirectory,
    resolver: PathResolver,
    attributes: AttributeStore,
    browser: DirectoryBrowser,
    registry: SubscriberRegistry,
    watcher: DirectoryWatcher,
}

impl Orchestrator {
    /// Validate `config` and build the components over the platform's
    /// attribute backend.
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, AttributeStore::platform())
    }

    /// Like [`new`](Self::new), but storing flags through `backend`.
    pub fn with_attribute_backend(config: Config, backend: Arc<dyn AttributeBackend>) -> Result<Self> {
        Self::build(config, AttributeStore::new(backend))
    }

    fn build(config: Config, attributes: AttributeStore) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let configured = config
            .files
            .root_dir
            .as_ref()
            .context("Root directory is not configured")?;
        let root = RootDirectory::new(configured)
            .with_context(|| format!("Failed to open root directory {}", configured.display()))?;

        info!("Serving files from {}", root.path().display());
        debug!("Using {} attribute backend", attributes.backend_kind());

        let resolver = PathResolver::new(root.clone());
        let browser = DirectoryBrowser::new(resolver.clone(), attributes.clone());
        let registry = SubscriberRegistry::new();
        let watcher = DirectoryWatcher::new(
            root.path().to_path_buf(),
            config.watcher.clone(),
            registry.clone(),
        );

        Ok(Self {
            config,
            root,
            resolver,
            attributes,
            browser,
            registry,
            watcher,
        })
    }

    /// The configuration this orchestrator was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The served root directory.
    pub fn root(&self) -> &RootDirectory {
        &self.root
    }

    /// Start watching the root directory.
    pub async fn start(&self) -> Result<(), WatcherError> {
        self.watcher.start().await
    }

    /// Stop watching. Stopping twice is a no-op.
    pub async fn stop(&self) {
        self.watcher.stop().await
    }

    /// Current watcher state.
    pub async fn state(&self) -> WatcherState {
        self.watcher.state().await
    }

    /// Register `callback` for change notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    /// Register a channel for change notifications.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionHandle, mpsc::Receiver<()>) {
        self.registry.subscribe_channel(capacity)
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.registry.unsubscribe(handle)
    }

    /// Open the file at `reference` for streaming.
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedFile, ResolveError> {
        self.resolver.resolve(reference).await
    }

    /// List the directory at `reference`.
    pub fn list(&self, reference: &str) -> Result<FileListResponse, BrowserError> {
        self.browser.list(reference)
    }

    /// Answer a listing request from the web layer.
    pub fn handle_list(&self, request: &FileListRequest) -> Result<FileListResponse, BrowserError> {
        self.list(&request.path)
    }

    /// Apply a flag update: an explicit value is stored, an absent one toggles.
    pub fn update_flag(&self, request: &FlagUpdateRequest) -> Result<FlagState, RequestError> {
        match request.value {
            Some(value) => self.set_flag(&request.path, &request.name, value),
            None => self.toggle_flag(&request.path, &request.name),
        }
    }

    /// Read flag `name` on the file at `reference`.
    pub fn get_flag(&self, reference: &str, name: &str) -> Result<FlagState, RequestError> {
        let path = self.resolver.resolve_file_path(reference)?;
        let value = self.attributes.get_flag(&path, name)?;
        Ok(flag_state(reference, name, value))
    }

    /// Set flag `name` on the file at `reference`.
    pub fn set_flag(&self, reference: &str, name: &str, value: bool) -> Result<FlagState, RequestError> {
        let path = self.resolver.resolve_file_path(reference)?;
        self.attributes.set_flag(&path, name, value)?;
        Ok(flag_state(reference, name, Some(value)))
    }

    /// Flip flag `name` on the file at `reference`.
    pub fn toggle_flag(&self, reference: &str, name: &str) -> Result<FlagState, RequestError> {
        let path = self.resolver.resolve_file_path(reference)?;
        let value = self.attributes.toggle_flag(&path, name)?;
        Ok(flag_state(reference, name, Some(value)))
    }

    /// Remove flag `name` from the file at `reference`.
    pub fn clear_flag(&self, reference: &str, name: &str) -> Result<FlagState, RequestError> {
        let path = self.resolver.resolve_file_path(reference)?;
        self.attributes.clear_flag(&path, name)?;
        Ok(flag_state(reference, name, None))
    }
}

fn flag_state(reference: &str, name: &str, value: Option<bool>) -> FlagState {
    FlagState {
        path: reference.to_string(),
        name: name.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::MemoryBackend;
    use protocol::ErrorCode;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_orchestrator(temp_dir: &TempDir) -> Orchestrator {
        fs::create_dir_all(temp_dir.path().join("albums")).unwrap();
        fs::write(temp_dir.path().join("albums/intro.mp3"), "ID3 intro").unwrap();

        let config = Config::with_root(temp_dir.path());
        Orchestrator::with_attribute_backend(config, Arc::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn test_missing_root_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_root(temp_dir.path().join("missing"));
        assert!(Orchestrator::new(config).is_err());

        assert!(Orchestrator::new(Config::default()).is_err());
    }

    #[test]
    fn test_file_as_root_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.mp3");
        fs::write(&file, "x").unwrap();
        assert!(Orchestrator::new(Config::with_root(file)).is_err());
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        assert_eq!(orchestrator.state().await, WatcherState::Stopped);
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state().await, WatcherState::Running);
        orchestrator.stop().await;
        orchestrator.stop().await;
        assert_eq!(orchestrator.state().await, WatcherState::Stopped);
    }

    #[tokio::test]
    async fn test_resolve_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        let file = orchestrator.resolve("albums/intro.mp3").await.unwrap();
        assert_eq!(file.file_name(), "intro.mp3");
        assert_eq!(file.content_type(), "audio/mpeg");
        assert_eq!(file.read_to_end().await.unwrap(), b"ID3 intro");

        let listing = orchestrator.list("albums").unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert!(!listing.entries[0].heard);
    }

    #[test]
    fn test_flag_operations() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        let state = orchestrator.get_flag("albums/intro.mp3", "heard").unwrap();
        assert_eq!(state.value, None);

        let state = orchestrator.toggle_flag("albums/intro.mp3", "heard").unwrap();
        assert_eq!(state.value, Some(true));
        assert!(orchestrator.list("albums").unwrap().entries[0].heard);

        let state = orchestrator.set_flag("albums/intro.mp3", "heard", false).unwrap();
        assert_eq!(state.value, Some(false));

        orchestrator.clear_flag("albums/intro.mp3", "heard").unwrap();
        let state = orchestrator.get_flag("albums/intro.mp3", "heard").unwrap();
        assert_eq!(state.value, None);
        assert_eq!(state.path, "albums/intro.mp3");
    }

    #[test]
    fn test_flag_errors_map_to_responses() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        let err = orchestrator.get_flag("../etc/passwd", "heard").unwrap_err();
        assert_eq!(err.to_response().code, ErrorCode::BadRequest);

        let err = orchestrator.set_flag("albums/none.mp3", "heard", true).unwrap_err();
        assert_eq!(err.to_response().code, ErrorCode::NotFound);

        let err = orchestrator.set_flag("albums", "heard", true).unwrap_err();
        assert_eq!(err.to_response().code, ErrorCode::NotFound);

        let err = orchestrator.set_flag("albums/intro.mp3", "", true).unwrap_err();
        assert_eq!(err.to_response().code, ErrorCode::BadRequest);
    }

    #[test]
    fn test_requests_from_web_layer() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        let listing = orchestrator.handle_list(&FileListRequest::default()).unwrap();
        assert_eq!(listing.relative_path, "");
        assert_eq!(listing.entries[0].name, "albums");

        let err = orchestrator
            .handle_list(&FileListRequest {
                path: "albums/intro.mp3".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.to_response().message, "not a directory");

        let mut request = FlagUpdateRequest {
            path: "albums/intro.mp3".to_string(),
            name: "heard".to_string(),
            value: None,
        };
        assert_eq!(orchestrator.update_flag(&request).unwrap().value, Some(true));
        assert_eq!(orchestrator.update_flag(&request).unwrap().value, Some(false));

        request.value = Some(true);
        assert_eq!(orchestrator.update_flag(&request).unwrap().value, Some(true));
        assert_eq!(orchestrator.update_flag(&request).unwrap().value, Some(true));
        assert!(orchestrator.handle_list(&FileListRequest {
            path: "albums".to_string(),
        })
        .unwrap()
        .entries[0]
            .heard);
    }

    #[test]
    fn test_subscription_management() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = create_test_orchestrator(&temp_dir);

        let handle = orchestrator.subscribe(|| {});
        assert!(orchestrator.unsubscribe(handle));
        assert!(!orchestrator.unsubscribe(handle));
    }
}
