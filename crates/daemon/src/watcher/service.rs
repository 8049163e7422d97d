//! Directory watcher lifecycle and the filtering loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use protocol::ErrorResponse;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::filter::{Classification, EventFilter};
use super::registry::SubscriberRegistry;
use crate::config::WatcherConfig;

/// Errors raised by the directory watcher.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// The OS watch could not be established.
    #[error("failed to watch {path}: {source}")]
    StartFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// `start` was called while the watcher was not stopped.
    #[error("watcher is already running")]
    AlreadyRunning,
}

impl WatcherError {
    /// Client-facing projection of this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::internal()
    }
}

/// Watcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No OS watch is held.
    Stopped,
    /// Registering the OS watch.
    Starting,
    /// Receiving and filtering events.
    Running,
    /// Releasing the OS watch.
    Stopping,
}

/// Resources held while the watcher runs.
struct RunningWatcher {
    /// Keeps the OS watch alive; dropping it releases the watch.
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Recursive watcher over one directory tree.
///
/// Qualifying events are coalesced over the configured debounce window and
/// delivered as payload-free notifications through the injected
/// [`SubscriberRegistry`].
pub struct DirectoryWatcher {
    root: PathBuf,
    config: WatcherConfig,
    registry: SubscriberRegistry,
    state: Arc<RwLock<WatcherState>>,
    running: Mutex<Option<RunningWatcher>>,
}

impl DirectoryWatcher {
    /// Create a stopped watcher for `root`.
    pub fn new(root: impl Into<PathBuf>, config: WatcherConfig, registry: SubscriberRegistry) -> Self {
        Self {
            root: root.into(),
            config,
            registry,
            state: Arc::new(RwLock::new(WatcherState::Stopped)),
            running: Mutex::new(None),
        }
    }

    /// The watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The registry notifications are delivered through.
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WatcherState {
        *self.state.read().await
    }

    /// Register the OS watch and start delivering notifications.
    ///
    /// Fails with [`WatcherError::StartFailed`] when the root is missing or
    /// cannot be watched; the watcher is left stopped in that case.
    pub async fn start(&self) -> Result<(), WatcherError> {
        let mut running = self.running.lock().await;
        {
            let mut state = self.state.write().await;
            if *state != WatcherState::Stopped {
                return Err(WatcherError::AlreadyRunning);
            }
            *state = WatcherState::Starting;
        }

        match self.spawn() {
            Ok(handle) => {
                *running = Some(handle);
                *self.state.write().await = WatcherState::Running;
                info!("Watching files in {}", self.root.display());
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = WatcherState::Stopped;
                error!("Failed to start watcher: {}", e);
                Err(e)
            }
        }
    }

    /// Release the OS watch and stop delivering notifications.
    ///
    /// Stopping a stopped watcher is a no-op.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(handle) = running.take() else {
            return;
        };

        *self.state.write().await = WatcherState::Stopping;
        debug!("Stopping watcher for {}", self.root.display());

        handle.cancel.cancel();
        drop(handle._watcher);
        if let Err(e) = handle.task.await {
            warn!("Watcher task ended abnormally: {}", e);
        }

        *self.state.write().await = WatcherState::Stopped;
        info!("Stopped watching {}", self.root.display());
    }

    fn spawn(&self) -> Result<RunningWatcher, WatcherError> {
        let start_failed = |source: notify::Error| WatcherError::StartFailed {
            path: self.root.clone(),
            source,
        };

        if !self.root.is_dir() {
            return Err(start_failed(
                notify::Error::path_not_found().add_path(self.root.clone()),
            ));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match tx.try_send(res) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Raw event queue full, dropping event");
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("Raw event queue closed");
                }
            },
            notify::Config::default(),
        )
        .map_err(start_failed)?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(start_failed)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(filter_loop(
            rx,
            EventFilter::from_config(&self.config),
            self.registry.clone(),
            self.config.debounce(),
            cancel.clone(),
        ));

        Ok(RunningWatcher {
            _watcher: watcher,
            cancel,
            task,
        })
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.running.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Consume raw events, filter them, and deliver debounced notifications.
///
/// The first qualifying event opens a window of length `debounce`; every
/// qualifying event inside the window is folded into the single notification
/// sent when it closes. A zero window delivers immediately.
async fn filter_loop(
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    filter: EventFilter,
    registry: SubscriberRegistry,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let pending = deadline;
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = tokio::time::sleep_until(pending.unwrap_or_else(Instant::now)), if pending.is_some() => {
                deadline = None;
                deliver(&registry);
            }

            raw = rx.recv() => {
                let Some(raw) = raw else { break };
                if !qualifies(&filter, raw) {
                    continue;
                }
                if debounce.is_zero() {
                    deliver(&registry);
                } else if deadline.is_none() {
                    deadline = Some(Instant::now() + debounce);
                }
            }
        }
    }

    debug!("Watcher filter loop exited");
}

/// Log and classify one raw event.
fn qualifies(filter: &EventFilter, raw: notify::Result<Event>) -> bool {
    let event = match raw {
        Ok(event) => event,
        Err(e) => {
            warn!("Skipping watcher error: {}", e);
            return false;
        }
    };

    match filter.classify(&event) {
        Classification::Qualifying(kind) => {
            debug!("File {:?}: {:?}", kind, event.paths);
            true
        }
        Classification::Temporary(kind) => {
            debug!("Ignoring temporary file {:?}: {:?}", kind, event.paths);
            false
        }
        Classification::Ignored => {
            trace!("Ignoring event {:?}", event.kind);
            false
        }
        Classification::Malformed(reason) => {
            warn!("Skipping malformed event {:?}: {}", event.kind, reason);
            false
        }
    }
}

fn deliver(registry: &SubscriberRegistry) {
    let delivered = registry.notify_all();
    debug!("Delivered change notification to {} subscribers", delivered);
}
