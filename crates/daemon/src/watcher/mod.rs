//! Recursive directory watching with change fan-out.
//!
//! ```text
//!  notify backend thread        filter task                 subscribers
//!  ─────────────────────        ───────────                 ───────────
//!  RecommendedWatcher ──try_send──▶ bounded queue ──▶ EventFilter ──▶ debounce ──▶ SubscriberRegistry
//! ```
//!
//! Notifications carry no payload. Subscribers re-read the directory when
//! they receive one, so a dropped notification is harmless.

pub mod filter;
pub mod registry;
pub mod service;

pub use filter::{ChangeKind, Classification, EventFilter};
pub use registry::{SubscriberRegistry, SubscriptionHandle};
pub use service::{DirectoryWatcher, WatcherError, WatcherState};
