//! Translation application over a live document.
/// Startup-time periodic rescans
mod poller;
/// Full and subtree passes
mod scanner;
/// Startup, reload and shutdown
mod session;
/// Per-element translation
mod translator;
/// Insertion-driven translation
mod watcher;

pub use poller::BoundedPoller;
pub use scanner::{
    ScanSummary,
    Scanner,
};
pub use session::{
    OverlaySession,
    RemoteSetup,
};
pub use translator::NodeTranslator;
pub use watcher::Watcher;
