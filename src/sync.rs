//! Remote dictionary synchronization.
/// Sync errors
mod error;
/// Fetch, compare, persist and swap
mod reconcile;
/// Reload policy
mod reload;
/// Remote endpoint abstraction and HTTP implementation
mod remote;

pub use error::SyncError;
pub use reconcile::{
    RemoteSync,
    SyncOutcome,
    SyncPolicy,
};
pub use reload::{
    AutoAccept,
    AutoDecline,
    RELOAD_MESSAGE,
    ReloadDecision,
    ReloadHandler,
    ReloadPrompt,
    decide_reload,
};
pub use remote::{
    FetchOutcome,
    HttpRemoteSource,
    RemoteSource,
};
