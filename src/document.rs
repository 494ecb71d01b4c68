//! In-process model of the host document.
/// Structural change notifications
mod mutation;
/// Translatable element criteria
mod selector;
/// Element tree, ready state and visibility
mod tree;

pub use mutation::{
    MutationObserver,
    MutationRecord,
};
pub use selector::ElementSelector;
pub use tree::{
    Document,
    DocumentError,
    NodeId,
    ReadyState,
    Visibility,
};
