//! Translation dictionary: type, fingerprint, shared store and startup loader.
/// Payload fingerprinting
mod fingerprint;
/// Startup source chain
mod loader;
/// Snapshot-swap shared state
mod store;
/// Dictionary type and parsing
mod types;

pub use fingerprint::Fingerprint;
pub use loader::{
    BundledSource,
    CacheSource,
    DictionaryLoader,
    DictionarySource,
    LoadOrigin,
    LoadedDictionary,
};
pub use store::{
    DictionarySnapshot,
    DictionaryStore,
};
pub use types::{
    DictionaryError,
    TranslationDictionary,
};
