//! Process-wide durable storage for the dictionary payload.
/// Dictionary payload / fingerprint slots
mod record;
/// Cache store implementations
mod store;

pub use record::{
    CacheRecord,
    DICTIONARY_KEY,
    FINGERPRINT_KEY,
};
pub use store::{
    CacheError,
    CacheStore,
    FileCacheStore,
    MemoryCacheStore,
    open_cache,
};
