//! Persisted dictionary payload and its fingerprint.

use super::{
    CacheError,
    CacheStore,
};
use crate::dictionary::Fingerprint;

/// Slot holding the raw serialized dictionary.
pub const DICTIONARY_KEY: &str = "translationDictionary";
/// Slot holding the fingerprint of [`DICTIONARY_KEY`].
pub const FINGERPRINT_KEY: &str = "translationFingerprint";

/// `{payload, fingerprint}` as stored in a [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Raw payload exactly as received from the remote endpoint
    pub payload: String,
    pub fingerprint: Option<Fingerprint>,
}

impl CacheRecord {
    /// Reads the record. An empty payload slot means no record.
    #[must_use]
    pub fn read(store: &dyn CacheStore) -> Option<Self> {
        let payload = store.get(DICTIONARY_KEY, "");
        if payload.trim().is_empty() {
            return None;
        }
        Some(Self { payload, fingerprint: Self::read_fingerprint(store) })
    }

    /// Reads only the fingerprint slot.
    #[must_use]
    pub fn read_fingerprint(store: &dyn CacheStore) -> Option<Fingerprint> {
        Fingerprint::from_validator(&store.get(FINGERPRINT_KEY, ""))
    }

    /// Overwrites both slots, payload first.
    ///
    /// If the fingerprint cannot be written, the previous payload is put
    /// back so the slots never describe different dictionaries.
    ///
    /// # Errors
    /// Propagates the store's write failure.
    pub fn write(&self, store: &dyn CacheStore) -> Result<(), CacheError> {
        let previous = store.get(DICTIONARY_KEY, "");
        store.set(DICTIONARY_KEY, &self.payload)?;

        let fingerprint = self.fingerprint.as_ref().map_or("", Fingerprint::as_str);
        store.set(FINGERPRINT_KEY, fingerprint).inspect_err(|_| {
            if let Err(e) = store.set(DICTIONARY_KEY, &previous) {
                tracing::warn!("Failed to restore cached dictionary: {e}");
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::cache::MemoryCacheStore;

    #[googletest::test]
    fn read_empty_store_returns_none() {
        let store = MemoryCacheStore::new();

        expect_that!(CacheRecord::read(&store), none());
        expect_that!(CacheRecord::read_fingerprint(&store), none());
    }

    #[googletest::test]
    fn write_then_read() {
        let store = MemoryCacheStore::new();
        let record = CacheRecord {
            payload: r#"{"p1":"你好"}"#.to_string(),
            fingerprint: Some(Fingerprint::of_payload(r#"{"p1":"你好"}"#.as_bytes())),
        };

        record.write(&store).unwrap();

        assert_eq!(CacheRecord::read(&store), Some(record.clone()));
        let fingerprint = record.fingerprint.unwrap();
        expect_that!(store.get(FINGERPRINT_KEY, ""), eq(fingerprint.as_str()));
    }

    /// 指紋スロットだけ書き込みに失敗するストア
    struct FingerprintWriteFails(MemoryCacheStore);

    impl CacheStore for FingerprintWriteFails {
        fn get(&self, key: &str, default: &str) -> String {
            self.0.get(key, default)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
            if key == FINGERPRINT_KEY {
                return Err(CacheError::Io(std::io::Error::other("disk full")));
            }
            self.0.set(key, value)
        }
    }

    #[googletest::test]
    fn failed_fingerprint_write_restores_payload() {
        let store = FingerprintWriteFails(MemoryCacheStore::with_entries([
            (DICTIONARY_KEY, r#"{"p1":"旧"}"#),
            (FINGERPRINT_KEY, "old"),
        ]));
        let record = CacheRecord {
            payload: r#"{"p1":"新"}"#.to_string(),
            fingerprint: Some(Fingerprint::of_payload(r#"{"p1":"新"}"#.as_bytes())),
        };

        expect_that!(record.write(&store), err(anything()));
        expect_that!(store.get(DICTIONARY_KEY, ""), eq(r#"{"p1":"旧"}"#));
        expect_that!(store.get(FINGERPRINT_KEY, ""), eq("old"));
    }

    #[googletest::test]
    fn payload_without_fingerprint() {
        let store = MemoryCacheStore::with_entries([(DICTIONARY_KEY, "{}")]);

        let record = CacheRecord::read(&store).unwrap();

        expect_that!(record.payload, eq("{}"));
        expect_that!(record.fingerprint, none());
    }
}
