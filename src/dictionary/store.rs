//! 翻訳辞書の共有状態
//!
//! 読み取りは翻訳処理（スキャナー・ウォッチャー）、書き込みはリモート同期のみ。
//! 辞書全体をスナップショットとして差し替えるため、読み手は常に完全な辞書を見る。

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{
    Fingerprint,
    TranslationDictionary,
};

/// ある時点の辞書と、その元になったペイロードの fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictionarySnapshot {
    pub dictionary: TranslationDictionary,
    pub fingerprint: Option<Fingerprint>,
}

/// 辞書の置き場所
///
/// Clone してもスナップショットは共有される。
#[derive(Clone)]
pub struct DictionaryStore {
    /// 現在のスナップショット
    current: Arc<ArcSwap<DictionarySnapshot>>,
}

impl DictionaryStore {
    #[must_use]
    pub fn new(dictionary: TranslationDictionary, fingerprint: Option<Fingerprint>) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(DictionarySnapshot { dictionary, fingerprint })),
        }
    }

    /// 現在のスナップショットを取得
    #[must_use]
    pub fn snapshot(&self) -> Arc<DictionarySnapshot> {
        self.current.load_full()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.current.load().fingerprint.clone()
    }

    /// 辞書を丸ごと差し替える
    pub fn replace(&self, dictionary: TranslationDictionary, fingerprint: Option<Fingerprint>) {
        tracing::debug!(
            entries = dictionary.len(),
            fingerprint = fingerprint.as_ref().map(Fingerprint::as_str),
            "Replacing dictionary snapshot"
        );
        self.current.store(Arc::new(DictionarySnapshot { dictionary, fingerprint }));
    }
}

impl Default for DictionaryStore {
    fn default() -> Self {
        Self::new(TranslationDictionary::new(), None)
    }
}

impl std::fmt::Debug for DictionaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("DictionaryStore")
            .field("entries", &snapshot.dictionary.len())
            .field("fingerprint", &snapshot.fingerprint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[googletest::test]
    fn clone_shares_snapshot() {
        let store = DictionaryStore::default();
        let shared = store.clone();

        store.replace([("p1", "你好")].into_iter().collect(), Some(Fingerprint::of_payload(b"x")));

        expect_that!(shared.snapshot().dictionary.get("p1"), some(eq("你好")));
        expect_that!(shared.fingerprint(), some(eq(&Fingerprint::of_payload(b"x"))));
    }

    #[googletest::test]
    fn old_snapshot_stays_intact_after_replace() {
        let store = DictionaryStore::new([("p1", "old")].into_iter().collect(), None);
        let before = store.snapshot();

        store.replace([("p1", "new")].into_iter().collect(), None);

        expect_that!(before.dictionary.get("p1"), some(eq("old")));
        expect_that!(store.snapshot().dictionary.get("p1"), some(eq("new")));
    }

    #[googletest::test]
    fn debug_impl_works() {
        let store = DictionaryStore::new([("p1", "x")].into_iter().collect(), None);

        let debug_str = format!("{store:?}");

        expect_that!(debug_str, contains_substring("DictionaryStore"));
        expect_that!(debug_str, contains_substring("entries: 1"));
    }
}
