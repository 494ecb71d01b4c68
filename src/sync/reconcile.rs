//! リモート辞書との照合と採用
//!
//! 1 回の同期の流れ:
//! 1. 取得（条件付きの場合は保存済みの validator を送る）
//! 2. fingerprint の比較
//! 3. 解析 → キャッシュ保存 → ストアの差し替え
//! 4. 再読み込みポリシーの適用

use std::sync::Arc;

use super::{
    AutoDecline,
    FetchOutcome,
    ReloadDecision,
    ReloadHandler,
    ReloadPrompt,
    RemoteSource,
    SyncError,
    decide_reload,
};
use crate::cache::{
    CacheRecord,
    CacheStore,
};
use crate::config::{
    ReconcileStrategy,
    ReloadMode,
};
use crate::dictionary::{
    DictionaryStore,
    Fingerprint,
    TranslationDictionary,
};
use crate::document::Document;

/// 同期の振る舞い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPolicy {
    pub strategy: ReconcileStrategy,
    pub reload_mode: ReloadMode,
}

/// 同期 1 回の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 条件付き取得でサーバーが変更なしと応答
    NotModified,
    /// 取得した内容の fingerprint が保存済みと一致
    Unchanged,
    /// 新しい辞書を採用
    Adopted { entries: usize, decision: ReloadDecision },
    /// 失敗（状態は変更していない）
    Failed(String),
}

/// リモート同期
pub struct RemoteSync<R> {
    /// 正となる辞書の取得先
    source: R,
    /// 採用した辞書の保存先
    cache: Arc<dyn CacheStore>,
    /// 翻訳に使われている辞書
    store: DictionaryStore,
    /// 表示状態の参照に使う
    document: Document,
    /// 比較方法と再初期化の方針
    policy: SyncPolicy,
    /// `Prompt` モードでの確認先
    prompt: Arc<dyn ReloadPrompt>,
    /// 再初期化の実行先。なければ採用のみ
    reload: Option<Arc<dyn ReloadHandler>>,
}

impl<R: RemoteSource> RemoteSync<R> {
    /// 確認には [`AutoDecline`] を使う。変更は [`Self::with_prompt`] で
    #[must_use]
    pub fn new(
        source: R,
        cache: Arc<dyn CacheStore>,
        store: DictionaryStore,
        document: Document,
        policy: SyncPolicy,
    ) -> Self {
        Self { source, cache, store, document, policy, prompt: Arc::new(AutoDecline), reload: None }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn ReloadPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_reload_handler(mut self, handler: Arc<dyn ReloadHandler>) -> Self {
        self.reload = Some(handler);
        self
    }

    /// 同期を 1 回実行する
    ///
    /// # Errors
    /// 取得・解析・キャッシュ保存に失敗した場合。いずれもストアとキャッシュは変更しない。
    pub async fn check(&self) -> Result<SyncOutcome, SyncError> {
        let stored = self.store.fingerprint();
        let validator = match self.policy.strategy {
            ReconcileStrategy::Conditional => stored.as_ref().map(Fingerprint::as_str),
            ReconcileStrategy::ContentHash => None,
        };

        let (body, remote_validator) = match self.source.fetch(validator).await? {
            FetchOutcome::NotModified => {
                tracing::debug!("Remote dictionary not modified");
                return Ok(SyncOutcome::NotModified);
            }
            FetchOutcome::Payload { body, validator } => (body, validator),
        };

        let fingerprint = self.fingerprint_of(&body, remote_validator.as_deref());
        if stored.as_ref() == Some(&fingerprint) {
            tracing::debug!(%fingerprint, "Remote dictionary unchanged");
            return Ok(SyncOutcome::Unchanged);
        }

        let dictionary = TranslationDictionary::parse_bytes(&body)?;
        let entries = dictionary.len();

        // キャッシュ保存に失敗した場合は採用しない
        let record = CacheRecord {
            payload: String::from_utf8_lossy(&body).into_owned(),
            fingerprint: Some(fingerprint.clone()),
        };
        record.write(self.cache.as_ref())?;
        self.store.replace(dictionary, Some(fingerprint));
        tracing::info!(entries, "Adopted remote dictionary");

        let decision = decide_reload(self.document.visibility(), self.policy.reload_mode, self.prompt.as_ref());
        if decision.reloads() {
            if let Some(handler) = &self.reload {
                tracing::info!(?decision, "Reloading overlay");
                handler.reload();
            }
        } else {
            tracing::info!("Reload declined, new dictionary applies on next load");
        }

        Ok(SyncOutcome::Adopted { entries, decision })
    }

    /// [`Self::check`] を実行し、失敗はログに残して結果に変換する
    pub async fn run(&self) -> SyncOutcome {
        match self.check().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Remote sync failed: {e}");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// 戦略に応じて取得内容の fingerprint を決める
    fn fingerprint_of(&self, body: &[u8], validator: Option<&str>) -> Fingerprint {
        match self.policy.strategy {
            ReconcileStrategy::ContentHash => Fingerprint::of_payload(body),
            ReconcileStrategy::Conditional => validator
                .and_then(Fingerprint::from_validator)
                .unwrap_or_else(|| Fingerprint::of_payload(body)),
        }
    }
}

impl<R> std::fmt::Debug for RemoteSync<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSync")
            .field("source", &"<RemoteSource>")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("reload", &self.reload.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{
        AtomicU32,
        Ordering,
    };

    use googletest::prelude::*;
    use parking_lot::Mutex;
    use rstest::*;

    use super::*;
    use crate::cache::{
        DICTIONARY_KEY,
        FINGERPRINT_KEY,
        MemoryCacheStore,
    };
    use crate::document::Visibility;
    use crate::sync::AutoAccept;

    /// 固定の応答を返し、送られた validator を記録する
    struct FakeSource {
        response: Mutex<Option<std::result::Result<FetchOutcome, SyncError>>>,
        sent: Mutex<Vec<Option<String>>>,
    }

    impl FakeSource {
        fn new(response: std::result::Result<FetchOutcome, SyncError>) -> Self {
            Self { response: Mutex::new(Some(response)), sent: Mutex::new(Vec::new()) }
        }

        fn payload(body: &str, validator: Option<&str>) -> Self {
            Self::new(Ok(FetchOutcome::Payload {
                body: body.as_bytes().to_vec(),
                validator: validator.map(str::to_owned),
            }))
        }
    }

    impl RemoteSource for FakeSource {
        async fn fetch(&self, validator: Option<&str>) -> std::result::Result<FetchOutcome, SyncError> {
            self.sent.lock().push(validator.map(str::to_owned));
            self.response.lock().take().unwrap_or(Err(SyncError::Transport("exhausted".into())))
        }
    }

    #[derive(Default)]
    struct CountingReload(AtomicU32);

    impl ReloadHandler for CountingReload {
        fn reload(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 失敗するキャッシュ
    struct BrokenCache;

    impl CacheStore for BrokenCache {
        fn get(&self, _key: &str, default: &str) -> String {
            default.to_string()
        }

        fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), crate::cache::CacheError> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    struct Harness {
        cache: Arc<MemoryCacheStore>,
        store: DictionaryStore,
        document: Document,
        reloads: Arc<CountingReload>,
    }

    #[fixture]
    fn harness() -> Harness {
        let document = Document::new("tw-storydata");
        document.set_visibility(Visibility::Visible);
        Harness {
            cache: Arc::new(MemoryCacheStore::new()),
            store: DictionaryStore::new([("p1", "旧")].into_iter().collect(), Some(Fingerprint::of_payload(b"old"))),
            document,
            reloads: Arc::new(CountingReload::default()),
        }
    }

    fn sync(harness: &Harness, source: FakeSource, policy: SyncPolicy) -> RemoteSync<FakeSource> {
        RemoteSync::new(source, harness.cache.clone(), harness.store.clone(), harness.document.clone(), policy)
            .with_reload_handler(harness.reloads.clone())
    }

    fn policy(strategy: ReconcileStrategy, reload_mode: ReloadMode) -> SyncPolicy {
        SyncPolicy { strategy, reload_mode }
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn adopts_changed_payload(harness: Harness) {
        let body = r#"{"p1":"你好"}"#;
        let sync = sync(&harness, FakeSource::payload(body, None), policy(ReconcileStrategy::ContentHash, ReloadMode::Always));

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Adopted { entries: 1, decision: ReloadDecision::ReloadForced });
        let snapshot = harness.store.snapshot();
        expect_that!(snapshot.dictionary.get("p1"), some(eq("你好")));
        assert_eq!(snapshot.fingerprint, Some(Fingerprint::of_payload(body.as_bytes())));
        expect_that!(harness.cache.get(DICTIONARY_KEY, ""), eq(body));
        expect_that!(harness.cache.get(FINGERPRINT_KEY, ""), eq(Fingerprint::of_payload(body.as_bytes()).as_str()));
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(1));
        assert_eq!(*sync.source.sent.lock(), vec![None]);
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn identical_hash_is_unchanged(harness: Harness) {
        harness.store.replace(harness.store.snapshot().dictionary.clone(), Some(Fingerprint::of_payload(b"{}")));
        let sync = sync(&harness, FakeSource::payload("{}", None), policy(ReconcileStrategy::ContentHash, ReloadMode::Always));

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
        expect_that!(harness.store.snapshot().dictionary.get("p1"), some(eq("旧")));
        expect_that!(harness.cache.get(DICTIONARY_KEY, "none"), eq("none"));
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(0));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn conditional_not_modified_touches_nothing(harness: Harness) {
        harness.store.replace(harness.store.snapshot().dictionary.clone(), Fingerprint::from_validator("\"v1\""));
        let sync = sync(
            &harness,
            FakeSource::new(Ok(FetchOutcome::NotModified)),
            policy(ReconcileStrategy::Conditional, ReloadMode::Always),
        );

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::NotModified);
        assert_eq!(*sync.source.sent.lock(), vec![Some("\"v1\"".to_string())]);
        expect_that!(harness.store.snapshot().dictionary.get("p1"), some(eq("旧")));
        expect_that!(harness.cache.get(DICTIONARY_KEY, "none"), eq("none"));
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(0));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn conditional_uses_etag_as_fingerprint(harness: Harness) {
        let sync = sync(
            &harness,
            FakeSource::payload(r#"{"p1":"新"}"#, Some("\"v2\"")),
            policy(ReconcileStrategy::Conditional, ReloadMode::Always),
        );

        sync.check().await.unwrap();

        expect_that!(harness.store.fingerprint(), some(eq(&Fingerprint::from_validator("\"v2\"").unwrap())));
        expect_that!(harness.cache.get(FINGERPRINT_KEY, ""), eq("\"v2\""));
    }

    #[rstest]
    #[case::array("[1, 2]")]
    #[case::non_string(r#"{"p1": 1}"#)]
    #[case::truncated(r#"{"p1": "#)]
    #[googletest::test]
    #[tokio::test]
    async fn malformed_payload_changes_nothing(harness: Harness, #[case] body: &str) {
        let sync = sync(&harness, FakeSource::payload(body, None), policy(ReconcileStrategy::ContentHash, ReloadMode::Always));

        let result = sync.check().await;

        assert!(matches!(result, Err(SyncError::MalformedPayload(_))));
        assert_eq!(harness.store.snapshot().dictionary.get("p1"), Some("旧"));
        assert_eq!(harness.store.fingerprint(), Some(Fingerprint::of_payload(b"old")));
        assert_eq!(harness.cache.get(DICTIONARY_KEY, "none"), "none");
        assert_eq!(harness.reloads.0.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn cache_failure_aborts_adoption(harness: Harness) {
        let sync = RemoteSync::new(
            FakeSource::payload(r#"{"p1":"新"}"#, None),
            Arc::new(BrokenCache),
            harness.store.clone(),
            harness.document.clone(),
            policy(ReconcileStrategy::ContentHash, ReloadMode::Always),
        );

        let result = sync.check().await;

        assert!(matches!(result, Err(SyncError::Cache(_))));
        expect_that!(harness.store.snapshot().dictionary.get("p1"), some(eq("旧")));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn run_absorbs_transport_errors(harness: Harness) {
        let sync = sync(
            &harness,
            FakeSource::new(Err(SyncError::Timeout(std::time::Duration::from_secs(8)))),
            policy(ReconcileStrategy::ContentHash, ReloadMode::Always),
        );

        let outcome = sync.run().await;

        expect_that!(matches!(outcome, SyncOutcome::Failed(_)), eq(true));
        expect_that!(harness.store.snapshot().dictionary.get("p1"), some(eq("旧")));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn declined_reload_keeps_new_dictionary(harness: Harness) {
        let sync = sync(&harness, FakeSource::payload(r#"{"p1":"新"}"#, None), policy(ReconcileStrategy::ContentHash, ReloadMode::Prompt))
            .with_prompt(Arc::new(AutoDecline));

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Adopted { entries: 1, decision: ReloadDecision::Declined });
        expect_that!(harness.store.snapshot().dictionary.get("p1"), some(eq("新")));
        expect_that!(harness.cache.get(DICTIONARY_KEY, ""), eq(r#"{"p1":"新"}"#));
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(0));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn hidden_document_reloads_without_prompt(harness: Harness) {
        harness.document.set_visibility(Visibility::Hidden);
        let sync = sync(&harness, FakeSource::payload(r#"{"p1":"新"}"#, None), policy(ReconcileStrategy::ContentHash, ReloadMode::Prompt))
            .with_prompt(Arc::new(AutoDecline));

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Adopted { entries: 1, decision: ReloadDecision::ReloadHidden });
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(1));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn confirmed_reload(harness: Harness) {
        let sync = sync(&harness, FakeSource::payload(r#"{"p1":"新"}"#, None), policy(ReconcileStrategy::ContentHash, ReloadMode::Prompt))
            .with_prompt(Arc::new(AutoAccept));

        let outcome = sync.check().await.unwrap();

        assert_eq!(outcome, SyncOutcome::Adopted { entries: 1, decision: ReloadDecision::Confirmed });
        expect_that!(harness.reloads.0.load(Ordering::SeqCst), eq(1));
    }
}
