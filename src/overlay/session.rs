//! オーバーレイの起動から終了まで
//!
//! ページ読み込み時の流れを再現する:
//! 1. 辞書の読み込み（キャッシュ → 同梱 → 空）
//! 2. ウォッチャーの登録と初回スキャン
//! 3. 読み込み段階ごとの再スキャン
//! 4. 回数制限付きポーリング
//! 5. リモート同期（任意）

use std::sync::Arc;
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{
    BoundedPoller,
    NodeTranslator,
    Scanner,
    Watcher,
};
use crate::cache::CacheStore;
use crate::config::{
    OverlaySettings,
    PollingConfig,
};
use crate::dictionary::{
    DictionaryLoader,
    DictionaryStore,
    LoadOrigin,
};
use crate::document::{
    Document,
    ElementSelector,
    ReadyState,
};
use crate::sync::{
    ReloadHandler,
    ReloadPrompt,
    RemoteSource,
    RemoteSync,
    SyncOutcome,
    SyncPolicy,
};

/// リモート同期に必要なもの
pub struct RemoteSetup<R> {
    pub source: R,
    /// 採用した辞書の保存先
    pub cache: Arc<dyn CacheStore>,
    pub prompt: Arc<dyn ReloadPrompt>,
}

/// 再初期化を担う部分。同期タスクからも呼ばれる
struct Runtime {
    /// 対象の文書
    document: Document,
    /// 全体スキャンと再スキャンに使う
    scanner: Scanner,
    /// 起動直後ポーリングの間隔と回数
    polling: PollingConfig,
    /// 実行中のポーラー
    poller: Mutex<Option<BoundedPoller>>,
    /// 再初期化の回数
    reloads: AtomicU32,
}

impl Runtime {
    /// ポーラーを起動し、前のものがあれば止める
    fn start_poller(&self) {
        if self.polling.iterations == 0 {
            return;
        }
        let scanner = self.scanner.clone();
        let document = self.document.clone();
        let poller = BoundedPoller::spawn(self.polling.interval(), self.polling.iterations, move || {
            scanner.scan(&document);
        });
        let previous = self.poller.lock().replace(poller);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// 実行中のポーラーを止める
    fn stop_poller(&self) {
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            poller.cancel();
        }
    }
}

impl ReloadHandler for Runtime {
    fn reload(&self) {
        self.stop_poller();
        let summary = self.scanner.scan(&self.document);
        self.start_poller();
        let count = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(count, translated = summary.translated, "Overlay reinitialized");
    }
}

/// 1 つの文書に対するオーバーレイ
///
/// tokio ランタイム上で起動する必要がある。破棄するとすべてのタスクを止める。
pub struct OverlaySession {
    /// 対象の文書
    document: Document,
    /// 現在の辞書
    store: DictionaryStore,
    /// 起動時の辞書の読み込み元
    origin: LoadOrigin,
    /// 同期タスクと共有する再初期化処理
    runtime: Arc<Runtime>,
    /// 挿入を監視するタスク
    watcher: JoinHandle<()>,
    /// 読み込み段階ごとに再スキャンするタスク
    lifecycle: JoinHandle<()>,
    /// 1 回限りのリモート同期
    sync: Option<JoinHandle<SyncOutcome>>,
}

impl OverlaySession {
    /// リモート同期なしで起動する
    #[must_use]
    pub fn start(settings: &OverlaySettings, document: Document, loader: &DictionaryLoader) -> Self {
        let loaded = loader.load();
        let store = DictionaryStore::new(loaded.dictionary, loaded.fingerprint);
        let translator =
            NodeTranslator::new(store.clone(), ElementSelector::from(&settings.selector), settings.content_policy);
        let scanner = Scanner::new(translator);

        // 登録前の挿入を取りこぼさないよう、スキャンより先に購読する
        let watcher = Watcher::new(scanner.clone()).install(document.clone());
        let summary = scanner.scan(&document);
        tracing::info!(
            origin = ?loaded.origin,
            matched = summary.matched,
            translated = summary.translated,
            "Overlay started"
        );

        let lifecycle = tokio::spawn(rescan_at_checkpoints(document.clone(), scanner.clone()));

        let runtime = Arc::new(Runtime {
            document: document.clone(),
            scanner,
            polling: settings.polling,
            poller: Mutex::new(None),
            reloads: AtomicU32::new(0),
        });
        runtime.start_poller();

        Self { document, store, origin: loaded.origin, runtime, watcher, lifecycle, sync: None }
    }

    /// 起動し、並行してリモート同期を 1 回実行する
    #[must_use]
    pub fn start_with_sync<R>(
        settings: &OverlaySettings,
        document: Document,
        loader: &DictionaryLoader,
        remote: RemoteSetup<R>,
    ) -> Self
    where
        R: RemoteSource + 'static,
    {
        let mut session = Self::start(settings, document, loader);
        let policy = SyncPolicy { strategy: settings.remote.strategy, reload_mode: settings.reload };
        let sync = RemoteSync::new(
            remote.source,
            remote.cache,
            session.store.clone(),
            session.document.clone(),
            policy,
        )
        .with_prompt(remote.prompt)
        .with_reload_handler(session.runtime.clone());

        session.sync = Some(tokio::spawn(async move { sync.run().await }));
        session
    }

    #[must_use]
    pub const fn store(&self) -> &DictionaryStore {
        &self.store
    }

    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// 起動時にどこから辞書を読み込んだか
    #[must_use]
    pub const fn origin(&self) -> LoadOrigin {
        self.origin
    }

    /// 再初期化の回数
    #[must_use]
    pub fn reload_count(&self) -> u32 {
        self.runtime.reloads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.runtime.poller.lock().as_ref().is_some_and(|poller| !poller.is_finished())
    }

    /// 同期の完了を待つ。同期していない、または既に待った場合は `None`
    pub async fn wait_for_sync(&mut self) -> Option<SyncOutcome> {
        let handle = self.sync.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("Sync task did not complete: {e}");
                None
            }
        }
    }

    /// すべてのタスクを止める
    pub fn shutdown(&mut self) {
        self.runtime.stop_poller();
        self.watcher.abort();
        self.lifecycle.abort();
        if let Some(sync) = self.sync.take() {
            sync.abort();
        }
    }
}

impl Drop for OverlaySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for OverlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySession")
            .field("origin", &self.origin)
            .field("store", &self.store)
            .field("reloads", &self.reload_count())
            .field("syncing", &self.sync.is_some())
            .finish_non_exhaustive()
    }
}

/// `Interactive` と `Complete` で 1 回ずつ再スキャンする
async fn rescan_at_checkpoints(document: Document, scanner: Scanner) {
    let mut ready = document.subscribe_ready_state();
    let mut scanned = *ready.borrow_and_update();

    while scanned < ReadyState::Complete {
        if ready.changed().await.is_err() {
            return;
        }
        let state = *ready.borrow_and_update();
        if state > scanned {
            tracing::debug!(?state, "Ready state checkpoint");
            scanner.scan(&document);
            scanned = state;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use googletest::prelude::*;
    use rstest::*;

    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::{
        ReconcileStrategy,
        ReloadMode,
    };
    use crate::dictionary::BundledSource;
    use crate::document::{
        NodeId,
        Visibility,
    };
    use crate::sync::{
        AutoDecline,
        FetchOutcome,
        ReloadDecision,
        SyncError,
    };

    struct StaticSource(&'static str);

    impl RemoteSource for StaticSource {
        async fn fetch(&self, _validator: Option<&str>) -> std::result::Result<FetchOutcome, SyncError> {
            Ok(FetchOutcome::Payload { body: self.0.as_bytes().to_vec(), validator: None })
        }
    }

    fn passage(doc: &Document, name: &str, text: &str) -> NodeId {
        let node = doc.create_element("tw-passagedata");
        doc.set_attribute(node, "name", name).unwrap();
        doc.set_text(node, text).unwrap();
        doc.append_child(doc.root(), node).unwrap();
        node
    }

    fn bundled(payload: &'static str) -> DictionaryLoader {
        DictionaryLoader::new().with_source(BundledSource::inline(payload))
    }

    #[fixture]
    fn settings() -> OverlaySettings {
        OverlaySettings::default()
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn initial_scan_runs_before_start_returns(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        let p1 = passage(&doc, "p1", "Hello");
        let p2 = passage(&doc, "p2", "World");

        let session = OverlaySession::start(&settings, doc.clone(), &bundled(r#"{"p1":"你好"}"#));

        expect_that!(session.origin(), eq(LoadOrigin::Bundled));
        expect_that!(doc.text(p1), some(eq("你好")));
        expect_that!(doc.text(p2), some(eq("World")));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn rescans_at_ready_state_checkpoints(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        let mut settings = settings;
        settings.polling.iterations = 0;
        let _session = OverlaySession::start(&settings, doc.clone(), &bundled(r#"{"p1":"你好"}"#));

        let p1 = passage(&doc, "p1", "Hello");
        tokio::time::timeout(Duration::from_secs(1), async {
            while doc.text(p1).as_deref() != Some("你好") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // 通知なしでテキストだけ差し替えるホスト
        doc.set_text(p1, "Hello again").unwrap();
        doc.set_ready_state(ReadyState::Interactive);
        tokio::time::timeout(Duration::from_secs(1), async {
            while doc.text(p1).as_deref() != Some("你好") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test(start_paused = true)]
    async fn poller_repairs_silent_rewrites_then_stops(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        let p1 = passage(&doc, "p1", "Hello");
        let session = OverlaySession::start(&settings, doc.clone(), &bundled(r#"{"p1":"你好"}"#));

        doc.set_text(p1, "Hello").unwrap();
        tokio::time::sleep(settings.polling.interval() + Duration::from_millis(1)).await;
        expect_that!(doc.text(p1), some(eq("你好")));

        tokio::time::sleep(settings.polling.interval() * (settings.polling.iterations + 1)).await;
        expect_that!(session.is_polling(), eq(false));

        doc.set_text(p1, "Hello").unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        expect_that!(doc.text(p1), some(eq("Hello")));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn adopted_dictionary_triggers_reload(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        doc.set_visibility(Visibility::Hidden);
        let p1 = passage(&doc, "p1", "Hello");
        let cache = Arc::new(MemoryCacheStore::new());
        let mut session = OverlaySession::start_with_sync(
            &settings,
            doc.clone(),
            &bundled(r#"{"p1":"你好"}"#),
            RemoteSetup { source: StaticSource(r#"{"p1":"您好"}"#), cache: cache.clone(), prompt: Arc::new(AutoDecline) },
        );

        let outcome = session.wait_for_sync().await;

        assert_eq!(outcome, Some(SyncOutcome::Adopted { entries: 1, decision: ReloadDecision::ReloadHidden }));
        expect_that!(session.reload_count(), eq(1));
        expect_that!(doc.text(p1), some(eq("您好")));
        expect_that!(cache.get(crate::cache::DICTIONARY_KEY, ""), eq(r#"{"p1":"您好"}"#));
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn declined_reload_applies_to_later_insertions(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        doc.set_visibility(Visibility::Visible);
        let p1 = passage(&doc, "p1", "Hello");
        let mut settings = settings;
        settings.reload = ReloadMode::Prompt;
        settings.remote.strategy = ReconcileStrategy::ContentHash;
        settings.polling.iterations = 0;
        let mut session = OverlaySession::start_with_sync(
            &settings,
            doc.clone(),
            &bundled(r#"{"p1":"你好","p2":"世界"}"#),
            RemoteSetup {
                source: StaticSource(r#"{"p1":"您好","p2":"天下"}"#),
                cache: Arc::new(MemoryCacheStore::new()),
                prompt: Arc::new(AutoDecline),
            },
        );

        let outcome = session.wait_for_sync().await;

        assert_eq!(outcome, Some(SyncOutcome::Adopted { entries: 2, decision: ReloadDecision::Declined }));
        expect_that!(session.reload_count(), eq(0));
        expect_that!(doc.text(p1), some(eq("你好")));

        let p2 = passage(&doc, "p2", "World");
        tokio::time::timeout(Duration::from_secs(1), async {
            while doc.text(p2).as_deref() != Some("天下") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[rstest]
    #[googletest::test]
    #[tokio::test]
    async fn shutdown_stops_watcher(settings: OverlaySettings) {
        let doc = Document::new("tw-storydata");
        let mut session = OverlaySession::start(&settings, doc.clone(), &bundled(r#"{"p1":"你好"}"#));

        session.shutdown();
        tokio::task::yield_now().await;
        let p1 = passage(&doc, "p1", "Hello");
        tokio::time::sleep(Duration::from_millis(20)).await;

        expect_that!(session.is_polling(), eq(false));
        expect_that!(doc.text(p1), some(eq("Hello")));
    }
}
