//! 起動時の辞書解決
//!
//! 優先度順に並べたソースを試し、最初に成功したものを採用する。
//!
//! # 優先度
//! 1. 永続キャッシュ（[`CacheSource`]）
//! 2. 同梱スナップショット（[`BundledSource`]）
//! 3. 空の辞書
//!
//! どのソースの失敗も呼び出し元には伝えない。

use std::borrow::Cow;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;

use super::{
    Fingerprint,
    TranslationDictionary,
};
use crate::cache::{
    CacheRecord,
    CacheStore,
};

/// 辞書の取得元
pub trait DictionarySource: Send + Sync {
    /// ログ用の名前
    fn origin(&self) -> LoadOrigin;

    /// 辞書の取得を試みる。存在しない・壊れている場合は `None`
    fn attempt(&self) -> Option<TranslationDictionary>;
}

/// どのソースから辞書を得たか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Cache,
    Bundled,
    Empty,
}

/// 読み込み結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDictionary {
    pub dictionary: TranslationDictionary,
    pub origin: LoadOrigin,
    /// キャッシュ由来の場合のみ、保存済みの fingerprint
    pub fingerprint: Option<Fingerprint>,
}

/// 永続キャッシュに保存されたペイロード
pub struct CacheSource {
    /// 読み出し元のキャッシュ
    store: Arc<dyn CacheStore>,
}

impl CacheSource {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

impl DictionarySource for CacheSource {
    fn origin(&self) -> LoadOrigin {
        LoadOrigin::Cache
    }

    fn attempt(&self) -> Option<TranslationDictionary> {
        let record = CacheRecord::read(self.store.as_ref())?;
        match TranslationDictionary::parse(&record.payload) {
            Ok(dictionary) => Some(dictionary),
            Err(e) => {
                tracing::warn!("Ignoring malformed cached dictionary: {e}");
                None
            }
        }
    }
}

/// 同梱スナップショット
#[derive(Debug, Clone)]
pub enum BundledSource {
    /// 埋め込み済みのペイロード
    Inline(Cow<'static, str>),
    /// ファイルから読むペイロード
    File(PathBuf),
}

impl BundledSource {
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    #[must_use]
    pub fn inline(payload: impl Into<Cow<'static, str>>) -> Self {
        Self::Inline(payload.into())
    }

    /// 生のペイロード。ファイルが読めなければ `None`
    fn payload(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Inline(payload) => Some(Cow::Borrowed(payload.as_ref())),
            Self::File(path) => match std::fs::read_to_string(path) {
                Ok(content) => Some(Cow::Owned(content)),
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Bundled snapshot unavailable: {e}");
                    None
                }
            },
        }
    }
}

impl DictionarySource for BundledSource {
    fn origin(&self) -> LoadOrigin {
        LoadOrigin::Bundled
    }

    fn attempt(&self) -> Option<TranslationDictionary> {
        let payload = self.payload()?;
        match TranslationDictionary::parse(&payload) {
            Ok(dictionary) => Some(dictionary),
            Err(e) => {
                tracing::warn!("Ignoring malformed bundled dictionary: {e}");
                None
            }
        }
    }
}

/// ソースの連鎖
#[derive(Default)]
pub struct DictionaryLoader {
    /// 優先度順のソース
    sources: Vec<Box<dyn DictionarySource>>,
    /// キャッシュ由来の場合に fingerprint を読むためのストア
    cache: Option<Arc<dyn CacheStore>>,
}

impl DictionaryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// キャッシュ → 同梱スナップショットの標準構成
    #[must_use]
    pub fn standard(cache: Arc<dyn CacheStore>, bundled: Option<BundledSource>) -> Self {
        let mut loader = Self::new().with_cache(cache);
        if let Some(bundled) = bundled {
            loader = loader.with_source(bundled);
        }
        loader
    }

    /// キャッシュソースを追加する（fingerprint の取得にも使う）
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.sources.push(Box::new(CacheSource::new(Arc::clone(&cache))));
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl DictionarySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// 最初に成功したソースの辞書を返す。全滅なら空の辞書
    #[must_use]
    pub fn load(&self) -> LoadedDictionary {
        for source in &self.sources {
            let origin = source.origin();
            if let Some(dictionary) = source.attempt() {
                tracing::info!(?origin, entries = dictionary.len(), "Loaded dictionary");
                let fingerprint = match (origin, &self.cache) {
                    (LoadOrigin::Cache, Some(cache)) => CacheRecord::read_fingerprint(cache.as_ref()),
                    _ => None,
                };
                return LoadedDictionary { dictionary, origin, fingerprint };
            }
            tracing::debug!(?origin, "Dictionary source yielded nothing");
        }

        tracing::info!("No dictionary source available, starting untranslated");
        LoadedDictionary {
            dictionary: TranslationDictionary::new(),
            origin: LoadOrigin::Empty,
            fingerprint: None,
        }
    }
}

impl std::fmt::Debug for DictionaryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origins: Vec<_> = self.sources.iter().map(|s| s.origin()).collect();
        f.debug_struct("DictionaryLoader").field("sources", &origins).finish_non_exhaustive()
    }
}
