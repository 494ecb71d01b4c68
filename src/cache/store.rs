//! キー・バリュー形式の永続キャッシュ

use std::collections::HashMap;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised while persisting cache entries.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access cache file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize cache entries: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 文字列のみを扱う永続ストレージ
///
/// ページをまたいで残る値の置き場所。読み込みは失敗しない。
pub trait CacheStore: Send + Sync {
    /// `key` の値を返す。存在しなければ `default` を返す。
    fn get(&self, key: &str, default: &str) -> String;

    /// `key` に `value` を保存する
    ///
    /// # Errors
    /// 永続化に失敗した場合
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// JSON ファイル 1 つにすべてのキーを保存するキャッシュ
#[derive(Debug)]
pub struct FileCacheStore {
    /// キャッシュファイルのパス
    path: PathBuf,
    /// メモリ上のエントリ（ファイルと同期）
    entries: Mutex<HashMap<String, String>>,
}

impl FileCacheStore {
    /// キャッシュファイル名
    pub const FILE_NAME: &'static str = "cache.json";

    /// `dir` 配下のキャッシュファイルを開く
    ///
    /// ファイルが壊れている場合は空として扱い、次の `set` で上書きする。
    ///
    /// # Errors
    /// ディレクトリの作成またはファイルの読み込みに失敗した場合
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Ignoring unreadable cache file: {e}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened cache");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 一時ファイルに書き出してから置き換える
    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), CacheError> {
        let content = serde_json::to_string(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.entries.lock().get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value.to_string());

        // ディスクに書けなかった値はメモリにも残さない
        self.persist(&entries).inspect_err(|_| match previous {
            Some(old) => {
                entries.insert(key.to_string(), old);
            }
            None => {
                entries.remove(key);
            }
        })
    }
}

/// `dir` のファイルキャッシュを開く
///
/// 開けない場合は警告を出し、プロセス内のキャッシュで代用する。
/// 翻訳は同梱スナップショットとリモート同期だけで続行できる。
#[must_use]
pub fn open_cache(dir: &Path) -> Arc<dyn CacheStore> {
    match FileCacheStore::open(dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "Cache unavailable, keeping entries in memory: {e}");
            Arc::new(MemoryCacheStore::new())
        }
    }
}

/// プロセス内だけで保持するキャッシュ
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    /// key → value
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.entries.lock().get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
