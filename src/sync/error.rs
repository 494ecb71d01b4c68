use std::time::Duration;

use crate::cache::CacheError;
use crate::dictionary::DictionaryError;

/// リモート同期のエラー
///
/// どれも同期 1 回分の失敗で、再試行は次回の起動に任せる。
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Remote fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote fetch failed: {0}")]
    Transport(String),

    #[error("Remote responded with HTTP {0}")]
    Status(u16),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Remote payload is not a dictionary: {0}")]
    MalformedPayload(#[from] DictionaryError),

    #[error("Failed to persist dictionary: {0}")]
    Cache(#[from] CacheError),
}
