//! 設定ファイルの読み込み関数

use std::path::Path;

use super::{
    ConfigError,
    OverlaySettings,
};

/// 設定ファイル名
pub(super) const CONFIG_FILE_NAME: &str = ".passage-overlay.json";

/// ベースディレクトリから設定を読み込む
///
/// `.passage-overlay.json` ファイルを探して読み込む
///
/// # Arguments
/// * `base_dir` - 設定ファイルを探すディレクトリ
///
/// # Returns
/// - `Ok(Some(settings))`: 設定ファイルが見つかり、読み込みに成功
/// - `Ok(None)`: 設定ファイルが見つからない
/// - `Err(ConfigError)`: ファイル読み込みまたはパースエラー
///
/// # Errors
/// - ファイル読み込みエラー
/// - JSON パースエラー
pub(super) fn load_from_dir(base_dir: &Path) -> Result<Option<OverlaySettings>, ConfigError> {
    let config_path = base_dir.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        tracing::debug!("Configuration file not found: {:?}", config_path);
        return Ok(None);
    }

    tracing::debug!("Loading configuration from: {:?}", config_path);

    let content = std::fs::read_to_string(&config_path)?;
    let settings: OverlaySettings = serde_json::from_str(&content)?;

    Ok(Some(settings))
}
