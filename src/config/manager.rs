//! 設定の保持と、設定ファイルを基準にしたパス解決
//!
//! `bundledSnapshot` や `cacheDir` に相対パスを書いた場合、実行時の
//! カレントディレクトリではなく `.passage-overlay.json` のあるディレクトリを
//! 基準にする。

use std::path::{
    Path,
    PathBuf,
};

use super::{
    ConfigError,
    OverlaySettings,
    loader,
};

/// 検証済みの設定と、その読み込み元
#[derive(Default, Debug, Clone)]
pub struct ConfigManager {
    /// 検証を通った設定（初期値は既定値）
    settings: OverlaySettings,

    /// 設定ファイルを探したディレクトリ。相対パスの基準
    base_dir: Option<PathBuf>,
}

impl ConfigManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `base_dir` の `.passage-overlay.json` を読み込む
    ///
    /// ファイルがなければ既定値を使う。`base_dir` が `None` の場合も同様。
    /// 失敗した場合、保持している設定と基準ディレクトリは変わらない。
    ///
    /// # Errors
    /// - ファイルの読み込み・JSON の解析に失敗
    /// - 検証エラー（すべての項目をまとめて返す）
    pub fn load_settings(&mut self, base_dir: Option<PathBuf>) -> Result<(), ConfigError> {
        let settings = match base_dir.as_deref() {
            Some(dir) => loader::load_from_dir(dir)?.unwrap_or_default(),
            None => OverlaySettings::default(),
        };
        settings.validate().map_err(ConfigError::ValidationErrors)?;

        tracing::debug!(
            base_dir = ?base_dir,
            remote = settings.remote.url.as_deref(),
            strategy = ?settings.remote.strategy,
            "Overlay settings loaded"
        );
        self.settings = settings;
        self.base_dir = base_dir;
        Ok(())
    }

    /// 設定を差し替える（CLI フラグによる上書き用）。基準ディレクトリは保持する
    ///
    /// # Errors
    /// 検証エラー
    pub fn update_settings(&mut self, settings: OverlaySettings) -> Result<(), ConfigError> {
        settings.validate().map_err(ConfigError::ValidationErrors)?;
        self.settings = settings;
        Ok(())
    }

    #[must_use]
    pub const fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    #[must_use]
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// 同梱スナップショットの場所
    #[must_use]
    pub fn bundled_snapshot(&self) -> Option<PathBuf> {
        self.settings.bundled_snapshot.as_deref().map(|path| self.resolve(path))
    }

    /// キャッシュディレクトリ。未指定ならプラットフォームの既定
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.settings.cache_dir.as_deref().map_or_else(|| self.settings.cache_dir(), |dir| self.resolve(dir))
    }

    /// 相対パスを基準ディレクトリからのパスにする
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use googletest::prelude::*;
    use rstest::*;
    use tempfile::TempDir;

    use super::*;
    use crate::config::ReloadMode;

    /// 設定ファイルを置いたディレクトリ
    fn config_dir(content: &str) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".passage-overlay.json"), content).unwrap();
        temp_dir
    }

    #[rstest]
    fn new_uses_defaults() {
        let manager = ConfigManager::new();

        assert_eq!(manager.settings().selector.tag, "tw-passagedata");
        assert!(manager.base_dir().is_none());
        assert!(manager.bundled_snapshot().is_none());
    }

    #[rstest]
    fn load_without_base_dir_uses_defaults() {
        let mut manager = ConfigManager::new();

        manager.load_settings(None).unwrap();

        assert_eq!(manager.settings().reload, ReloadMode::Prompt);
        assert!(manager.base_dir().is_none());
    }

    #[rstest]
    fn load_without_config_file_keeps_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::new();

        manager.load_settings(Some(temp_dir.path().to_path_buf())).unwrap();

        assert_eq!(manager.base_dir(), Some(temp_dir.path()));
        assert_eq!(manager.settings().polling.iterations, 20);
    }

    #[rstest]
    fn load_config_file() {
        let temp_dir = config_dir(r#"{"selector": {"tag": "tw-passage"}}"#);
        let mut manager = ConfigManager::new();

        manager.load_settings(Some(temp_dir.path().to_path_buf())).unwrap();

        assert_eq!(manager.settings().selector.tag, "tw-passage");
        assert_eq!(manager.settings().selector.attribute, "name");
    }

    /// 検証に失敗した場合は以前の設定と基準ディレクトリを保持する
    #[rstest]
    fn invalid_file_keeps_previous_state() {
        let temp_dir = config_dir(r#"{"remote": {"timeoutMs": 0}}"#);
        let mut manager = ConfigManager::new();

        let result = manager.load_settings(Some(temp_dir.path().to_path_buf()));

        assert!(matches!(result, Err(ConfigError::ValidationErrors(_))));
        assert_eq!(manager.settings().remote.timeout_ms, 8000);
        assert!(manager.base_dir().is_none());
    }

    #[rstest]
    fn relative_paths_resolve_against_config_dir() {
        let temp_dir = config_dir(r#"{"bundledSnapshot": "i18n/zh.json", "cacheDir": ".cache"}"#);
        let mut manager = ConfigManager::new();

        manager.load_settings(Some(temp_dir.path().to_path_buf())).unwrap();

        assert_eq!(manager.bundled_snapshot(), Some(temp_dir.path().join("i18n/zh.json")));
        assert_eq!(manager.cache_dir(), temp_dir.path().join(".cache"));
    }

    #[rstest]
    fn absolute_paths_are_kept() {
        let temp_dir = config_dir(r#"{"bundledSnapshot": "/srv/zh.json", "cacheDir": "/var/cache/overlay"}"#);
        let mut manager = ConfigManager::new();

        manager.load_settings(Some(temp_dir.path().to_path_buf())).unwrap();

        assert_eq!(manager.bundled_snapshot(), Some(PathBuf::from("/srv/zh.json")));
        assert_eq!(manager.cache_dir(), PathBuf::from("/var/cache/overlay"));
    }

    #[googletest::test]
    fn unset_cache_dir_uses_platform_default() {
        let manager = ConfigManager::new();

        expect_that!(manager.cache_dir().ends_with("passage-overlay"), eq(true));
    }

    #[rstest]
    fn update_keeps_base_dir() {
        let temp_dir = config_dir("{}");
        let mut manager = ConfigManager::new();
        manager.load_settings(Some(temp_dir.path().to_path_buf())).unwrap();
        let mut settings = manager.settings().clone();
        settings.reload = ReloadMode::Always;

        manager.update_settings(settings).unwrap();

        assert_eq!(manager.settings().reload, ReloadMode::Always);
        assert_eq!(manager.base_dir(), Some(temp_dir.path()));
    }

    #[rstest]
    fn update_rejects_invalid_settings() {
        let mut manager = ConfigManager::new();
        let mut settings = OverlaySettings::default();
        settings.selector.attribute = String::new();

        let result = manager.update_settings(settings);

        assert!(result.is_err());
        assert_eq!(manager.settings().selector.attribute, "name");
    }
}
