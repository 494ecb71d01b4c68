//! 新しい辞書を採用した後の再読み込み判断

use crate::config::ReloadMode;
use crate::document::Visibility;

/// 確認ダイアログの文言
pub const RELOAD_MESSAGE: &str = "A newer translation is available. Reload now to apply it?";

/// 再読み込みの判断結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// 非表示のため確認せずに再読み込み
    ReloadHidden,
    /// `reload = "always"` による再読み込み
    ReloadForced,
    /// ユーザーが承認
    Confirmed,
    /// ユーザーが拒否（新しい辞書は保存済み）
    Declined,
}

impl ReloadDecision {
    #[must_use]
    pub const fn reloads(self) -> bool {
        !matches!(self, Self::Declined)
    }
}

/// ユーザーへの確認
pub trait ReloadPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// 常に承認する
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

impl ReloadPrompt for AutoAccept {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// 常に拒否する
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecline;

impl ReloadPrompt for AutoDecline {
    fn confirm(&self, _message: &str) -> bool {
        false
    }
}

/// 再読み込み（オーバーレイの再初期化）の実行者
pub trait ReloadHandler: Send + Sync {
    fn reload(&self);
}

/// 表示状態と設定から再読み込みするか決める
///
/// 非表示のときはユーザーの作業を妨げないので確認しない。
#[must_use]
pub fn decide_reload(visibility: Visibility, mode: ReloadMode, prompt: &dyn ReloadPrompt) -> ReloadDecision {
    if visibility == Visibility::Hidden {
        return ReloadDecision::ReloadHidden;
    }
    match mode {
        ReloadMode::Always => ReloadDecision::ReloadForced,
        ReloadMode::Prompt => {
            if prompt.confirm(RELOAD_MESSAGE) {
                ReloadDecision::Confirmed
            } else {
                ReloadDecision::Declined
            }
        }
    }
}
