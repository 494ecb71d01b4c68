//! passage-overlay
//!
//! Twine/Harlowe ストーリー向けの翻訳オーバーレイ。描画済みの文書のパッセージを
//! 辞書の翻訳で置き換え、辞書はリモートの配布元と同期する。

pub mod cache;
pub mod config;
pub mod dictionary;
pub mod document;
pub mod overlay;
pub mod story;
pub mod sync;
pub mod text;

pub use overlay::OverlaySession;
