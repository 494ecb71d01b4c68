//! 要素単位の翻訳適用

use crate::config::ContentPolicy;
use crate::dictionary::DictionaryStore;
use crate::document::{
    Document,
    ElementSelector,
    NodeId,
};
use crate::text::{
    decode_entities,
    normalize_line_endings,
};

/// 1 つの要素に辞書の翻訳を適用する
///
/// 何度呼んでも結果は変わらない。未接続の要素にも適用できる。
#[derive(Debug, Clone)]
pub struct NodeTranslator {
    /// 共有辞書（読み取りのみ）
    store: DictionaryStore,
    /// 翻訳対象の条件
    selector: ElementSelector,
    /// 翻訳文字列の書き込み方
    policy: ContentPolicy,
}

impl NodeTranslator {
    #[must_use]
    pub const fn new(store: DictionaryStore, selector: ElementSelector, policy: ContentPolicy) -> Self {
        Self { store, selector, policy }
    }

    #[must_use]
    pub const fn selector(&self) -> &ElementSelector {
        &self.selector
    }

    /// 翻訳を適用する
    ///
    /// # Returns
    /// 内容を書き換えた場合 `true`
    ///
    /// 以下の場合は何もしない:
    /// - 識別属性がない、または空
    /// - 辞書にキーがない（元の内容をそのまま残す）
    /// - 改行コードを揃えた上で、既に翻訳と同じ内容
    pub fn apply(&self, document: &Document, node: NodeId) -> bool {
        let Some(key) = document
            .attribute(node, self.selector.attribute())
            .filter(|key| !key.is_empty())
        else {
            return false;
        };

        let snapshot = self.store.snapshot();
        let Some(translation) = snapshot.dictionary.get(&key) else {
            return false;
        };

        let prepared = self.prepare(translation);
        let current = document.text(node).unwrap_or_default();
        if normalize_line_endings(&current) == prepared {
            return false;
        }

        // 部分更新では再描画で残った断片が消えないため、丸ごと置き換える
        match document.set_text(node, &prepared) {
            Ok(()) => {
                tracing::trace!(key = %key, "Translated element");
                true
            }
            Err(e) => {
                tracing::debug!(key = %key, "Failed to translate element: {e}");
                false
            }
        }
    }

    /// ポリシーに従って書き込む文字列を作る
    fn prepare(&self, translation: &str) -> String {
        let text = match self.policy {
            ContentPolicy::Markup => decode_entities(translation),
            ContentPolicy::PlainText => translation.into(),
        };
        normalize_line_endings(&text).into_owned()
    }
}
