//! 辞書とストーリーの突き合わせ
//!
//! 翻訳の品質ではなく、オーバーレイで適用したときに壊れる箇所を検出する。

use std::collections::{
    BTreeSet,
    HashSet,
};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::Story;
use crate::dictionary::TranslationDictionary;
use crate::text::{
    decode_entities,
    normalize_line_endings,
};

/// `$variable`
#[allow(clippy::expect_used)]
static VARIABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z_][A-Za-z0-9_]*").expect("variable pattern should compile"));

/// `[[link]]`
#[allow(clippy::expect_used)]
static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\[(.*?)\]\]").expect("link pattern should compile"));

/// 1 件の指摘
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// ストーリーに存在しないキー
    UnknownPassage { key: String },
    /// 原文と同じ内容
    Untranslated { key: String },
    /// `$変数` の集合が原文と異なる
    PlaceholderMismatch { key: String, missing: Vec<String>, extra: Vec<String> },
    /// リンク先が原文と異なる（遷移が壊れる）
    LinkTargetChanged { key: String, expected: Vec<String>, found: Vec<String> },
}

impl Finding {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::UnknownPassage { key }
            | Self::Untranslated { key }
            | Self::PlaceholderMismatch { key, .. }
            | Self::LinkTargetChanged { key, .. } => key,
        }
    }

    /// `--strict` で失敗扱いにするか
    #[must_use]
    pub const fn is_error(&self) -> bool {
        !matches!(self, Self::Untranslated { .. })
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPassage { key } => write!(f, "'{key}': no such passage in the story"),
            Self::Untranslated { key } => write!(f, "'{key}': not translated"),
            Self::PlaceholderMismatch { key, missing, extra } => write!(
                f,
                "'{key}': variable placeholder mismatch (missing: [{}], extra: [{}])",
                missing.join(", "),
                extra.join(", ")
            ),
            Self::LinkTargetChanged { key, expected, found } => write!(
                f,
                "'{key}': link targets changed ([{}] -> [{}])",
                expected.join(", "),
                found.join(", ")
            ),
        }
    }
}

/// 突き合わせの結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// キー順の指摘
    pub findings: Vec<Finding>,
    /// ストーリー内のパッセージ数（名前の重複は 1 つと数える）
    pub passages: usize,
    /// 原文と異なる翻訳を持つパッセージ数
    pub translated: usize,
    /// 辞書にないパッセージ名
    pub missing: Vec<String>,
}

impl AuditReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.findings.iter().filter(|finding| finding.is_error()).count()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// 辞書をストーリーと突き合わせる
///
/// 辞書の値はエスケープされたパッセージ本文として解釈する。
#[must_use]
pub fn audit(story: &Story, dictionary: &TranslationDictionary) -> AuditReport {
    let mut keys: Vec<_> = dictionary.iter().collect();
    keys.sort_unstable_by_key(|(key, _)| *key);

    let mut report = AuditReport::default();
    for (key, translation) in keys {
        let Some(passage) = story.passage(key) else {
            report.findings.push(Finding::UnknownPassage { key: key.to_string() });
            continue;
        };

        let original = normalize_line_endings(&passage.source).into_owned();
        let decoded = decode_entities(translation);
        let translated = normalize_line_endings(&decoded);

        if translated == original {
            report.findings.push(Finding::Untranslated { key: key.to_string() });
        } else {
            report.translated += 1;
        }

        let expected_vars = variables(&original);
        let found_vars = variables(&translated);
        if expected_vars != found_vars {
            report.findings.push(Finding::PlaceholderMismatch {
                key: key.to_string(),
                missing: expected_vars.difference(&found_vars).cloned().collect(),
                extra: found_vars.difference(&expected_vars).cloned().collect(),
            });
        }

        let expected_links = link_targets(&original);
        let found_links = link_targets(&translated);
        if expected_links != found_links {
            report.findings.push(Finding::LinkTargetChanged {
                key: key.to_string(),
                expected: expected_links,
                found: found_links,
            });
        }
    }

    let mut seen = HashSet::new();
    for passage in story.passages() {
        if !seen.insert(passage.name.as_str()) {
            continue;
        }
        report.passages += 1;
        if !dictionary.contains_key(&passage.name) {
            report.missing.push(passage.name.clone());
        }
    }

    tracing::debug!(
        findings = report.findings.len(),
        translated = report.translated,
        missing = report.missing.len(),
        "Audited dictionary"
    );
    report
}

/// 本文中の `$name` と `_name`
fn variables(text: &str) -> BTreeSet<String> {
    VARIABLE_PATTERN.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// リンク先を出現順に返す
///
/// `[[label->target]]`、`[[target<-label]]`、`[[target]]` の 3 形式。
fn link_targets(text: &str) -> Vec<String> {
    LINK_PATTERN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|inner| {
            let inner = inner.as_str();
            let target = if let Some((_, target)) = inner.split_once("->") {
                target
            } else if let Some((target, _)) = inner.split_once("<-") {
                target
            } else {
                inner
            };
            target.trim().to_string()
        })
        .collect()
}
