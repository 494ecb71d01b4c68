//! ストーリー HTML の解析
//!
//! Twine の公開 HTML は `<tw-storydata>` の中に `<tw-passagedata>` を並べた
//! 形式で、本文は HTML エスケープされている。正規表現で切り出し、
//! エスケープを戻した上で [`Document`] を組み立てる。

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::document::{
    Document,
    DocumentError,
    NodeId,
};
use crate::text::decode_entities;

/// ストーリー要素のタグ
pub(super) const STORY_TAG: &str = "tw-storydata";
/// パッセージ要素のタグ
pub(super) const PASSAGE_TAG: &str = "tw-passagedata";

/// `<tw-storydata ...>...</tw-storydata>`
#[allow(clippy::expect_used)]
static STORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tw-storydata(?P<attrs>[^>]*)>(?P<story>.*)</tw-storydata>")
        .expect("story pattern should compile")
});

/// `<tw-passagedata ...>body</tw-passagedata>`
#[allow(clippy::expect_used)]
pub(super) static PASSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tw-passagedata(?P<attrs>[^>]*)>(?P<body>.*?)</tw-passagedata>")
        .expect("passage pattern should compile")
});

/// `key="value"`
#[allow(clippy::expect_used)]
static ATTRIBUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)\s*=\s*"(.*?)""#).expect("attribute pattern should compile"));

#[derive(Error, Debug)]
pub enum StoryError {
    #[error("No <tw-passagedata> elements found")]
    NoPassages,

    #[error("Failed to build story document: {0}")]
    Document(#[from] DocumentError),
}

/// 1 つのパッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// 文書内の要素
    pub node: NodeId,
    /// 翻訳キー（`name` 属性。ない場合は `pid_<pid>`）
    pub name: String,
    pub pid: Option<u32>,
    pub tags: Vec<String>,
    /// エスケープを戻した元の本文
    pub source: String,
}

/// 解析済みのストーリー
#[derive(Debug)]
pub struct Story {
    /// パッセージ要素を持つ文書
    document: Document,
    /// ストーリー名
    name: Option<String>,
    /// 文書順のパッセージ
    passages: Vec<Passage>,
    /// 名前 → `passages` の位置（重複時は最初のもの）
    index: HashMap<String, usize>,
    /// 入力 HTML 内でパッセージを探した範囲
    scope: Range<usize>,
}

impl Story {
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// `<tw-storydata name="...">` の値
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 文書順のパッセージ
    #[must_use]
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    #[must_use]
    pub fn passage(&self, name: &str) -> Option<&Passage> {
        self.index.get(name).and_then(|i| self.passages.get(*i))
    }

    /// パッセージ要素の現在の内容
    #[must_use]
    pub fn current_text(&self, passage: &Passage) -> String {
        self.document.text(passage.node).unwrap_or_default()
    }

    /// パッセージを探した範囲（出力時に同じ範囲を書き換える）
    pub(super) fn scope(&self) -> Range<usize> {
        self.scope.clone()
    }
}

/// ストーリー HTML を解析する
///
/// `<tw-storydata>` がなければ入力全体からパッセージを探す。
///
/// # Errors
/// パッセージが 1 つもない場合
pub fn parse_story(html: &str) -> Result<Story, StoryError> {
    let (story_attrs, scope) = match STORY_PATTERN.captures(html) {
        Some(captures) => {
            let attrs = captures.name("attrs").map_or("", |m| m.as_str());
            let scope = captures.name("story").map_or(0..html.len(), |m| m.range());
            (parse_attributes(attrs), scope)
        }
        None => (Vec::new(), 0..html.len()),
    };

    let document = Document::new(STORY_TAG);
    let root = document.root();
    for (key, value) in &story_attrs {
        document.set_attribute(root, key, value)?;
    }

    let body = html.get(scope.clone()).unwrap_or_default();
    let mut passages = Vec::new();
    let mut index = HashMap::new();
    for captures in PASSAGE_PATTERN.captures_iter(body) {
        let attrs = parse_attributes(captures.name("attrs").map_or("", |m| m.as_str()));
        let source = decode_entities(captures.name("body").map_or("", |m| m.as_str())).into_owned();

        let lookup = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        let pid = lookup("pid").and_then(|pid| pid.trim().parse().ok());
        let name = match lookup("name").filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("pid_{}", lookup("pid").unwrap_or("?")),
        };
        let tags: Vec<String> = lookup("tags")
            .map(|tags| tags.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();

        let node = document.create_element(PASSAGE_TAG);
        for (key, value) in &attrs {
            document.set_attribute(node, key, value)?;
        }
        // 名前のないパッセージも翻訳キーで引けるようにする
        document.set_attribute(node, "name", &name)?;
        document.set_text(node, &source)?;
        document.append_child(root, node)?;

        if index.contains_key(&name) {
            tracing::warn!(name = %name, "Duplicate passage name, the first one wins");
        } else {
            index.insert(name.clone(), passages.len());
        }
        passages.push(Passage { node, name, pid, tags, source });
    }

    if passages.is_empty() {
        return Err(StoryError::NoPassages);
    }

    let name = story_attrs.into_iter().find(|(k, _)| k == "name").map(|(_, v)| v);
    tracing::debug!(passages = passages.len(), story = ?name, "Parsed story");

    Ok(Story { document, name, passages, index, scope })
}

/// 開始タグの属性を読み取る（値はエスケープを戻す）
pub(super) fn parse_attributes(text: &str) -> Vec<(String, String)> {
    ATTRIBUTE_PATTERN
        .captures_iter(text)
        .filter_map(|captures| {
            let key = captures.get(1)?.as_str().to_string();
            let value = decode_entities(captures.get(2)?.as_str()).into_owned();
            Some((key, value))
        })
        .collect()
}
