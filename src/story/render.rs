//! Localized story output and dictionary extraction.

use std::collections::BTreeSet;

use regex::Captures;

use super::Story;
use super::parse::{
    PASSAGE_PATTERN,
    PASSAGE_TAG,
};
use crate::dictionary::TranslationDictionary;
use crate::text::escape_source;

/// Writes the current passage contents of `story` back into `base_html`.
///
/// `base_html` must be the HTML `story` was parsed from. Passages whose
/// content is unchanged keep their original bytes, as does everything
/// outside the passage bodies.
#[must_use]
pub fn render_story(base_html: &str, story: &Story) -> String {
    let scope = story.scope();
    let (Some(head), Some(body), Some(tail)) =
        (base_html.get(..scope.start), base_html.get(scope.clone()), base_html.get(scope.end..))
    else {
        tracing::warn!("Base HTML does not match the parsed story, leaving it unchanged");
        return base_html.to_string();
    };

    let mut passages = story.passages().iter();
    let mut rewritten = 0_usize;
    let rendered = PASSAGE_PATTERN.replace_all(body, |captures: &Captures<'_>| {
        let original = captures.get(0).map_or("", |m| m.as_str());
        let Some(passage) = passages.next() else {
            return original.to_string();
        };
        let current = story.current_text(passage);
        if current == passage.source {
            return original.to_string();
        }

        rewritten += 1;
        let attrs = captures.name("attrs").map_or("", |m| m.as_str());
        format!("<{PASSAGE_TAG}{attrs}>{}</{PASSAGE_TAG}>", escape_source(&current))
    });
    tracing::debug!(rewritten, "Rendered story");

    format!("{head}{rendered}{tail}")
}

/// Builds the overlay payload: passage name → escaped passage source.
///
/// With `names`, only those passages are included.
#[must_use]
pub fn extract_dictionary(story: &Story, names: Option<&BTreeSet<String>>) -> TranslationDictionary {
    story
        .passages()
        .iter()
        .filter(|passage| names.is_none_or(|names| names.contains(&passage.name)))
        // 重複した名前は最初のパッセージを使う
        .filter(|passage| story.passage(&passage.name).is_some_and(|first| first.node == passage.node))
        .map(|passage| (passage.name.clone(), escape_source(&story.current_text(passage)).into_owned()))
        .collect()
}

/// Flattens repeatable, comma-separated `--name` values.
///
/// Returns `None` when no non-blank name was given.
#[must_use]
pub fn parse_name_filters(args: &[String]) -> Option<BTreeSet<String>> {
    let names: BTreeSet<String> = args
        .iter()
        .flat_map(|chunk| chunk.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    (!names.is_empty()).then_some(names)
}
