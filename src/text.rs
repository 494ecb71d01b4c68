//! Passage text helpers shared by the translator and the story tooling.

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::escape::{
    partial_escape,
    resolve_html5_entity,
};
use regex::{
    Captures,
    Regex,
};

/// `&name;`, `&#123;` or `&#x7B;`
#[allow(clippy::expect_used)]
static ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(?P<dec>[0-9]{1,7})|#[xX](?P<hex>[0-9A-Fa-f]{1,6})|(?P<name>[A-Za-z][A-Za-z0-9]{0,31}));")
        .expect("entity pattern should compile")
});

/// Converts `\r\n` and bare `\r` into `\n`.
#[must_use]
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Decodes HTML entities (named, decimal and hex) one at a time.
///
/// A bare `&` or an unknown entity stays as written, and the entities
/// around it are still decoded.
#[must_use]
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY_PATTERN.replace_all(text, |captures: &Captures<'_>| {
        resolve_entity(captures)
            .unwrap_or_else(|| captures.get(0).map_or_else(String::new, |m| m.as_str().to_string()))
    })
}

/// 1 つの実体参照を文字列に戻す。解決できなければ `None`
fn resolve_entity(captures: &Captures<'_>) -> Option<String> {
    if let Some(name) = captures.name("name") {
        return resolve_html5_entity(name.as_str()).map(str::to_string);
    }
    let code = match (captures.name("dec"), captures.name("hex")) {
        (Some(dec), _) => dec.as_str().parse().ok()?,
        (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok()?,
        (None, None) => return None,
    };
    char::from_u32(code).filter(|c| *c != '\0').map(String::from)
}

/// Escapes passage source the way Twine stores it inside `<tw-passagedata>`.
///
/// `&`, `<`, `>`, `"` and `'` are replaced; `'` becomes `&#39;`.
#[must_use]
pub fn escape_source(text: &str) -> Cow<'_, str> {
    let escaped = partial_escape(text);
    if escaped.contains(['"', '\'']) {
        Cow::Owned(escaped.replace('"', "&quot;").replace('\'', "&#39;"))
    } else {
        escaped
    }
}
