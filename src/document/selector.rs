//! Translatable element criteria.

use crate::config::SelectorConfig;

/// Matches elements by tag name (ASCII case-insensitive) and the presence of
/// an identifying attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSelector {
    /// 対象のタグ名
    tag: String,
    /// 翻訳キーを持つ属性名
    attribute: String,
}

impl ElementSelector {
    #[must_use]
    pub fn new(tag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self { tag: tag.into(), attribute: attribute.into() }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Name of the identifying attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    #[must_use]
    pub fn matches<'a>(
        &self,
        tag: &str,
        mut attributes: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> bool {
        tag.eq_ignore_ascii_case(&self.tag) && attributes.any(|(name, _)| name == self.attribute)
    }
}

impl Default for ElementSelector {
    fn default() -> Self {
        Self::from(&SelectorConfig::default())
    }
}

impl From<&SelectorConfig> for ElementSelector {
    fn from(config: &SelectorConfig) -> Self {
        Self::new(config.tag.trim(), config.attribute.trim())
    }
}
