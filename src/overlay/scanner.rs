//! Full and subtree translation passes.

use super::NodeTranslator;
use crate::document::{
    Document,
    NodeId,
};

/// Result of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Matching elements visited
    pub matched: usize,
    /// Elements whose content was rewritten
    pub translated: usize,
}

impl ScanSummary {
    /// Counts one visited element.
    fn record(&mut self, changed: bool) {
        self.matched += 1;
        if changed {
            self.translated += 1;
        }
    }
}

impl std::ops::AddAssign for ScanSummary {
    fn add_assign(&mut self, other: Self) {
        self.matched += other.matched;
        self.translated += other.translated;
    }
}

/// Enumerates translatable elements and hands each to the translator.
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Rewrites one element at a time
    translator: NodeTranslator,
}

impl Scanner {
    #[must_use]
    pub const fn new(translator: NodeTranslator) -> Self {
        Self { translator }
    }

    #[must_use]
    pub const fn translator(&self) -> &NodeTranslator {
        &self.translator
    }

    /// Translates every matching element reachable from the root.
    ///
    /// Finding nothing is not an error: the host may not have rendered yet.
    pub fn scan(&self, document: &Document) -> ScanSummary {
        let summary = self.scan_nodes(document, document.query_all(self.translator.selector()));
        tracing::debug!(matched = summary.matched, translated = summary.translated, "Full scan");
        summary
    }

    /// Translates `node` if it matches, otherwise every matching descendant.
    pub fn scan_inserted(&self, document: &Document, node: NodeId) -> ScanSummary {
        let selector = self.translator.selector();
        if document.matches(node, selector) {
            let mut summary = ScanSummary::default();
            summary.record(self.translator.apply(document, node));
            return summary;
        }

        let matches: Vec<_> = document
            .descendants(node)
            .into_iter()
            .filter(|id| document.matches(*id, selector))
            .collect();
        self.scan_nodes(document, matches)
    }

    /// Translates `nodes` in order.
    fn scan_nodes(&self, document: &Document, nodes: Vec<NodeId>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for node in nodes {
            summary.record(self.translator.apply(document, node));
        }
        summary
    }
}
