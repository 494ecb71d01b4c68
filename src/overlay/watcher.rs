//! 構造変化に追従する翻訳
//!
//! ホストは初期表示の後も要素を流し込むため、挿入された要素を購読して
//! その都度翻訳する。

use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{
    ScanSummary,
    Scanner,
};
use crate::document::{
    Document,
    MutationObserver,
    MutationRecord,
};

/// 挿入された要素を翻訳する購読者
#[derive(Debug, Clone)]
pub struct Watcher {
    /// 挿入された部分木を走査する
    scanner: Scanner,
}

impl Watcher {
    #[must_use]
    pub const fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }

    /// 1 件のミューテーションを処理する
    pub fn handle(&self, document: &Document, record: &MutationRecord) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for node in &record.added {
            summary += self.scanner.scan_inserted(document, *node);
        }
        if summary.translated > 0 {
            tracing::debug!(
                added = record.added.len(),
                translated = summary.translated,
                "Translated inserted elements"
            );
        }
        summary
    }

    /// 購読を開始し、バックグラウンドで処理を続ける
    ///
    /// 購読はこの関数が戻る前に登録されるため、直後の挿入も取りこぼさない。
    #[must_use]
    pub fn install(self, document: Document) -> JoinHandle<()> {
        let observer = document.observe();
        tokio::spawn(self.run(document, observer))
    }

    /// ストリームが閉じるまで記録を処理する
    async fn run(self, document: Document, mut observer: MutationObserver) {
        while let Some(record) = observer.next().await {
            self.handle(&document, &record);
        }
        tracing::debug!("Mutation stream closed, watcher stopped");
    }
}
