//! Structural change notifications.

use std::pin::Pin;
use std::task::{
    Context,
    Poll,
};

use futures::Stream;
use tokio::sync::mpsc;

use super::NodeId;

/// One structural change of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Subscription to a document's mutation stream.
///
/// Records arrive in mutation order. Dropping the observer unsubscribes it;
/// the stream ends once the document is gone.
#[derive(Debug)]
pub struct MutationObserver {
    /// ドキュメント側が送る変更記録
    receiver: mpsc::UnboundedReceiver<MutationRecord>,
}

impl MutationObserver {
    /// ドキュメントに登録済みの受信側から作る
    pub(super) const fn new(receiver: mpsc::UnboundedReceiver<MutationRecord>) -> Self {
        Self { receiver }
    }

    /// Returns a pending record without waiting.
    pub fn try_next(&mut self) -> Option<MutationRecord> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for MutationObserver {
    type Item = MutationRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
