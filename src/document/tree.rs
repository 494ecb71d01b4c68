//! ホスト文書のツリー
//!
//! ホスト（レンダリングエンジン）が要素を生成・挿入し、オーバーレイは
//! 識別属性を読み、テキストを書き換える。要素の生成・破棄はホストのみが行う。

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{
    mpsc,
    watch,
};

use super::{
    ElementSelector,
    MutationObserver,
    MutationRecord,
};

/// 要素の識別子（同じ文書内でのみ有効）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// 文書の読み込み段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    /// 構造の準備完了
    Interactive,
    /// 全リソース読み込み完了
    Complete,
}

/// 文書がユーザーに見えているか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("Cannot insert {child:?} into its own subtree at {parent:?}")]
    Cycle { parent: NodeId, child: NodeId },
}

/// 要素
#[derive(Debug, Clone)]
struct Element {
    /// タグ名
    tag: String,
    /// 属性（挿入順）
    attributes: Vec<(String, String)>,
    /// テキスト内容
    text: String,
    /// 子要素
    children: Vec<NodeId>,
    /// 親要素（未接続なら `None`）
    parent: Option<NodeId>,
    /// テキストが書き換えられた回数
    revision: u64,
}

impl Element {
    /// 属性もテキストもない要素
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            revision: 0,
        }
    }

    /// 属性値
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// ロックで保護されるツリー本体
#[derive(Debug)]
struct Tree {
    /// 要素のアリーナ（`NodeId` はインデックス）
    elements: Vec<Element>,
    /// ルート要素
    root: NodeId,
    /// ミューテーション購読者
    observers: Vec<mpsc::UnboundedSender<MutationRecord>>,
}

impl Tree {
    /// 要素を参照
    fn get(&self, node: NodeId) -> Option<&Element> {
        self.elements.get(node.0)
    }

    /// 要素を可変参照。未知の要素ならエラー
    fn element_mut(&mut self, node: NodeId) -> Result<&mut Element, DocumentError> {
        self.elements.get_mut(node.0).ok_or(DocumentError::UnknownNode(node))
    }

    /// 未接続の要素を追加
    fn push(&mut self, tag: &str) -> NodeId {
        self.elements.push(Element::new(tag));
        NodeId(self.elements.len() - 1)
    }

    /// 要素が存在しなければエラー
    fn ensure(&self, node: NodeId) -> Result<(), DocumentError> {
        self.get(node).map(|_| ()).ok_or(DocumentError::UnknownNode(node))
    }

    /// `node` 以下を行きがけ順で列挙（`node` 自身を含む）
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(element) = self.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(element.children.iter().rev().copied());
        }
        order
    }

    /// `ancestor` から親をたどって `node` に到達するか
    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).and_then(|e| e.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// ルートから到達できるか
    fn is_attached(&self, node: NodeId) -> bool {
        self.get(node).is_some() && self.is_ancestor_or_self(self.root, node)
    }

    /// `node` 自身が `selector` に一致するか
    fn matches(&self, node: NodeId, selector: &ElementSelector) -> bool {
        self.get(node).is_some_and(|e| {
            selector.matches(&e.tag, e.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        })
    }

    /// 親から切り離し、元の親を返す
    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.elements.get_mut(child.0)?.parent.take()?;
        if let Some(parent_element) = self.elements.get_mut(parent.0) {
            parent_element.children.retain(|c| *c != child);
        }
        Some(parent)
    }

    /// 切り離して、元の親の変化を通知
    fn remove(&mut self, child: NodeId) -> Result<(), DocumentError> {
        self.ensure(child)?;
        if let Some(parent) = self.detach(child) {
            self.notify(&MutationRecord { target: parent, added: vec![], removed: vec![child] });
        }
        Ok(())
    }

    /// `child` を `parent` の末尾へ移し、切り離しと挿入をそれぞれ通知
    fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        self.ensure(parent)?;
        self.ensure(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(DocumentError::Cycle { parent, child });
        }

        self.remove(child)?;
        self.element_mut(child)?.parent = Some(parent);
        self.element_mut(parent)?.children.push(child);
        self.notify(&MutationRecord { target: parent, added: vec![child], removed: vec![] });
        Ok(())
    }

    /// 購読者へ配信し、閉じた購読者を取り除く
    fn notify(&mut self, record: &MutationRecord) {
        self.observers.retain(|observer| observer.send(record.clone()).is_ok());
    }
}

/// ホスト文書へのハンドル
///
/// Clone しても同じ文書を指す。
#[derive(Clone)]
pub struct Document {
    /// ツリー本体
    tree: Arc<Mutex<Tree>>,
    /// 読み込み段階
    ready_state: Arc<watch::Sender<ReadyState>>,
    /// 表示状態
    visibility: Arc<watch::Sender<Visibility>>,
}

impl Document {
    /// `root_tag` をルートに持つ空の文書を作成（`Loading`、`Visible`）
    #[must_use]
    pub fn new(root_tag: &str) -> Self {
        let tree = Tree { elements: vec![Element::new(root_tag)], root: NodeId(0), observers: Vec::new() };
        Self {
            tree: Arc::new(Mutex::new(tree)),
            ready_state: Arc::new(watch::Sender::new(ReadyState::Loading)),
            visibility: Arc::new(watch::Sender::new(Visibility::Visible)),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.tree.lock().root
    }

    /// 未接続の要素を作成
    #[must_use]
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.lock().push(tag)
    }

    /// 属性を設定（既存なら上書き）
    ///
    /// # Errors
    /// 未知の要素
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        self.tree.lock().element_mut(node).map(|element| {
            if let Some(slot) = element.attributes.iter_mut().find(|(k, _)| k == name) {
                slot.1 = value.to_string();
            } else {
                element.attributes.push((name.to_string(), value.to_string()));
            }
        })
    }

    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree.lock().get(node)?.attribute(name).map(str::to_string)
    }

    #[must_use]
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.tree.lock().get(node).map(|e| e.attributes.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.tree.lock().get(node).map(|e| e.tag.clone())
    }

    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<String> {
        self.tree.lock().get(node).map(|e| e.text.clone())
    }

    /// テキスト内容を丸ごと置き換える
    ///
    /// 構造の変化ではないため、ミューテーション購読者には通知しない。
    ///
    /// # Errors
    /// 未知の要素
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        self.tree.lock().element_mut(node).map(|element| {
            element.text = text.to_string();
            element.revision += 1;
        })
    }

    /// テキストが書き換えられた回数
    #[must_use]
    pub fn revision(&self, node: NodeId) -> Option<u64> {
        self.tree.lock().get(node).map(|e| e.revision)
    }

    /// `child` を `parent` の末尾に挿入する（既に接続済みなら移動）
    ///
    /// # Errors
    /// 未知の要素、または `child` の部分木への挿入
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        self.tree.lock().append(parent, child)
    }

    /// `child` を親から切り離す
    ///
    /// # Errors
    /// 未知の要素
    pub fn remove(&self, child: NodeId) -> Result<(), DocumentError> {
        self.tree.lock().remove(child)
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.lock().get(node).map(|e| e.children.clone()).unwrap_or_default()
    }

    /// `node` の子孫を行きがけ順で返す（`node` 自身は含まない）
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.lock().subtree(node).into_iter().skip(1).collect()
    }

    /// ルートから到達できるか
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.tree.lock().is_attached(node)
    }

    /// `node` 自身が `selector` に一致するか
    #[must_use]
    pub fn matches(&self, node: NodeId, selector: &ElementSelector) -> bool {
        self.tree.lock().matches(node, selector)
    }

    /// `node` 以下（自身を含む）で `selector` に一致する要素を文書順に返す
    #[must_use]
    pub fn query_within(&self, node: NodeId, selector: &ElementSelector) -> Vec<NodeId> {
        let tree = self.tree.lock();
        tree.subtree(node).into_iter().filter(|id| tree.matches(*id, selector)).collect()
    }

    /// 文書全体で `selector` に一致する要素を文書順に返す
    #[must_use]
    pub fn query_all(&self, selector: &ElementSelector) -> Vec<NodeId> {
        self.query_within(self.root(), selector)
    }

    /// 識別属性の値で要素を探す
    #[must_use]
    pub fn find_by_key(&self, selector: &ElementSelector, key: &str) -> Option<NodeId> {
        self.query_all(selector)
            .into_iter()
            .find(|id| self.attribute(*id, selector.attribute()).as_deref() == Some(key))
    }

    /// 構造変化の購読を開始
    #[must_use]
    pub fn observe(&self) -> MutationObserver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.tree.lock().observers.push(sender);
        MutationObserver::new(receiver)
    }

    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.ready_state.borrow()
    }

    /// 読み込み段階を進める（後戻りはしない）
    pub fn set_ready_state(&self, state: ReadyState) {
        let advanced = self.ready_state.send_if_modified(|current| {
            if state > *current {
                *current = state;
                true
            } else {
                false
            }
        });
        if advanced {
            tracing::debug!(?state, "Document ready state advanced");
        }
    }

    #[must_use]
    pub fn subscribe_ready_state(&self) -> watch::Receiver<ReadyState> {
        self.ready_state.subscribe()
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let previous = self.visibility.send_replace(visibility);
        if previous != visibility {
            tracing::debug!(?visibility, "Document visibility changed");
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (elements, observers) = {
            let tree = self.tree.lock();
            (tree.elements.len(), tree.observers.len())
        };
        f.debug_struct("Document")
            .field("elements", &elements)
            .field("observers", &observers)
            .field("ready_state", &*self.ready_state.borrow())
            .field("visibility", &*self.visibility.borrow())
            .finish()
    }
}
