mod selector;

pub use selector::Selector;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Arena index into a [`Document`]. Stable for the lifetime of the node,
/// including after removal (lookups on a removed node return `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    element_id: Option<String>,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
    value: Option<String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn element_id(&self) -> Option<&str> {
        self.element_id.as_deref()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|existing| existing == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Declarative description of a node subtree. Used both for JSON snapshots of
/// host documents and for assembling new subtrees before insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// One entry in the document's mutation journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// A subtree was inserted; the id is the subtree root.
    Inserted(NodeId),
    /// A subtree was removed; the id is the former subtree root.
    Removed(NodeId),
}

/// An owned tree standing in for the live host page.
///
/// Mutations accumulate in a journal drained by the observer
/// (`take_mutations`), and form-value writes that dispatch a change
/// notification accumulate in a separate journal the host (or a test) can
/// inspect.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    mutations: Vec<Mutation>,
    change_events: Vec<NodeId>,
    focused: Option<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        let root = Node {
            tag: "body".to_string(),
            element_id: None,
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            value: None,
            text: String::new(),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            mutations: Vec::new(),
            change_events: Vec::new(),
            focused: None,
        }
    }

    /// Builds a document whose body holds the given subtrees, as loaded from
    /// a JSON snapshot. The initial build does not count as a mutation.
    pub fn from_snapshot(specs: &[NodeSpec]) -> Self {
        let mut doc = Self::new();
        let root = doc.root;
        for spec in specs {
            doc.insert(root, spec.clone());
        }
        doc.mutations.clear();
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Inserts a subtree under `parent` and records one `Inserted` mutation
    /// for the subtree root.
    pub fn insert(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = self.insert_silent(parent, spec);
        self.mutations.push(Mutation::Inserted(id));
        id
    }

    fn insert_silent(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            tag: spec.tag,
            element_id: spec.id,
            classes: spec.classes,
            attrs: spec.attrs,
            value: spec.value,
            text: spec.text,
            parent: Some(parent),
            children: Vec::new(),
        }));
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(id);
        }
        for child in spec.children {
            self.insert_silent(id, child);
        }
        id
    }

    /// Detaches `id` and drops its whole subtree. Removing an already-removed
    /// node is a no-op.
    pub fn remove(&mut self, id: NodeId) {
        if self.get(id).is_none() || id == self.root {
            return;
        }
        if let Some(parent) = self.get(id).and_then(Node::parent) {
            if let Some(parent_node) = self.get_mut(parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
        self.mutations.push(Mutation::Removed(id));
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.value = Some(value.into());
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.text = text.into();
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.attrs.insert(name.into(), value.into());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.get_mut(id) {
            node.attrs.remove(name);
        }
    }

    pub fn set_classes(&mut self, id: NodeId, classes: Vec<String>) {
        if let Some(node) = self.get_mut(id) {
            node.classes = classes;
        }
    }

    /// Removes every child of `id` without touching the node itself.
    pub fn clear_children(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove(child);
        }
    }

    pub fn focus(&mut self, id: NodeId) {
        if self.get(id).is_some() {
            self.focused = Some(id);
        }
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused.filter(|id| self.get(*id).is_some())
    }

    /// Records a change notification on `id`, standing in for dispatching a
    /// bubbling `change` event to the host's own listeners.
    pub fn dispatch_change(&mut self, id: NodeId) {
        if self.get(id).is_some() {
            self.change_events.push(id);
        }
    }

    pub fn take_change_events(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.change_events)
    }

    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    /// Pre-order walk of the live tree.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Pre-order walk of the subtree rooted at `scope` (inclusive).
    pub fn walk_from(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.get(node_id).and_then(Node::parent);
        }
        false
    }

    pub fn find_by_element_id(&self, element_id: &str) -> Option<NodeId> {
        self.walk().into_iter().find(|id| {
            self.get(*id)
                .and_then(Node::element_id)
                .is_some_and(|existing| existing == element_id)
        })
    }

    pub fn query(&self, selector: &Selector) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    pub fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    pub fn query_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.walk_from(scope)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
