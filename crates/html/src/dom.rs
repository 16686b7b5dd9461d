//! Live document arena.
//!
//! The rendered page is a mutable tree whose nodes keep their identity across
//! edits: a [`NodeKey`] stays valid for as long as the node is alive, and keys
//! are never reused. Detached nodes stay alive until [`Document::remove`] or
//! [`Document::collect_detached`] frees them.
//!
//! Invariants:
//! - Every attached node appears exactly once in its parent's child list and
//!   its `parent` points back at that parent.
//! - No node is its own ancestor.
//! - The focused node, if any, is a live element.
//! - `mutation_count` only advances on writes that changed the tree.
use crate::selector::{ElementRef, SelectorList};
use crate::serialize::{write_end_tag, write_start_tag, write_text};
use crate::types::{Attribute, Node};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u32);

impl NodeKey {
    pub const ROOT: NodeKey = NodeKey(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    MissingNode(NodeKey),
    WrongNodeKind(NodeKey),
    CycleDetected { parent: NodeKey, child: NodeKey },
    InvalidParent(NodeKey),
    InvalidSibling { parent: NodeKey, before: NodeKey },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::MissingNode(key) => write!(f, "node {key} does not exist"),
            DocumentError::WrongNodeKind(key) => write!(f, "node {key} has the wrong kind"),
            DocumentError::CycleDetected { parent, child } => {
                write!(f, "inserting {child} under {parent} would create a cycle")
            }
            DocumentError::InvalidParent(key) => write!(f, "node {key} cannot have children"),
            DocumentError::InvalidSibling { parent, before } => {
                write!(f, "node {before} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for DocumentError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document { doctype: Option<String> },
    Element { name: String, attributes: Vec<Attribute> },
    Text { text: String },
    Comment { text: String },
}

/// User-editable state that lives beside the attributes.
///
/// `None` means the control still shows its markup default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ControlState {
    value: Option<String>,
    checked: Option<bool>,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    control: ControlState,
}

impl NodeRecord {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            control: ControlState::default(),
        }
    }

    fn allows_children(&self) -> bool {
        matches!(self.kind, NodeKind::Document { .. } | NodeKind::Element { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<NodeRecord>>,
    focused: Option<NodeKey>,
    mutations: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(NodeRecord::new(NodeKind::Document { doctype: None }))],
            focused: None,
            mutations: 0,
        }
    }

    /// Build a live document from a parsed tree. A non-document node becomes
    /// the only child of a fresh root.
    pub fn from_node(node: &Node) -> Self {
        let mut doc = Document::new();
        match node {
            Node::Document { doctype, children } => {
                if let Some(record) = doc.nodes[0].as_mut() {
                    record.kind = NodeKind::Document {
                        doctype: doctype.clone(),
                    };
                }
                for child in children {
                    let key = doc.import_subtree(child);
                    doc.link_last(NodeKey::ROOT, key);
                }
            }
            other => {
                let key = doc.import_subtree(other);
                doc.link_last(NodeKey::ROOT, key);
            }
        }
        doc.mutations = 0;
        doc
    }

    pub fn parse(html: &str) -> Self {
        Self::from_node(&crate::parse_document(html))
    }

    pub fn root(&self) -> NodeKey {
        NodeKey::ROOT
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn record(&self, key: NodeKey) -> Result<&NodeRecord, DocumentError> {
        self.nodes
            .get(key.index())
            .and_then(Option::as_ref)
            .ok_or(DocumentError::MissingNode(key))
    }

    fn record_mut(&mut self, key: NodeKey) -> Result<&mut NodeRecord, DocumentError> {
        self.nodes
            .get_mut(key.index())
            .and_then(Option::as_mut)
            .ok_or(DocumentError::MissingNode(key))
    }

    pub fn exists(&self, key: NodeKey) -> bool {
        self.record(key).is_ok()
    }

    pub fn kind(&self, key: NodeKey) -> Option<&NodeKind> {
        self.record(key).ok().map(|r| &r.kind)
    }

    pub fn doctype(&self) -> Option<&str> {
        match self.kind(NodeKey::ROOT) {
            Some(NodeKind::Document { doctype }) => doctype.as_deref(),
            _ => None,
        }
    }

    pub fn is_element(&self, key: NodeKey) -> bool {
        matches!(self.kind(key), Some(NodeKind::Element { .. }))
    }

    pub fn name(&self, key: NodeKey) -> Option<&str> {
        match self.kind(key) {
            Some(NodeKind::Element { name, .. }) => Some(name),
            _ => None,
        }
    }

    pub fn is_named(&self, key: NodeKey, want: &str) -> bool {
        self.name(key).is_some_and(|n| n.eq_ignore_ascii_case(want))
    }

    pub fn attributes(&self, key: NodeKey) -> &[Attribute] {
        match self.kind(key) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    /// Attribute value; valueless attributes read as `""`.
    pub fn attr(&self, key: NodeKey, name: &str) -> Option<&str> {
        self.attributes(key)
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, key: NodeKey, name: &str) -> bool {
        self.attr(key, name).is_some()
    }

    /// Non-empty `id` attribute.
    pub fn id_of(&self, key: NodeKey) -> Option<&str> {
        self.attr(key, "id").map(str::trim).filter(|id| !id.is_empty())
    }

    /// Character data of a text or comment node.
    pub fn text(&self, key: NodeKey) -> Option<&str> {
        match self.kind(key) {
            Some(NodeKind::Text { text } | NodeKind::Comment { text }) => Some(text),
            _ => None,
        }
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        for node in self.descendants(key) {
            if let Some(NodeKind::Text { text }) = self.kind(node) {
                out.push_str(text);
            }
        }
        out
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.record(key).ok().and_then(|r| r.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.record(key).map(|r| r.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.children(key).first().copied()
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|k| *k == key)?;
        siblings.get(pos + 1).copied()
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|k| *k == key)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Inclusive: a node contains itself.
    pub fn contains(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_connected(&self, key: NodeKey) -> bool {
        self.exists(key) && self.contains(NodeKey::ROOT, key)
    }

    /// Pre-order walk of `key` and everything below it.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        if !self.exists(key) {
            return out;
        }
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn element_children(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.children(key)
            .iter()
            .copied()
            .filter(|k| self.is_element(*k))
    }

    /// First element with this id in document order.
    pub fn find_by_id(&self, id: &str) -> Option<NodeKey> {
        self.find_by_id_within(NodeKey::ROOT, id)
    }

    pub fn find_by_id_within(&self, scope: NodeKey, id: &str) -> Option<NodeKey> {
        self.descendants(scope)
            .into_iter()
            .find(|k| self.is_element(*k) && self.id_of(*k) == Some(id))
    }

    /// First element named `name` at or below `scope`.
    pub fn element_by_name(&self, scope: NodeKey, name: &str) -> Option<NodeKey> {
        self.descendants(scope)
            .into_iter()
            .find(|k| self.is_named(*k, name))
    }

    pub fn query_all(&self, selectors: &SelectorList) -> Vec<NodeKey> {
        self.query_all_within(NodeKey::ROOT, selectors)
    }

    pub fn query_all_within(&self, scope: NodeKey, selectors: &SelectorList) -> Vec<NodeKey> {
        self.descendants(scope)
            .into_iter()
            .filter(|k| *k != scope && self.is_element(*k))
            .filter(|k| selectors.matches(self.element(*k)))
            .collect()
    }

    pub fn element(&self, key: NodeKey) -> LiveElement<'_> {
        LiveElement { doc: self, key }
    }

    pub fn document_element(&self) -> Option<NodeKey> {
        self.element_children(NodeKey::ROOT)
            .find(|k| self.is_named(*k, "html"))
    }

    pub fn head(&self) -> Option<NodeKey> {
        let html = self.document_element()?;
        self.element_children(html).find(|k| self.is_named(*k, "head"))
    }

    pub fn body(&self) -> Option<NodeKey> {
        let html = self.document_element()?;
        self.element_children(html).find(|k| self.is_named(*k, "body"))
    }

    pub fn title(&self) -> Option<String> {
        let head = self.head()?;
        let title = self.element_by_name(head, "title")?;
        Some(self.text_content(title).trim().to_string())
    }

    // Construction

    fn alloc(&mut self, kind: NodeKind) -> NodeKey {
        let key = NodeKey(self.nodes.len() as u32);
        self.nodes.push(Some(NodeRecord::new(kind)));
        key
    }

    fn shallow_kind(node: &Node) -> NodeKind {
        match node {
            Node::Document { .. } => NodeKind::Comment {
                text: String::new(),
            },
            Node::Element {
                name, attributes, ..
            } => NodeKind::Element {
                name: name.clone(),
                attributes: attributes.clone(),
            },
            Node::Text { text } => NodeKind::Text { text: text.clone() },
            Node::Comment { text } => NodeKind::Comment { text: text.clone() },
        }
    }

    fn link_last(&mut self, parent: NodeKey, child: NodeKey) {
        if let Some(Some(record)) = self.nodes.get_mut(child.index()) {
            record.parent = Some(parent);
        }
        if let Some(Some(record)) = self.nodes.get_mut(parent.index()) {
            record.children.push(child);
        }
    }

    fn import_subtree(&mut self, node: &Node) -> NodeKey {
        let key = self.alloc(Self::shallow_kind(node));
        for child in node.children() {
            let child_key = self.import_subtree(child);
            self.link_last(key, child_key);
        }
        key
    }

    /// Deep copy of a value-tree node into this document, detached.
    pub fn import(&mut self, node: &Node) -> Result<NodeKey, DocumentError> {
        if matches!(node, Node::Document { .. }) {
            return Err(DocumentError::WrongNodeKind(NodeKey::ROOT));
        }
        Ok(self.import_subtree(node))
    }

    /// Copy of `node` without its children, detached.
    pub fn import_shallow(&mut self, node: &Node) -> Result<NodeKey, DocumentError> {
        if matches!(node, Node::Document { .. }) {
            return Err(DocumentError::WrongNodeKind(NodeKey::ROOT));
        }
        Ok(self.alloc(Self::shallow_kind(node)))
    }

    // Tree mutation

    fn check_insert(&self, parent: NodeKey, child: NodeKey) -> Result<(), DocumentError> {
        if !self.record(parent)?.allows_children() {
            return Err(DocumentError::InvalidParent(parent));
        }
        self.record(child)?;
        if child == NodeKey::ROOT {
            return Err(DocumentError::InvalidParent(child));
        }
        if self.contains(child, parent) {
            return Err(DocumentError::CycleDetected { parent, child });
        }
        Ok(())
    }

    fn unlink(&mut self, key: NodeKey) -> Result<bool, DocumentError> {
        let Some(parent) = self.record_mut(key)?.parent.take() else {
            return Ok(false);
        };
        self.record_mut(parent)?.children.retain(|k| *k != key);
        Ok(true)
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), DocumentError> {
        self.insert_before(parent, child, None)
    }

    /// Move `child` into `parent` before `before`, or to the end when `before` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        before: Option<NodeKey>,
    ) -> Result<(), DocumentError> {
        self.check_insert(parent, child)?;
        if before == Some(child) {
            return Ok(());
        }
        if let Some(before) = before {
            if self.parent(before) != Some(parent) {
                return Err(DocumentError::InvalidSibling { parent, before });
            }
        }
        // Already in place.
        if self.parent(child) == Some(parent) {
            let siblings = self.children(parent);
            let pos = siblings.iter().position(|k| *k == child);
            let in_place = match (pos, before) {
                (Some(p), Some(b)) => siblings.get(p + 1) == Some(&b),
                (Some(p), None) => p + 1 == siblings.len(),
                (None, _) => false,
            };
            if in_place {
                return Ok(());
            }
        }

        self.unlink(child)?;
        let record = self.record_mut(parent)?;
        let pos = match before {
            Some(b) => record
                .children
                .iter()
                .position(|k| *k == b)
                .ok_or(DocumentError::InvalidSibling { parent, before: b })?,
            None => record.children.len(),
        };
        record.children.insert(pos, child);
        self.record_mut(child)?.parent = Some(parent);
        self.mutations += 1;
        Ok(())
    }

    /// Take `key` out of the tree without freeing it.
    pub fn detach(&mut self, key: NodeKey) -> Result<(), DocumentError> {
        if self.unlink(key)? {
            self.mutations += 1;
        }
        Ok(())
    }

    /// Detach and free `key` with its whole subtree.
    pub fn remove(&mut self, key: NodeKey) -> Result<(), DocumentError> {
        if key == NodeKey::ROOT {
            return Err(DocumentError::InvalidParent(key));
        }
        self.detach(key)?;
        if self.focused.is_some_and(|f| self.contains(key, f)) {
            self.focused = None;
        }
        for node in self.descendants(key) {
            if let Some(slot) = self.nodes.get_mut(node.index()) {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Free every node that is no longer reachable from the root.
    pub fn collect_detached(&mut self) -> usize {
        let mut live = vec![false; self.nodes.len()];
        for key in self.descendants(NodeKey::ROOT) {
            live[key.index()] = true;
        }
        let mut freed = 0;
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_some() && !live[index] {
                *slot = None;
                freed += 1;
            }
        }
        if self.focused.is_some_and(|f| !live[f.index()]) {
            self.focused = None;
        }
        freed
    }

    pub fn remove_children(&mut self, parent: NodeKey) -> Result<(), DocumentError> {
        for child in self.children(parent).to_vec() {
            self.remove(child)?;
        }
        Ok(())
    }

    /// Returns whether anything changed.
    pub fn set_attribute(
        &mut self,
        key: NodeKey,
        name: &str,
        value: Option<&str>,
    ) -> Result<bool, DocumentError> {
        let record = self.record_mut(key)?;
        let NodeKind::Element { attributes, .. } = &mut record.kind else {
            return Err(DocumentError::WrongNodeKind(key));
        };
        match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, existing)) if existing.as_deref() == value => return Ok(false),
            Some((_, existing)) => *existing = value.map(str::to_string),
            None => attributes.push((name.to_ascii_lowercase(), value.map(str::to_string))),
        }
        self.mutations += 1;
        Ok(true)
    }

    /// Returns whether the attribute was present.
    pub fn remove_attribute(&mut self, key: NodeKey, name: &str) -> Result<bool, DocumentError> {
        let record = self.record_mut(key)?;
        let NodeKind::Element { attributes, .. } = &mut record.kind else {
            return Err(DocumentError::WrongNodeKind(key));
        };
        let before = attributes.len();
        attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if attributes.len() == before {
            return Ok(false);
        }
        self.mutations += 1;
        Ok(true)
    }

    /// Replace the character data of a text or comment node.
    pub fn set_text(&mut self, key: NodeKey, value: &str) -> Result<bool, DocumentError> {
        let record = self.record_mut(key)?;
        let (NodeKind::Text { text } | NodeKind::Comment { text }) = &mut record.kind else {
            return Err(DocumentError::WrongNodeKind(key));
        };
        if text == value {
            return Ok(false);
        }
        text.clear();
        text.push_str(value);
        self.mutations += 1;
        Ok(true)
    }

    // Form control state

    /// Value the control currently shows.
    pub fn current_value(&self, key: NodeKey) -> Option<String> {
        let record = self.record(key).ok()?;
        if let Some(value) = &record.control.value {
            return Some(value.clone());
        }
        match self.name(key)? {
            "textarea" => Some(self.text_content(key)),
            "select" => self
                .descendants(key)
                .into_iter()
                .filter(|k| self.is_named(*k, "option"))
                .find(|k| self.has_attr(*k, "selected"))
                .or_else(|| {
                    self.descendants(key)
                        .into_iter()
                        .find(|k| self.is_named(*k, "option"))
                })
                .map(|option| {
                    self.attr(option, "value")
                        .map(str::to_string)
                        .unwrap_or_else(|| self.text_content(option))
                }),
            _ => Some(self.attr(key, "value").unwrap_or("").to_string()),
        }
    }

    /// Set the live value, as a user edit would. Returns whether it changed.
    pub fn set_value(&mut self, key: NodeKey, value: &str) -> Result<bool, DocumentError> {
        if !self.is_element(key) {
            return Err(DocumentError::WrongNodeKind(key));
        }
        if self.current_value(key).as_deref() == Some(value) {
            return Ok(false);
        }
        self.record_mut(key)?.control.value = Some(value.to_string());
        self.mutations += 1;
        Ok(true)
    }

    pub fn checked(&self, key: NodeKey) -> bool {
        match self.record(key) {
            Ok(record) => record
                .control
                .checked
                .unwrap_or_else(|| self.has_attr(key, "checked")),
            Err(_) => false,
        }
    }

    pub fn set_checked(&mut self, key: NodeKey, checked: bool) -> Result<bool, DocumentError> {
        if !self.is_element(key) {
            return Err(DocumentError::WrongNodeKind(key));
        }
        if self.checked(key) == checked {
            return Ok(false);
        }
        self.record_mut(key)?.control.checked = Some(checked);
        self.mutations += 1;
        Ok(true)
    }

    pub fn has_live_value(&self, key: NodeKey) -> bool {
        self.record(key).is_ok_and(|r| r.control.value.is_some())
    }

    pub fn focused(&self) -> Option<NodeKey> {
        self.focused
    }

    pub fn focus(&mut self, key: NodeKey) -> Result<(), DocumentError> {
        if !self.is_element(key) {
            return Err(DocumentError::WrongNodeKind(key));
        }
        self.focused = Some(key);
        Ok(())
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    // Output

    /// Value tree of `key` from attributes alone; live control values are not included.
    pub fn materialize(&self, key: NodeKey) -> Result<Node, DocumentError> {
        self.materialize_with(key, false)
    }

    /// Value tree of `key` with live control values written back into
    /// attributes, so a later render shows what the user had entered.
    pub fn materialize_live(&self, key: NodeKey) -> Result<Node, DocumentError> {
        self.materialize_with(key, true)
    }

    fn materialize_with(&self, key: NodeKey, live: bool) -> Result<Node, DocumentError> {
        let record = self.record(key)?;
        let mut children = record
            .children
            .iter()
            .map(|child| self.materialize_with(*child, live))
            .collect::<Result<Vec<_>, _>>()?;
        if live && self.is_named(key, "textarea") {
            if let Some(value) = &record.control.value {
                children = vec![Node::text(value.clone())];
            }
        }
        Ok(match &record.kind {
            NodeKind::Document { doctype } => Node::Document {
                doctype: doctype.clone(),
                children,
            },
            NodeKind::Element { name, attributes } => {
                let mut attributes = attributes.clone();
                if live {
                    self.write_live_state(key, name, &mut attributes);
                }
                Node::Element {
                    name: name.clone(),
                    attributes,
                    children,
                }
            }
            NodeKind::Text { text } => Node::Text { text: text.clone() },
            NodeKind::Comment { text } => Node::Comment { text: text.clone() },
        })
    }

    fn write_live_state(&self, key: NodeKey, name: &str, attributes: &mut Vec<Attribute>) {
        let Ok(record) = self.record(key) else {
            return;
        };
        if let (Some(value), "input") = (&record.control.value, name) {
            set_attr(attributes, "value", Some(value.clone()));
        }
        if let Some(checked) = record.control.checked {
            if checked {
                set_attr(attributes, "checked", None);
            } else {
                attributes.retain(|(k, _)| k != "checked");
            }
        }
    }

    pub fn outer_html(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.write_html(key, None, &mut out);
        out
    }

    pub fn inner_html(&self, key: NodeKey) -> String {
        let mut out = String::new();
        let parent = self.name(key).map(str::to_string);
        for &child in self.children(key) {
            self.write_html(child, parent.as_deref(), &mut out);
        }
        out
    }

    pub fn to_html(&self) -> String {
        self.outer_html(NodeKey::ROOT)
    }

    fn write_html(&self, key: NodeKey, parent: Option<&str>, out: &mut String) {
        let Some(kind) = self.kind(key) else {
            return;
        };
        match kind {
            NodeKind::Document { doctype } => {
                if let Some(doctype) = doctype {
                    out.push_str("<!");
                    out.push_str(doctype);
                    out.push('>');
                }
                for &child in self.children(key) {
                    self.write_html(child, None, out);
                }
            }
            NodeKind::Element { name, attributes } => {
                write_start_tag(name, attributes, out);
                for &child in self.children(key) {
                    self.write_html(child, Some(name), out);
                }
                write_end_tag(name, out);
            }
            NodeKind::Text { text } => write_text(parent, text, out),
            NodeKind::Comment { text } => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
    }
}

fn set_attr(attributes: &mut Vec<Attribute>, key: &str, value: Option<String>) {
    match attributes.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => attributes.push((key.to_string(), value)),
    }
}

#[derive(Clone, Copy)]
pub struct LiveElement<'a> {
    doc: &'a Document,
    key: NodeKey,
}

impl<'a> ElementRef for LiveElement<'a> {
    fn tag_name(&self) -> Option<&str> {
        self.doc.name(self.key)
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.doc.attr(self.key, key)
    }

    fn parent_element(&self) -> Option<Self> {
        let parent = self.doc.parent(self.key)?;
        self.doc.is_element(parent).then_some(LiveElement {
            doc: self.doc,
            key: parent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        Document::parse(html)
    }

    #[test]
    fn parses_into_html_head_body() {
        let d = doc("<title>T</title><p id=a>x</p>");
        assert!(d.document_element().is_some());
        assert_eq!(d.title().as_deref(), Some("T"));
        let body = d.body().unwrap();
        let p = d.find_by_id("a").unwrap();
        assert_eq!(d.parent(p), Some(body));
        assert_eq!(d.mutation_count(), 0);
    }

    #[test]
    fn insert_before_moves_and_keeps_identity() {
        let mut d = doc("<ul id=l><li id=a></li><li id=b></li><li id=c></li></ul>");
        let list = d.find_by_id("l").unwrap();
        let (a, c) = (d.find_by_id("a").unwrap(), d.find_by_id("c").unwrap());
        d.insert_before(list, c, Some(a)).unwrap();
        let ids: Vec<_> = d.children(list).iter().map(|k| d.id_of(*k).unwrap()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(d.find_by_id("c"), Some(c));
        assert_eq!(d.mutation_count(), 1);
    }

    #[test]
    fn insert_in_place_is_not_a_mutation() {
        let mut d = doc("<ul id=l><li id=a></li><li id=b></li></ul>");
        let list = d.find_by_id("l").unwrap();
        let (a, b) = (d.find_by_id("a").unwrap(), d.find_by_id("b").unwrap());
        d.insert_before(list, a, Some(b)).unwrap();
        d.append_child(list, b).unwrap();
        assert_eq!(d.mutation_count(), 0);
    }

    #[test]
    fn rejects_cycles_and_bad_parents() {
        let mut d = doc("<div id=o><div id=i></div></div>");
        let (outer, inner) = (d.find_by_id("o").unwrap(), d.find_by_id("i").unwrap());
        assert_eq!(
            d.append_child(inner, outer),
            Err(DocumentError::CycleDetected {
                parent: inner,
                child: outer
            })
        );
        let text = d.import(&Node::text("t")).unwrap();
        assert_eq!(
            d.append_child(text, inner),
            Err(DocumentError::InvalidParent(text))
        );
    }

    #[test]
    fn remove_frees_subtree_and_drops_focus() {
        let mut d = doc("<form id=f><input id=q></form>");
        let (form, input) = (d.find_by_id("f").unwrap(), d.find_by_id("q").unwrap());
        d.focus(input).unwrap();
        d.remove(form).unwrap();
        assert!(!d.exists(input));
        assert_eq!(d.focused(), None);
        assert_eq!(
            d.set_attribute(input, "x", None),
            Err(DocumentError::MissingNode(input))
        );
    }

    #[test]
    fn attribute_writes_count_only_changes() {
        let mut d = doc("<p id=a class=x></p>");
        let p = d.find_by_id("a").unwrap();
        assert!(!d.set_attribute(p, "class", Some("x")).unwrap());
        assert!(d.set_attribute(p, "class", Some("y")).unwrap());
        assert!(d.remove_attribute(p, "class").unwrap());
        assert!(!d.remove_attribute(p, "class").unwrap());
        assert_eq!(d.mutation_count(), 2);
    }

    #[test]
    fn live_value_shadows_attribute_until_materialized_live() {
        let mut d = doc("<input id=q value=start>");
        let q = d.find_by_id("q").unwrap();
        assert_eq!(d.current_value(q).as_deref(), Some("start"));
        d.set_value(q, "typed").unwrap();
        assert_eq!(d.current_value(q).as_deref(), Some("typed"));
        assert_eq!(d.materialize(q).unwrap().attr("value"), Some("start"));
        assert_eq!(d.materialize_live(q).unwrap().attr("value"), Some("typed"));
    }

    #[test]
    fn query_all_in_document_order() {
        let d = doc("<div class=m id=1></div><section><p class=m id=2></p></section>");
        let list = SelectorList::parse(".m").unwrap();
        let ids: Vec<_> = d
            .query_all(&list)
            .into_iter()
            .map(|k| d.id_of(k).unwrap().to_string())
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn collect_detached_frees_orphans() {
        let mut d = doc("<p id=a></p><p id=b></p>");
        let a = d.find_by_id("a").unwrap();
        d.detach(a).unwrap();
        assert!(d.exists(a));
        assert_eq!(d.collect_detached(), 1);
        assert!(!d.exists(a));
    }

    #[test]
    fn outer_html_round_trips_markup() {
        let d = doc("<!DOCTYPE html><html><head></head><body><p class=\"a\">x &amp; y</p></body></html>");
        assert_eq!(
            d.to_html(),
            "<!DOCTYPE html><html><head></head><body><p class=\"a\">x &amp; y</p></body></html>"
        );
    }
}
