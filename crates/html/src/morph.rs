//! In-place reconciliation of a live [`Document`] subtree against a target value tree.
//!
//! The pass walks target children left to right with a cursor into the live
//! children, pairing nodes by persistent id first and by kind and tag second,
//! and only creates or removes nodes when no pairing exists.
//!
//! Invariants:
//! - Reconciling a subtree against an identical tree performs no mutations.
//! - An id is persistent when it occurs exactly once in the live scope and
//!   exactly once in the target, on elements with the same tag. A persistent
//!   element is moved, never recreated, and survives the pass.
//! - Duplicate ids on either side void persistence for that id.
//! - Nodes parked during a pass are freed when the pass ends unless a later
//!   step re-attached them.
use crate::dom::{Document, DocumentError, NodeKey, NodeKind};
use crate::serialize::to_html;
use crate::types::Node;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

pub const PERMANENT_ATTR: &str = "data-turbo-permanent";
pub const FORCE_VALUE_ATTR: &str = "data-turbo-force-value";
pub const HEAD_PRESERVE_ATTR: &str = "im-preserve";
pub const HEAD_RE_APPEND_ATTR: &str = "im-re-append";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphOptions {
    /// Leave the focused control's value alone unless the target forces it.
    pub ignore_active_value: bool,
    /// Matched elements flagged permanent keep their content untouched.
    pub preserve_permanent: bool,
    /// `head` elements are merged by serialized equality instead of morphed.
    pub merge_head: bool,
}

impl Default for MorphOptions {
    fn default() -> Self {
        Self {
            ignore_active_value: true,
            preserve_permanent: true,
            merge_head: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadMerge {
    pub added: usize,
    pub removed: usize,
    pub re_appended: usize,
    /// Stylesheet `href`s and script `src`s appended by the merge.
    pub awaiting: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphReport {
    pub matched: usize,
    pub created: usize,
    pub removed: usize,
    pub relocated: usize,
    pub head: HeadMerge,
}

/// Morph the children of `live_parent` into the children of `target_parent`.
pub fn morph_children(
    doc: &mut Document,
    live_parent: NodeKey,
    target_parent: &Node,
    options: &MorphOptions,
) -> Result<MorphReport, DocumentError> {
    let mut ctx = MorphContext::new(doc, live_parent, std::slice::from_ref(target_parent), options);
    let start = doc.first_child(live_parent);
    ctx.morph_range(doc, live_parent, target_parent.children(), start, None)?;
    ctx.finish(doc)
}

/// Morph `live` itself into `target`. When the two cannot be paired (different
/// kind or tag) the live node is replaced.
pub fn morph_element(
    doc: &mut Document,
    live: NodeKey,
    target: &Node,
    options: &MorphOptions,
) -> Result<MorphReport, DocumentError> {
    morph_outer(doc, live, std::slice::from_ref(target), options)
}

/// Morph `live` into the node list `targets`, bounded by `live`'s next sibling.
pub fn morph_outer(
    doc: &mut Document,
    live: NodeKey,
    targets: &[Node],
    options: &MorphOptions,
) -> Result<MorphReport, DocumentError> {
    let parent = doc.parent(live).ok_or(DocumentError::InvalidParent(live))?;
    let end = doc.next_sibling(live);
    let mut ctx = MorphContext::new(doc, live, targets, options);
    ctx.morph_range(doc, parent, targets, Some(live), end)?;
    ctx.finish(doc)
}

/// Merge head children by serialized equality.
pub fn merge_head(
    doc: &mut Document,
    live_head: NodeKey,
    target_head: &Node,
) -> Result<HeadMerge, DocumentError> {
    let mut merge = HeadMerge::default();
    let live_children: Vec<(NodeKey, String)> = doc
        .element_children(live_head)
        .map(|k| (k, doc.outer_html(k)))
        .collect();
    let mut unmatched: Vec<NodeKey> = live_children.iter().map(|(k, _)| *k).collect();

    for target in target_head.children().iter().filter(|c| c.name().is_some()) {
        let markup = to_html(target);
        let existing = live_children
            .iter()
            .find(|(k, html)| *html == markup && unmatched.contains(k))
            .map(|(k, _)| *k);
        match existing {
            Some(live) => {
                unmatched.retain(|k| *k != live);
                if target.attr(HEAD_RE_APPEND_ATTR) == Some("true") {
                    doc.remove(live)?;
                    let fresh = doc.import(target)?;
                    doc.append_child(live_head, fresh)?;
                    merge.re_appended += 1;
                }
            }
            None => {
                let fresh = doc.import(target)?;
                doc.append_child(live_head, fresh)?;
                merge.added += 1;
                if let Some(href) = blocking_resource(target) {
                    merge.awaiting.push(href.to_string());
                }
            }
        }
    }

    for live in unmatched {
        if doc.attr(live, HEAD_PRESERVE_ATTR) == Some("true") {
            continue;
        }
        doc.remove(live)?;
        merge.removed += 1;
    }

    if merge != HeadMerge::default() {
        debug!(
            target: "html.morph",
            "head merge: +{} -{} re-appended {} awaiting {}",
            merge.added,
            merge.removed,
            merge.re_appended,
            merge.awaiting.len()
        );
    }
    Ok(merge)
}

/// External resources `merge_head` would start loading, without touching `doc`.
pub fn pending_head_resources(doc: &Document, live_head: NodeKey, target_head: &Node) -> Vec<String> {
    let mut unmatched: Vec<String> = doc
        .element_children(live_head)
        .map(|k| doc.outer_html(k))
        .collect();
    let mut pending = Vec::new();
    for target in target_head.children().iter().filter(|c| c.name().is_some()) {
        let markup = to_html(target);
        if let Some(pos) = unmatched.iter().position(|html| *html == markup) {
            unmatched.swap_remove(pos);
        } else if let Some(href) = blocking_resource(target) {
            pending.push(href.to_string());
        }
    }
    pending
}

/// Stylesheet `href` or script `src` a render should wait for once inserted.
fn blocking_resource(node: &Node) -> Option<&str> {
    if node.is_element_named("script") {
        return node.attr("src");
    }
    let stylesheet = node.is_element_named("link")
        && node.attr("rel").is_some_and(|rel| {
            rel.split_ascii_whitespace()
                .any(|r| r.eq_ignore_ascii_case("stylesheet"))
        });
    if stylesheet { node.attr("href") } else { None }
}

fn collect_target_ids<'a>(node: &'a Node, out: &mut HashMap<&'a str, (usize, &'a str)>) {
    if let (Some(id), Some(name)) = (node.id_attr(), node.name()) {
        let entry = out.entry(id).or_insert((0, name));
        entry.0 += 1;
        if entry.1 != name {
            // Same id on different tags is never persistent.
            entry.0 += 1;
        }
    }
    for child in node.children() {
        collect_target_ids(child, out);
    }
}

/// Ids unique on both sides on same-tag elements, with their live node.
fn persistent_ids(doc: &Document, scope: NodeKey, targets: &[Node]) -> HashMap<String, NodeKey> {
    let mut target_ids = HashMap::new();
    for target in targets {
        collect_target_ids(target, &mut target_ids);
    }

    let mut live_ids: HashMap<&str, (usize, NodeKey)> = HashMap::new();
    for key in doc.descendants(scope) {
        if let Some(id) = doc.id_of(key) {
            let entry = live_ids.entry(id).or_insert((0, key));
            entry.0 += 1;
        }
    }

    live_ids
        .into_iter()
        .filter_map(|(id, (count, key))| {
            let (target_count, target_name) = target_ids.get(id)?;
            (count == 1 && *target_count == 1 && doc.name(key) == Some(*target_name))
                .then(|| (id.to_string(), key))
        })
        .collect()
}

struct MorphContext<'o> {
    options: &'o MorphOptions,
    persistent: HashMap<String, NodeKey>,
    consumed: HashSet<String>,
    pantry: Vec<NodeKey>,
    report: MorphReport,
}

impl<'o> MorphContext<'o> {
    fn new(doc: &Document, scope: NodeKey, targets: &[Node], options: &'o MorphOptions) -> Self {
        let persistent = persistent_ids(doc, scope, targets);
        trace!(target: "html.morph", "{} persistent ids", persistent.len());
        Self {
            options,
            persistent,
            consumed: HashSet::new(),
            pantry: Vec::new(),
            report: MorphReport::default(),
        }
    }

    fn finish(mut self, doc: &mut Document) -> Result<MorphReport, DocumentError> {
        for parked in std::mem::take(&mut self.pantry) {
            if doc.exists(parked) && doc.parent(parked).is_none() {
                doc.remove(parked)?;
                self.report.removed += 1;
            }
        }
        trace!(
            target: "html.morph",
            "morph done: matched {} created {} relocated {} removed {}",
            self.report.matched,
            self.report.created,
            self.report.relocated,
            self.report.removed
        );
        Ok(self.report)
    }

    fn is_persistent(&self, id: Option<&str>) -> bool {
        id.is_some_and(|id| self.persistent.contains_key(id) && !self.consumed.contains(id))
    }

    fn morph_range(
        &mut self,
        doc: &mut Document,
        parent: NodeKey,
        targets: &[Node],
        start: Option<NodeKey>,
        end: Option<NodeKey>,
    ) -> Result<(), DocumentError> {
        let mut cursor = start.filter(|c| Some(*c) != end);

        for (index, target) in targets.iter().enumerate() {
            let found = self
                .find_exact(doc, target, cursor, end)
                .or_else(|| self.find_soft(doc, targets, index, cursor, end));

            if let Some(matched) = found {
                self.discard_between(doc, cursor, matched)?;
                self.morph_node(doc, matched, target)?;
                cursor = doc.next_sibling(matched).filter(|n| Some(*n) != end);
                continue;
            }

            let before = cursor.or(end);
            let placed = match self.relocatable(doc, parent, target) {
                Some(moved) => {
                    trace!(target: "html.morph", "relocating {moved} under {parent}");
                    doc.insert_before(parent, moved, before)?;
                    self.report.relocated += 1;
                    self.morph_node(doc, moved, target)?;
                    moved
                }
                None => self.create(doc, parent, target, before)?,
            };
            // Work below `placed` may have moved the old cursor elsewhere.
            cursor = doc.next_sibling(placed).filter(|n| Some(*n) != end);
        }

        while let Some(current) = cursor {
            cursor = doc.next_sibling(current).filter(|n| Some(*n) != end);
            self.discard(doc, current)?;
        }
        Ok(())
    }

    fn holds_focus(doc: &Document, key: NodeKey) -> bool {
        doc.focused().is_some_and(|f| doc.contains(key, f))
    }

    fn find_exact(
        &self,
        doc: &Document,
        target: &Node,
        cursor: Option<NodeKey>,
        end: Option<NodeKey>,
    ) -> Option<NodeKey> {
        let id = target.id_attr()?;
        if !self.is_persistent(Some(id)) {
            return None;
        }
        let mut scan = cursor;
        while let Some(candidate) = scan.filter(|c| Some(*c) != end) {
            if doc.id_of(candidate) == Some(id) && doc.name(candidate) == target.name() {
                return Some(candidate);
            }
            if Self::holds_focus(doc, candidate) {
                return None;
            }
            scan = doc.next_sibling(candidate);
        }
        None
    }

    fn soft_matches(&self, doc: &Document, live: NodeKey, target: &Node) -> bool {
        match (doc.kind(live), target) {
            (Some(NodeKind::Text { .. }), Node::Text { .. })
            | (Some(NodeKind::Comment { .. }), Node::Comment { .. }) => true,
            (Some(NodeKind::Element { name, .. }), Node::Element { name: want, .. }) => {
                if name != want {
                    return false;
                }
                match (doc.id_of(live), target.id_attr()) {
                    (Some(have), Some(want)) => have == want,
                    (Some(_), None) => false,
                    (None, _) => true,
                }
            }
            _ => false,
        }
    }

    /// First soft match from the cursor. Scanned nodes that soft-match the
    /// upcoming target siblings are counted; at two such hits the remaining
    /// candidates are left for those siblings and the target is created fresh.
    fn find_soft(
        &self,
        doc: &Document,
        targets: &[Node],
        index: usize,
        cursor: Option<NodeKey>,
        end: Option<NodeKey>,
    ) -> Option<NodeKey> {
        let target = &targets[index];
        if self.is_persistent(target.id_attr()) {
            return None;
        }
        let mut sibling_hits = 0;
        let mut lookahead = index + 1;
        let mut scan = cursor;
        while let Some(candidate) = scan.filter(|c| Some(*c) != end) {
            // Persistent nodes are left for their own target; keep scanning past them.
            let persistent = self.is_persistent(doc.id_of(candidate));
            if !persistent && self.soft_matches(doc, candidate, target) {
                return Some(candidate);
            }
            if Self::holds_focus(doc, candidate) {
                return None;
            }
            if let Some(next) = targets.get(lookahead) {
                if self.soft_matches(doc, candidate, next) {
                    sibling_hits += 1;
                    lookahead += 1;
                    if sibling_hits >= 2 {
                        return None;
                    }
                }
            }
            scan = doc.next_sibling(candidate);
        }
        None
    }

    fn relocatable(&self, doc: &Document, parent: NodeKey, target: &Node) -> Option<NodeKey> {
        let id = target.id_attr()?;
        if !self.is_persistent(Some(id)) {
            return None;
        }
        let key = *self.persistent.get(id)?;
        (doc.exists(key) && !doc.contains(key, parent)).then_some(key)
    }

    fn subtree_has_persistent(&self, target: &Node) -> bool {
        self.is_persistent(target.id_attr())
            || target
                .children()
                .iter()
                .any(|c| self.subtree_has_persistent(c))
    }

    fn create(
        &mut self,
        doc: &mut Document,
        parent: NodeKey,
        target: &Node,
        before: Option<NodeKey>,
    ) -> Result<NodeKey, DocumentError> {
        self.report.created += 1;
        if target.name().is_some() && target.children().iter().any(|c| self.subtree_has_persistent(c)) {
            let key = doc.import_shallow(target)?;
            doc.insert_before(parent, key, before)?;
            self.morph_range(doc, key, target.children(), None, None)?;
            return Ok(key);
        }
        let key = doc.import(target)?;
        doc.insert_before(parent, key, before)?;
        Ok(key)
    }

    fn discard_between(
        &mut self,
        doc: &mut Document,
        from: Option<NodeKey>,
        to: NodeKey,
    ) -> Result<(), DocumentError> {
        let mut scan = from;
        while let Some(current) = scan.filter(|c| *c != to) {
            scan = doc.next_sibling(current);
            self.discard(doc, current)?;
        }
        Ok(())
    }

    /// Remove `node`, parking any unconsumed persistent elements inside it.
    fn discard(&mut self, doc: &mut Document, node: NodeKey) -> Result<(), DocumentError> {
        for key in doc.descendants(node) {
            if !self.is_persistent(doc.id_of(key)) || !doc.contains(node, key) {
                continue;
            }
            if self.persistent.get(doc.id_of(key).unwrap_or_default()) != Some(&key) {
                continue;
            }
            doc.detach(key)?;
            self.pantry.push(key);
            if key == node {
                trace!(target: "html.morph", "parked {key}");
                return Ok(());
            }
        }
        doc.remove(node)?;
        self.report.removed += 1;
        Ok(())
    }

    fn morph_node(&mut self, doc: &mut Document, live: NodeKey, target: &Node) -> Result<(), DocumentError> {
        self.report.matched += 1;
        if let Some(id) = doc.id_of(live) {
            if self.persistent.get(id) == Some(&live) {
                self.consumed.insert(id.to_string());
            }
        }

        match target {
            Node::Text { text } | Node::Comment { text } => {
                doc.set_text(live, text)?;
                Ok(())
            }
            Node::Element { name, .. } => {
                if self.options.preserve_permanent && doc.has_attr(live, PERMANENT_ATTR) {
                    trace!(target: "html.morph", "keeping permanent {live}");
                    return Ok(());
                }
                let pinned = self.options.ignore_active_value && doc.focused() == Some(live);
                self.sync_attributes(doc, live, target, pinned)?;
                if name == "head" && self.options.merge_head {
                    let merge = merge_head(doc, live, target)?;
                    self.report.head.added += merge.added;
                    self.report.head.removed += merge.removed;
                    self.report.head.re_appended += merge.re_appended;
                    self.report.head.awaiting.extend(merge.awaiting);
                } else {
                    let start = doc.first_child(live);
                    self.morph_range(doc, live, target.children(), start, None)?;
                }
                let forced = target.has_attr(FORCE_VALUE_ATTR);
                if !pinned || forced {
                    sync_control_state(doc, live, target)?;
                }
                Ok(())
            }
            Node::Document { .. } => Err(DocumentError::WrongNodeKind(live)),
        }
    }

    fn sync_attributes(
        &mut self,
        doc: &mut Document,
        live: NodeKey,
        target: &Node,
        pinned: bool,
    ) -> Result<(), DocumentError> {
        let skip_value = pinned && !target.has_attr(FORCE_VALUE_ATTR);
        for (key, value) in target.attributes() {
            if skip_value && key == "value" {
                continue;
            }
            doc.set_attribute(live, key, value.as_deref())?;
        }
        let stale: Vec<String> = doc
            .attributes(live)
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| !target.has_attr(k) && !(skip_value && k == "value"))
            .collect();
        for key in stale {
            doc.remove_attribute(live, &key)?;
        }
        Ok(())
    }
}

fn selected_option_value(select: &Node) -> Option<String> {
    fn options<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        for child in node.children() {
            if child.is_element_named("option") {
                out.push(child);
            } else {
                options(child, out);
            }
        }
    }
    let mut all = Vec::new();
    options(select, &mut all);
    let chosen = all
        .iter()
        .find(|o| o.has_attr("selected"))
        .or_else(|| all.first())?;
    Some(
        chosen
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| chosen.text_content()),
    )
}

/// Bring live control state in line with the target's markup defaults.
fn sync_control_state(doc: &mut Document, live: NodeKey, target: &Node) -> Result<(), DocumentError> {
    match target.name() {
        Some("input") => {
            let desired = target.attr("value").unwrap_or("");
            if doc.current_value(live).as_deref() != Some(desired) {
                doc.set_value(live, desired)?;
            }
            let checked = target.has_attr("checked");
            if doc.checked(live) != checked {
                doc.set_checked(live, checked)?;
            }
        }
        Some("textarea") => {
            let desired = target.text_content();
            if doc.current_value(live).as_deref() != Some(desired.as_str()) {
                doc.set_value(live, &desired)?;
            }
        }
        Some("select") => {
            if let Some(desired) = selected_option_value(target) {
                if doc.current_value(live).as_deref() != Some(desired.as_str()) {
                    doc.set_value(live, &desired)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom_utils::find_element_by_id;
    use crate::{parse_document, parse_fragment};

    fn target_div(html: &str) -> Node {
        let fragment = parse_fragment(html);
        fragment.children()[0].clone()
    }

    #[test]
    fn persistent_ids_require_uniqueness_and_same_tag() {
        let doc = Document::parse("<p id=a></p><p id=b></p><p id=b></p><div id=c></div>");
        let target = parse_fragment("<p id=a></p><p id=b></p><span id=c></span>");
        let ids = persistent_ids(&doc, doc.root(), std::slice::from_ref(&target));
        assert_eq!(ids.len(), 1);
        assert!(ids.contains_key("a"));
    }

    #[test]
    fn identical_tree_is_a_no_op() {
        let html = "<div id=root>\n  <p id=x>1</p>\n  <p>2 <b>bold</b></p><!-- c --><input value=v checked>\n</div>";
        let mut doc = Document::parse(html);
        let root = doc.find_by_id("root").unwrap();
        let target = target_div(html);
        let report = morph_children(&mut doc, root, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.mutation_count(), 0);
        assert_eq!(report.created, 0);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn swap_preserves_both_nodes() {
        let mut doc = Document::parse(r#"<div id=d><p id="x">1</p><p id="y">2</p></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let (x, y) = (doc.find_by_id("x").unwrap(), doc.find_by_id("y").unwrap());
        let target = target_div(r#"<div id=d><p id="y">2</p><p id="x">1</p></div>"#);
        let report = morph_children(&mut doc, div, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.children(div), &[y, x]);
        assert_eq!(report.created, 0);
        assert_eq!(doc.text_content(x), "1");
    }

    #[test]
    fn persistent_element_relocates_across_parents() {
        let mut doc = Document::parse(
            r#"<main id=m><section id=a><input id=q></section><section id=b></section></main>"#,
        );
        let main = doc.find_by_id("m").unwrap();
        let input = doc.find_by_id("q").unwrap();
        doc.set_value(input, "typed").unwrap();
        let target = target_div(
            r#"<main id=m><section id=a></section><section id=b><input id=q></section></main>"#,
        );
        morph_children(&mut doc, main, &target, &MorphOptions::default()).unwrap();
        let b = doc.find_by_id("b").unwrap();
        assert_eq!(doc.find_by_id("q"), Some(input));
        assert_eq!(doc.parent(input), Some(b));
    }

    #[test]
    fn duplicate_ids_are_not_preserved() {
        let mut doc = Document::parse(r#"<div id=d><p id=x>1</p><p id=x>2</p></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let target = target_div(r#"<div id=d><span>new</span><p id=x>1</p></div>"#);
        morph_children(&mut doc, div, &target, &MorphOptions::default()).unwrap();
        let expected = target_div(r#"<div id=d><span>new</span><p id=x>1</p></div>"#);
        assert_eq!(doc.materialize(div).unwrap(), expected);
    }

    #[test]
    fn attributes_and_text_follow_target() {
        let mut doc = Document::parse(r#"<div id=d><p class=a title=t>old</p></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let p = doc.first_child(div).unwrap();
        let target = target_div(r#"<div id=d><p class=b data-x>new</p></div>"#);
        morph_children(&mut doc, div, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.first_child(div), Some(p));
        assert_eq!(doc.attr(p, "class"), Some("b"));
        assert_eq!(doc.attr(p, "title"), None);
        assert!(doc.has_attr(p, "data-x"));
        assert_eq!(doc.text_content(p), "new");
    }

    #[test]
    fn ambiguous_soft_match_creates_fresh_node() {
        // Target inserts a new <div> ahead of two live <p>s that belong to later targets.
        let mut doc = Document::parse(r#"<section id=s><p>a</p><p>b</p><div>tail</div></section>"#);
        let section = doc.find_by_id("s").unwrap();
        let live_div = doc.children(section)[2];
        let target = target_div(r#"<section id=s><div>head</div><p>a</p><p>b</p><div>tail</div></section>"#);
        morph_children(&mut doc, section, &target, &MorphOptions::default()).unwrap();
        let children = doc.children(section).to_vec();
        assert_eq!(children.len(), 4);
        assert_ne!(children[0], live_div);
        assert_eq!(children[3], live_div);
        assert_eq!(doc.text_content(children[3]), "tail");
    }

    #[test]
    fn focused_value_is_pinned_unless_forced() {
        let mut doc = Document::parse(r#"<form id=f><input id=q value=a></form>"#);
        let form = doc.find_by_id("f").unwrap();
        let q = doc.find_by_id("q").unwrap();
        doc.focus(q).unwrap();
        doc.set_value(q, "typing").unwrap();

        let target = target_div(r#"<form id=f><input id=q value=b></form>"#);
        morph_children(&mut doc, form, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.current_value(q).as_deref(), Some("typing"));
        assert_eq!(doc.focused(), Some(q));

        let forced = target_div(r#"<form id=f><input id=q value=b data-turbo-force-value></form>"#);
        morph_children(&mut doc, form, &forced, &MorphOptions::default()).unwrap();
        assert_eq!(doc.current_value(q).as_deref(), Some("b"));
    }

    #[test]
    fn unfocused_control_resets_to_target_value() {
        let mut doc = Document::parse(r#"<form id=f><input id=q value=a></form>"#);
        let form = doc.find_by_id("f").unwrap();
        let q = doc.find_by_id("q").unwrap();
        doc.set_value(q, "typed").unwrap();
        let target = target_div(r#"<form id=f><input id=q value=a></form>"#);
        morph_children(&mut doc, form, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.current_value(q).as_deref(), Some("a"));
    }

    #[test]
    fn permanent_element_content_is_kept() {
        let mut doc = Document::parse(r#"<div id=d><div id=player data-turbo-permanent>playing</div></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let player = doc.find_by_id("player").unwrap();
        let target = target_div(r#"<div id=d><h1>t</h1><div id=player data-turbo-permanent>fresh</div></div>"#);
        morph_children(&mut doc, div, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.find_by_id("player"), Some(player));
        assert_eq!(doc.text_content(player), "playing");
    }

    #[test]
    fn morph_element_replaces_on_tag_change() {
        let mut doc = Document::parse(r#"<div id=d><p id=old>x</p></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let old = doc.find_by_id("old").unwrap();
        let target = target_div(r#"<section id=new>y</section>"#);
        morph_element(&mut doc, old, &target, &MorphOptions::default()).unwrap();
        assert!(!doc.exists(old));
        let only = doc.children(div);
        assert_eq!(only.len(), 1);
        assert!(doc.is_named(only[0], "section"));
    }

    #[test]
    fn head_merge_appends_removes_and_reports_stylesheets() {
        let mut doc = Document::parse(
            r#"<html><head><title>A</title><link rel=stylesheet href=/a.css><script im-preserve="true">x</script></head><body></body></html>"#,
        );
        let head = doc.head().unwrap();
        let target = parse_document(
            r#"<html><head><title>B</title><link rel=stylesheet href=/a.css><link rel=stylesheet href=/b.css></head><body></body></html>"#,
        );
        let target_head = crate::dom_utils::find_head(&target).unwrap();
        let merge = merge_head(&mut doc, head, target_head).unwrap();
        assert_eq!(merge.added, 2);
        assert_eq!(merge.removed, 1);
        assert_eq!(merge.awaiting, ["/b.css"]);
        assert_eq!(doc.title().as_deref(), Some("B"));
        assert!(doc.element_by_name(head, "script").is_some());
    }

    #[test]
    fn soft_match_looks_past_a_persistent_node() {
        let mut doc = Document::parse(r#"<div id=d><div id=keep>k</div><p>a</p></div>"#);
        let div = doc.find_by_id("d").unwrap();
        let keep = doc.find_by_id("keep").unwrap();
        let p = doc.children(div)[1];
        let target = target_div(r#"<div id=d><p>b</p><div id=keep>k</div></div>"#);
        let report = morph_children(&mut doc, div, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.children(div), vec![p, keep]);
        assert_eq!(doc.text_content(p), "b");
        assert_eq!(report.created, 0);
        assert_eq!(report.relocated, 1);
    }

    #[test]
    fn head_merge_awaits_new_external_scripts() {
        let mut doc = Document::parse(
            r#"<html><head><script src="/app.js"></script></head><body></body></html>"#,
        );
        let head = doc.head().unwrap();
        let target = parse_document(
            r#"<html><head><script src="/app.js"></script><script src="/extra.js"></script><script>inline()</script></head><body></body></html>"#,
        );
        let target_head = crate::dom_utils::find_head(&target).unwrap();
        let merge = merge_head(&mut doc, head, target_head).unwrap();
        assert_eq!(merge.added, 2);
        assert_eq!(merge.awaiting, ["/extra.js"]);
    }

    #[test]
    fn pending_head_resources_leaves_the_document_alone() {
        let mut doc = Document::parse(
            r#"<html><head><title>A</title><link rel=stylesheet href=/a.css></head><body></body></html>"#,
        );
        let head = doc.head().unwrap();
        let target = parse_document(
            r#"<html><head><title>B</title><link rel=stylesheet href=/a.css><link rel=stylesheet href=/b.css><script src=/b.js></script></head><body></body></html>"#,
        );
        let target_head = crate::dom_utils::find_head(&target).unwrap();
        let pending = pending_head_resources(&doc, head, target_head);
        assert_eq!(pending, ["/b.css", "/b.js"]);
        assert_eq!(doc.mutation_count(), 0);
        assert_eq!(doc.title().as_deref(), Some("A"));
        let merge = merge_head(&mut doc, head, target_head).unwrap();
        assert_eq!(merge.awaiting, pending);
    }

    #[test]
    fn head_merge_is_idempotent() {
        let html = r#"<html><head><title>A</title><meta name=x content=y></head><body></body></html>"#;
        let mut doc = Document::parse(html);
        let head = doc.head().unwrap();
        let target = parse_document(html);
        let merge = merge_head(&mut doc, head, crate::dom_utils::find_head(&target).unwrap()).unwrap();
        assert_eq!(merge, HeadMerge::default());
        assert_eq!(doc.mutation_count(), 0);
    }

    #[test]
    fn morph_result_matches_target_markup() {
        let mut doc = Document::parse(
            r#"<ul id=l><li id=a>A</li><li>plain</li><li id=c>C</li><li>gone</li></ul>"#,
        );
        let list = doc.find_by_id("l").unwrap();
        let target_html = r#"<ul id=l><li id=c>C2</li><li>new</li><li id=a>A</li></ul>"#;
        let target = target_div(target_html);
        morph_children(&mut doc, list, &target, &MorphOptions::default()).unwrap();
        assert_eq!(doc.materialize(list).unwrap(), target);
        assert!(find_element_by_id(&target, "c").is_some());
    }
}
