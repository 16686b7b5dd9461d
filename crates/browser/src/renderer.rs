//! Content swaps applied to the live document.
//!
//! Every renderer runs in two phases. `prepare` only reads: it reports the
//! head resources that must load before the swap. `finish` merges the head
//! and swaps the content. The `View` runs `finish` only once those resources
//! settle, so an abandoned render leaves the document untouched.
//!
//! Invariants:
//! - A permanent element present on both sides is moved into the new
//!   content, never recreated.
//! - Frame renderers touch nothing outside their frame element.
use crate::snapshot::Snapshot;
use crate::stream::{StreamAction, StreamError};
use core_types::FrameId;
use html::morph::PERMANENT_ATTR;
use html::{
    Document, DocumentError, MorphOptions, MorphReport, Node, NodeKey, merge_head, morph_children, morph_element,
    pending_head_resources,
};
use std::fmt;

pub const AUTOFOCUS_ATTR: &str = "autofocus";

#[derive(Clone, Debug)]
pub enum Renderer {
    PageReplace(Snapshot),
    PageMorph(Snapshot),
    /// `element` is the frame element the content was fetched for.
    FrameReplace { frame: FrameId, element: NodeKey, content: Node },
    FrameMorph { frame: FrameId, element: NodeKey, content: Node },
    ErrorReplace(Snapshot),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderKind {
    PageReplace,
    PageMorph,
    FrameReplace,
    FrameMorph,
    ErrorReplace,
    Stream(StreamAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderEffect {
    pub kind: RenderKind,
    pub matched: usize,
    pub created: usize,
    pub removed: usize,
    pub relocated: usize,
    pub permanent_preserved: usize,
    pub head_added: usize,
    /// Head resources (stylesheets, scripts) the swap waited for.
    pub awaited: Vec<String>,
    /// A stream message asked for the current page to be refreshed.
    pub refresh_requested: bool,
}

impl RenderEffect {
    pub fn new(kind: RenderKind) -> Self {
        Self {
            kind,
            matched: 0,
            created: 0,
            removed: 0,
            relocated: 0,
            permanent_preserved: 0,
            head_added: 0,
            awaited: Vec::new(),
            refresh_requested: false,
        }
    }

    pub(crate) fn absorb(&mut self, report: &MorphReport) {
        self.matched += report.matched;
        self.created += report.created;
        self.removed += report.removed;
        self.relocated += report.relocated;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderError {
    Document(DocumentError),
    /// The snapshot lacks a section the renderer needs.
    MissingSection(&'static str),
    FrameNotInDocument(FrameId),
    Stream(StreamError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Document(err) => write!(f, "document error: {err}"),
            RenderError::MissingSection(section) => write!(f, "new content has no <{section}>"),
            RenderError::FrameNotInDocument(id) => write!(f, "frame #{id} is not in the document"),
            RenderError::Stream(err) => write!(f, "stream message rejected: {err}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<DocumentError> for RenderError {
    fn from(err: DocumentError) -> Self {
        RenderError::Document(err)
    }
}

impl From<StreamError> for RenderError {
    fn from(err: StreamError) -> Self {
        RenderError::Stream(err)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderProgress {
    Complete(RenderEffect),
    /// Nothing applied yet; the swap waits for `effect.awaited`.
    AwaitingResources(RenderEffect),
}

impl Renderer {
    pub fn kind(&self) -> RenderKind {
        match self {
            Renderer::PageReplace(_) => RenderKind::PageReplace,
            Renderer::PageMorph(_) => RenderKind::PageMorph,
            Renderer::FrameReplace { .. } => RenderKind::FrameReplace,
            Renderer::FrameMorph { .. } => RenderKind::FrameMorph,
            Renderer::ErrorReplace(_) => RenderKind::ErrorReplace,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Renderer::PageReplace(s) | Renderer::PageMorph(s) | Renderer::ErrorReplace(s) => Some(s),
            Renderer::FrameReplace { .. } | Renderer::FrameMorph { .. } => None,
        }
    }

    pub fn frame(&self) -> Option<&FrameId> {
        match self {
            Renderer::FrameReplace { frame, .. } | Renderer::FrameMorph { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Run both phases, stopping after `prepare` when resources must load first.
    pub fn render(&self, doc: &mut Document) -> Result<RenderProgress, RenderError> {
        let mut effect = self.prepare(doc)?;
        if !effect.awaited.is_empty() {
            return Ok(RenderProgress::AwaitingResources(effect));
        }
        self.finish(doc, &mut effect)?;
        Ok(RenderProgress::Complete(effect))
    }

    pub fn prepare(&self, doc: &Document) -> Result<RenderEffect, RenderError> {
        let mut effect = RenderEffect::new(self.kind());
        if let Renderer::PageReplace(snapshot) | Renderer::PageMorph(snapshot) = self {
            if let (Some(live_head), Some(target_head)) = (doc.head(), snapshot.head_element()) {
                effect.awaited = pending_head_resources(doc, live_head, target_head);
            }
        }
        Ok(effect)
    }

    pub fn finish(&self, doc: &mut Document, effect: &mut RenderEffect) -> Result<(), RenderError> {
        if let Renderer::PageReplace(snapshot) | Renderer::PageMorph(snapshot) = self {
            if let (Some(live_head), Some(target_head)) = (doc.head(), snapshot.head_element()) {
                let merge = merge_head(doc, live_head, target_head)?;
                effect.head_added = merge.added + merge.re_appended;
                effect.removed += merge.removed;
            }
        }
        match self {
            Renderer::PageReplace(snapshot) => replace_body(doc, snapshot, effect)?,
            Renderer::PageMorph(snapshot) => {
                let (Some(live_body), Some(target_body)) = (doc.body(), snapshot.body()) else {
                    return replace_body(doc, snapshot, effect);
                };
                let report = morph_element(doc, live_body, target_body, &MorphOptions::default())?;
                effect.absorb(&report);
                autofocus(doc);
            }
            Renderer::ErrorReplace(snapshot) => {
                let target = snapshot.html_element().ok_or(RenderError::MissingSection("html"))?;
                let fresh = doc.import(target)?;
                effect.created += 1;
                match doc.document_element() {
                    Some(old) => {
                        doc.insert_before(doc.root(), fresh, Some(old))?;
                        doc.remove(old)?;
                        effect.removed += 1;
                    }
                    None => doc.append_child(doc.root(), fresh)?,
                }
                autofocus(doc);
            }
            Renderer::FrameReplace { frame, element, content } => {
                let live = find_frame(doc, frame, *element)?;
                replace_children(doc, live, content.children(), effect)?;
            }
            Renderer::FrameMorph { frame, element, content } => {
                let live = find_frame(doc, frame, *element)?;
                let report = morph_children(doc, live, content, &MorphOptions::default())?;
                effect.absorb(&report);
            }
        }
        log::debug!(
            target: "browser.render",
            "{:?}: {} created, {} removed, {} relocated, {} permanent kept",
            effect.kind,
            effect.created,
            effect.removed,
            effect.relocated,
            effect.permanent_preserved
        );
        Ok(())
    }
}

/// `element` if it is still the connected `<turbo-frame>` with this id. A page
/// render that replaced the element invalidates frame content fetched for it.
pub fn find_frame(doc: &Document, frame: &FrameId, element: NodeKey) -> Result<NodeKey, RenderError> {
    let attached = doc.is_connected(element)
        && doc.is_named(element, "turbo-frame")
        && doc.id_of(element) == Some(frame.as_str());
    if attached {
        Ok(element)
    } else {
        Err(RenderError::FrameNotInDocument(frame.clone()))
    }
}

fn replace_body(doc: &mut Document, snapshot: &Snapshot, effect: &mut RenderEffect) -> Result<(), RenderError> {
    let Some(html) = doc.document_element() else {
        return install(doc, snapshot, effect);
    };
    let target = snapshot.body().ok_or(RenderError::MissingSection("body"))?;
    let mut fresh = [doc.import(target)?];
    effect.permanent_preserved += adopt_permanents(doc, &mut fresh)?;
    effect.created += 1;
    match doc.body() {
        Some(old) => {
            doc.insert_before(html, fresh[0], Some(old))?;
            doc.remove(old)?;
            effect.removed += 1;
        }
        None => doc.append_child(html, fresh[0])?,
    }
    autofocus(doc);
    Ok(())
}

/// First render into an empty document: copy the whole snapshot.
fn install(doc: &mut Document, snapshot: &Snapshot, effect: &mut RenderEffect) -> Result<(), RenderError> {
    let root = doc.root();
    effect.removed += doc.children(root).len();
    doc.remove_children(root)?;
    for child in snapshot.root().children() {
        let key = doc.import(child)?;
        doc.append_child(root, key)?;
        effect.created += 1;
    }
    autofocus(doc);
    Ok(())
}

/// Replace the children of `parent` with imports of `content`, keeping
/// permanent elements alive.
pub(crate) fn replace_children(
    doc: &mut Document,
    parent: NodeKey,
    content: &[Node],
    effect: &mut RenderEffect,
) -> Result<(), RenderError> {
    let mut fresh = import_all(doc, content)?;
    effect.permanent_preserved += adopt_permanents(doc, &mut fresh)?;
    effect.removed += doc.children(parent).len();
    doc.remove_children(parent)?;
    for key in fresh {
        doc.append_child(parent, key)?;
        effect.created += 1;
    }
    Ok(())
}

pub(crate) fn import_all(doc: &mut Document, content: &[Node]) -> Result<Vec<NodeKey>, DocumentError> {
    content.iter().map(|node| doc.import(node)).collect()
}

/// Swap placeholders in the detached `roots` for the live permanent elements
/// with the same id. Returns how many were adopted.
pub(crate) fn adopt_permanents(doc: &mut Document, roots: &mut [NodeKey]) -> Result<usize, DocumentError> {
    let mut adopted = 0;
    for i in 0..roots.len() {
        for placeholder in doc.descendants(roots[i]) {
            if !doc.exists(placeholder) || !doc.has_attr(placeholder, PERMANENT_ATTR) {
                continue;
            }
            let Some(id) = doc.id_of(placeholder).map(str::to_string) else {
                continue;
            };
            let Some(live) = doc.find_by_id(&id).filter(|k| doc.has_attr(*k, PERMANENT_ATTR)) else {
                continue;
            };
            match doc.parent(placeholder) {
                Some(parent) => doc.insert_before(parent, live, Some(placeholder))?,
                None => {
                    doc.detach(live)?;
                    roots[i] = live;
                }
            }
            doc.remove(placeholder)?;
            log::trace!(target: "browser.render", "kept permanent #{id}");
            adopted += 1;
        }
    }
    Ok(adopted)
}

/// Focus the first `[autofocus]` element when nothing holds focus.
fn autofocus(doc: &mut Document) {
    if doc.focused().is_some_and(|k| doc.is_connected(k)) {
        return;
    }
    let Some(body) = doc.body() else {
        return;
    };
    let target = doc
        .descendants(body)
        .into_iter()
        .find(|k| doc.is_element(*k) && doc.has_attr(*k, AUTOFOCUS_ATTR));
    if let Some(key) = target {
        if let Err(err) = doc.focus(key) {
            log::warn!(target: "browser.render", "autofocus failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = r#"<html><head><title>One</title><link rel="stylesheet" href="/a.css"></head>
<body><div id="player" data-turbo-permanent><p>playing</p></div><main>one</main>
<turbo-frame id="side"><p id="old">old</p></turbo-frame></body></html>"#;

    fn snapshot(body: &str, head: &str) -> Snapshot {
        Snapshot::parse(&format!("<html><head>{head}</head><body>{body}</body></html>"))
    }

    #[test]
    fn page_replace_keeps_permanent_identity() {
        let mut doc = Document::parse(LIVE);
        let player = doc.find_by_id("player").unwrap();
        let inner = doc.first_child(player).unwrap();
        let next = snapshot(
            r#"<main>two</main><aside><div id="player" data-turbo-permanent>placeholder</div></aside>"#,
            r#"<title>Two</title><link rel="stylesheet" href="/a.css">"#,
        );
        let renderer = Renderer::PageReplace(next);
        let RenderProgress::Complete(effect) = renderer.render(&mut doc).unwrap() else {
            panic!("nothing new to await");
        };
        assert_eq!(effect.permanent_preserved, 1);
        assert_eq!(doc.find_by_id("player"), Some(player));
        assert_eq!(doc.first_child(player), Some(inner));
        assert_eq!(doc.name(doc.parent(player).unwrap()), Some("aside"));
        assert_eq!(doc.title().as_deref(), Some("Two"));
        assert!(doc.to_html().contains("<main>two</main>"));
    }

    #[test]
    fn new_stylesheets_suspend_the_swap() {
        let mut doc = Document::parse(LIVE);
        let renderer = Renderer::PageReplace(snapshot(
            "<main>two</main>",
            r#"<link rel="stylesheet" href="/a.css"><link rel="stylesheet" href="/b.css">"#,
        ));
        let before = doc.to_html();
        let RenderProgress::AwaitingResources(mut effect) = renderer.render(&mut doc).unwrap() else {
            panic!("b.css is new");
        };
        assert_eq!(effect.awaited, vec!["/b.css".to_string()]);
        assert_eq!(doc.to_html(), before, "nothing is applied while waiting");
        renderer.finish(&mut doc, &mut effect).unwrap();
        assert!(doc.to_html().contains("<main>two</main>"));
        assert!(doc.to_html().contains("/b.css"));
    }

    #[test]
    fn error_replace_swaps_whole_document() {
        let mut doc = Document::parse(LIVE);
        let renderer = Renderer::ErrorReplace(Snapshot::parse(
            "<html><head><title>Oops</title></head><body><h1>500</h1></body></html>",
        ));
        assert!(matches!(renderer.render(&mut doc).unwrap(), RenderProgress::Complete(_)));
        assert_eq!(doc.title().as_deref(), Some("Oops"));
        assert!(doc.find_by_id("player").is_none());
    }

    #[test]
    fn frame_renderers_are_scoped() {
        let mut doc = Document::parse(LIVE);
        let main_before = doc.outer_html(doc.body().unwrap());
        let content = html::parse_fragment(r#"<turbo-frame id="side"><p id="new">new</p></turbo-frame>"#)
            .children()[0]
            .clone();
        let side = doc.find_by_id("side").unwrap();
        let renderer = Renderer::FrameReplace {
            frame: FrameId::new("side"),
            element: side,
            content: content.clone(),
        };
        renderer.render(&mut doc).unwrap();
        assert!(doc.find_by_id("old").is_none());
        assert!(doc.find_by_id("new").is_some());
        assert_ne!(doc.outer_html(doc.body().unwrap()), main_before);

        let new_p = doc.find_by_id("new").unwrap();
        let morph = Renderer::FrameMorph {
            frame: FrameId::new("side"),
            element: side,
            content,
        };
        let settled = doc.mutation_count();
        morph.render(&mut doc).unwrap();
        assert_eq!(doc.find_by_id("new"), Some(new_p));
        assert_eq!(doc.mutation_count(), settled);

        let missing = Renderer::FrameReplace {
            frame: FrameId::new("nope"),
            element: side,
            content: Node::element("turbo-frame", vec![], vec![]),
        };
        assert_eq!(
            missing.render(&mut doc),
            Err(RenderError::FrameNotInDocument(FrameId::new("nope")))
        );
    }

    #[test]
    fn frame_content_does_not_land_in_a_replacement_element() {
        let mut doc = Document::parse(LIVE);
        let stale = doc.find_by_id("side").unwrap();
        let page = Renderer::PageReplace(snapshot(
            r#"<turbo-frame id="side"><p id="fresh">fresh</p></turbo-frame>"#,
            "",
        ));
        page.render(&mut doc).unwrap();
        let content = html::parse_fragment(r#"<turbo-frame id="side"><p id="late">late</p></turbo-frame>"#)
            .children()[0]
            .clone();
        let late = Renderer::FrameReplace {
            frame: FrameId::new("side"),
            element: stale,
            content,
        };
        assert_eq!(
            late.render(&mut doc),
            Err(RenderError::FrameNotInDocument(FrameId::new("side")))
        );
        assert!(doc.find_by_id("fresh").is_some());
        assert!(doc.find_by_id("late").is_none());
    }

    #[test]
    fn first_render_installs_snapshot_and_autofocuses() {
        let mut doc = Document::new();
        let renderer = Renderer::PageReplace(snapshot(r#"<input id="q" autofocus>"#, "<title>T</title>"));
        renderer.render(&mut doc).unwrap();
        assert_eq!(doc.title().as_deref(), Some("T"));
        assert_eq!(doc.focused(), doc.find_by_id("q"));
    }
}
