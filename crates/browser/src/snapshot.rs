//! Immutable captures of rendered pages.
//!
//! Invariants:
//! - A snapshot never shares structure with the live document; capturing
//!   materializes attributes only, so typed control values are not carried.
//! - Head-derived flags are computed once at construction.
use html::dom_utils::{collect_elements_with_attr, find_body, find_element_by_id, find_head, find_html};
use html::head::{HeadMetadata, extract_head_metadata};
use html::morph::PERMANENT_ATTR;
use html::{Document, DocumentError, Node, parse_document, to_html};
use std::collections::BTreeSet;

pub const CACHE_CONTROL_META: &str = "turbo-cache-control";
pub const VISIT_CONTROL_META: &str = "turbo-visit-control";
pub const REFRESH_METHOD_META: &str = "turbo-refresh-method";
pub const REFRESH_SCROLL_META: &str = "turbo-refresh-scroll";
pub const ROOT_META: &str = "turbo-root";
pub const TRACK_ATTR: &str = "data-turbo-track";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheControl {
    #[default]
    Default,
    Cacheable,
    NoCache,
    NoPreview,
}

impl CacheControl {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("cacheable") => CacheControl::Cacheable,
            Some("no-cache") => CacheControl::NoCache,
            Some("no-preview") => CacheControl::NoPreview,
            _ => CacheControl::Default,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    root: Node,
    head: HeadMetadata,
    permanent_ids: BTreeSet<String>,
    cache_control: CacheControl,
    visitable: bool,
    tracked_signature: String,
}

impl Snapshot {
    pub fn from_node(root: Node) -> Self {
        let head = extract_head_metadata(&root);
        let cache_control = CacheControl::parse(head.meta_content(CACHE_CONTROL_META));
        let visitable = !head
            .meta_content(VISIT_CONTROL_META)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("reload"));
        let tracked_signature = find_head(&root).map(tracked_signature).unwrap_or_default();

        let mut flagged = Vec::new();
        collect_elements_with_attr(&root, PERMANENT_ATTR, &mut flagged);
        let permanent_ids = flagged
            .iter()
            .filter_map(|n| n.id_attr())
            .map(str::to_string)
            .collect();

        Self {
            root,
            head,
            permanent_ids,
            cache_control,
            visitable,
            tracked_signature,
        }
    }

    pub fn parse(html: &str) -> Self {
        Self::from_node(parse_document(html))
    }

    /// Capture the live document as it would render from markup alone.
    pub fn capture(doc: &Document) -> Result<Self, DocumentError> {
        Ok(Self::from_node(doc.materialize(doc.root())?))
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn html_element(&self) -> Option<&Node> {
        find_html(&self.root)
    }

    pub fn head_element(&self) -> Option<&Node> {
        find_head(&self.root)
    }

    pub fn body(&self) -> Option<&Node> {
        find_body(&self.root)
    }

    pub fn head(&self) -> &HeadMetadata {
        &self.head
    }

    pub fn title(&self) -> Option<&str> {
        self.head.title.as_deref()
    }

    pub fn permanent_ids(&self) -> &BTreeSet<String> {
        &self.permanent_ids
    }

    pub fn cache_control(&self) -> CacheControl {
        self.cache_control
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache_control != CacheControl::NoCache
    }

    pub fn is_previewable(&self) -> bool {
        self.is_cacheable() && self.cache_control != CacheControl::NoPreview
    }

    /// False when the page demands a full reload instead of an in-place render.
    pub fn is_visitable(&self) -> bool {
        self.visitable
    }

    pub fn tracked_signature(&self) -> &str {
        &self.tracked_signature
    }

    pub fn refresh_morphs(&self) -> bool {
        meta_is(&self.head, REFRESH_METHOD_META, "morph")
    }

    pub fn refresh_preserves_scroll(&self) -> bool {
        meta_is(&self.head, REFRESH_SCROLL_META, "preserve")
    }

    pub fn root_path(&self) -> Option<&str> {
        self.head.meta_content(ROOT_META)
    }

    /// `<turbo-frame id=...>` anywhere in the page.
    pub fn frame(&self, id: &str) -> Option<&Node> {
        find_element_by_id(&self.root, id).filter(|n| n.is_element_named("turbo-frame"))
    }
}

fn meta_is(head: &HeadMetadata, name: &str, want: &str) -> bool {
    head.meta_content(name)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(want))
}

/// Concatenated markup of head elements tracked for reload.
pub fn tracked_signature(head: &Node) -> String {
    head.children()
        .iter()
        .filter(|n| n.attr(TRACK_ATTR).is_some_and(|v| v.eq_ignore_ascii_case("reload")))
        .map(to_html)
        .collect()
}

/// Signature of the live document's tracked head elements.
pub fn live_tracked_signature(doc: &Document) -> String {
    let Some(head) = doc.head() else {
        return String::new();
    };
    doc.element_children(head)
        .filter(|k| doc.attr(*k, TRACK_ATTR).is_some_and(|v| v.eq_ignore_ascii_case("reload")))
        .map(|k| doc.outer_html(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html><html><head>
        <title>Inbox</title>
        <meta name="turbo-cache-control" content="no-preview">
        <meta name="turbo-refresh-method" content="morph">
        <link rel="stylesheet" href="/app.css" data-turbo-track="reload">
        </head><body>
        <nav id="player" data-turbo-permanent>audio</nav>
        <turbo-frame id="messages" src="/messages"></turbo-frame>
        <input id="q" value="">
        </body></html>"#;

    #[test]
    fn head_flags_are_read_once() {
        let snapshot = Snapshot::parse(PAGE);
        assert_eq!(snapshot.title(), Some("Inbox"));
        assert_eq!(snapshot.cache_control(), CacheControl::NoPreview);
        assert!(snapshot.is_cacheable());
        assert!(!snapshot.is_previewable());
        assert!(snapshot.is_visitable());
        assert!(snapshot.refresh_morphs());
        assert!(!snapshot.refresh_preserves_scroll());
        assert!(snapshot.tracked_signature().contains("/app.css"));
        assert!(snapshot.permanent_ids().contains("player"));
        assert!(snapshot.frame("messages").is_some());
        assert!(snapshot.frame("player").is_none());
    }

    #[test]
    fn capture_drops_typed_values_and_is_detached() {
        let mut doc = Document::parse(PAGE);
        let input = doc.find_by_id("q").unwrap();
        doc.set_value(input, "typed").unwrap();
        let snapshot = Snapshot::capture(&doc).unwrap();

        let body = doc.body().unwrap();
        doc.remove_children(body).unwrap();
        let captured = snapshot.body().unwrap();
        let q = html::dom_utils::find_element_by_id(captured, "q").unwrap();
        assert_eq!(q.attr("value"), Some(""));
        assert_eq!(live_tracked_signature(&doc), snapshot.tracked_signature());
    }

    #[test]
    fn reload_control_and_cache_opt_out() {
        let snapshot = Snapshot::parse(
            r#"<head><meta name="turbo-visit-control" content="reload"><meta name="turbo-cache-control" content="no-cache"></head>"#,
        );
        assert!(!snapshot.is_visitable());
        assert!(!snapshot.is_cacheable());
        assert!(!snapshot.is_previewable());
        assert_eq!(CacheControl::parse(Some("bogus")), CacheControl::Default);
    }
}
