pub mod dom;
#[cfg(any(test, feature = "dom-snapshot"))]
pub mod dom_snapshot;
pub mod dom_utils;
pub mod head;
pub mod morph;
pub mod selector;
pub mod serialize;

mod dom_builder;
mod entities;
mod tokenizer;
mod types;

use memchr::{memchr, memchr2};

pub use crate::dom::{Document, DocumentError, LiveElement, NodeKey, NodeKind};
pub use crate::dom_builder::build_dom;
pub use crate::morph::{
    HeadMerge, MorphOptions, MorphReport, merge_head, morph_children, morph_element, morph_outer,
    pending_head_resources,
};
pub use crate::selector::{SelectorError, SelectorList};
pub use crate::serialize::{inner_html, to_html};
pub use crate::tokenizer::tokenize;
pub use crate::types::{Attribute, Node, Token};

/// Whether a `Content-Type` value announces an HTML body.
pub fn is_html(content_type: Option<&str>) -> bool {
    let Some(value) = content_type else {
        return false;
    };
    contains_ignore_ascii_case(value, b"text/html")
        || contains_ignore_ascii_case(value, b"application/xhtml")
}

fn contains_ignore_ascii_case(haystack: &str, needle: &[u8]) -> bool {
    let hay = haystack.as_bytes();
    let Some(&first) = needle.first() else {
        return true;
    };
    let (lower, upper) = (first.to_ascii_lowercase(), first.to_ascii_uppercase());
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        let rel = if lower == upper {
            memchr(lower, &hay[i..])
        } else {
            memchr2(lower, upper, &hay[i..])
        };
        let Some(rel) = rel else {
            return false;
        };
        let pos = i + rel;
        if pos + needle.len() <= hay.len() && hay[pos..pos + needle.len()].eq_ignore_ascii_case(needle)
        {
            return true;
        }
        i = pos + 1;
    }
    false
}

/// Parse markup as a fragment: top-level nodes are kept as they appear, under
/// a doctype-less `Node::Document` container.
pub fn parse_fragment(html: &str) -> Node {
    match build_dom(&tokenize(html)) {
        Node::Document { children, .. } => Node::Document {
            doctype: None,
            children,
        },
        other => other,
    }
}

/// Parse a full page into `#document > html > (head, body)`.
///
/// Head-only elements that appear before any body content are moved into
/// `head`, everything else into `body`; whitespace between the sections is
/// dropped.
pub fn parse_document(html: &str) -> Node {
    let Node::Document { doctype, children } = build_dom(&tokenize(html)) else {
        return Node::Document {
            doctype: None,
            children: Vec::new(),
        };
    };

    let mut root_extras = Vec::new();
    let mut html_attributes = Vec::new();
    let mut content = Vec::new();
    for node in children {
        match node {
            Node::Element {
                name,
                attributes,
                children,
            } if name == "html" => {
                html_attributes = attributes;
                content.extend(children);
            }
            Node::Comment { .. } if content.is_empty() => root_extras.push(node),
            other => content.push(other),
        }
    }

    let mut head = (Vec::new(), Vec::new());
    let mut body = (Vec::new(), Vec::new());
    let mut in_body = false;
    let mut explicit_body = false;
    for node in content {
        match node {
            Node::Element {
                name,
                attributes,
                children,
            } if name == "head" => {
                head.0 = attributes;
                head.1.extend(children);
            }
            Node::Element {
                name,
                attributes,
                children,
            } if name == "body" => {
                body.0 = attributes;
                body.1.extend(children);
                in_body = true;
                explicit_body = true;
            }
            node if node.is_whitespace_text() => {
                if in_body && !explicit_body {
                    body.1.push(node);
                }
            }
            node if !in_body && is_head_content(&node) => head.1.push(node),
            node => {
                body.1.push(node);
                in_body = true;
            }
        }
    }

    root_extras.push(Node::Element {
        name: "html".to_string(),
        attributes: html_attributes,
        children: vec![
            Node::Element {
                name: "head".to_string(),
                attributes: head.0,
                children: head.1,
            },
            Node::Element {
                name: "body".to_string(),
                attributes: body.0,
                children: body.1,
            },
        ],
    });
    Node::Document {
        doctype,
        children: root_extras,
    }
}

fn is_head_content(node: &Node) -> bool {
    matches!(
        node.name(),
        Some("title" | "meta" | "link" | "script" | "style" | "base")
    ) || matches!(node, Node::Comment { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_html_matches_common_content_types() {
        assert!(is_html(Some("text/html; charset=utf-8")));
        assert!(is_html(Some("Application/XHTML+xml")));
        assert!(!is_html(Some("application/json")));
        assert!(!is_html(None));
    }

    #[test]
    fn parse_document_wraps_bare_content() {
        let dom = parse_document("<title>t</title><p>x</p>");
        let head = dom_utils::find_head(&dom).unwrap();
        let body = dom_utils::find_body(&dom).unwrap();
        assert!(head.children()[0].is_element_named("title"));
        assert!(body.children()[0].is_element_named("p"));
    }

    #[test]
    fn parse_document_keeps_explicit_sections() {
        let dom = parse_document(
            "<!DOCTYPE html>\n<html lang=en>\n<head><meta charset=utf-8></head>\n<body class=app><main></main></body>\n</html>\n",
        );
        let html = dom_utils::find_html(&dom).unwrap();
        assert_eq!(html.attr("lang"), Some("en"));
        assert_eq!(html.children().len(), 2);
        let body = dom_utils::find_body(&dom).unwrap();
        assert_eq!(body.attr("class"), Some("app"));
        assert_eq!(body.children().len(), 1);
    }

    #[test]
    fn parse_fragment_keeps_top_level_nodes() {
        let fragment = parse_fragment("<li>a</li> <li>b</li>");
        assert_eq!(fragment.children().len(), 3);
    }
}
