use crate::Node;
use crate::dom_utils::{find_child_element, find_head};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadMetadata {
    pub title: Option<String>,
    pub meta: Vec<MetaTag>,
    pub links: Vec<LinkTag>,
    pub base_href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: Option<String>,     // e.g. name="turbo-cache-control"
    pub property: Option<String>, // e.g. property="og:title"
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTag {
    pub rel: Vec<String>, // lowercased, e.g. ["stylesheet"]
    pub href: Option<String>,
}

impl LinkTag {
    pub fn is_stylesheet(&self) -> bool {
        self.rel.iter().any(|r| r == "stylesheet")
    }
}

impl HeadMetadata {
    /// `content` of the first `<meta name=...>` with this name.
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .and_then(|m| m.content.as_deref())
    }

    pub fn stylesheet_hrefs(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|l| l.is_stylesheet())
            .filter_map(|l| l.href.as_deref())
    }
}

pub fn extract_head_metadata(dom: &Node) -> HeadMetadata {
    let mut meta = HeadMetadata::default();
    if let Some(head) = find_head(dom) {
        fill_from(head, &mut meta);
    }
    meta
}

fn owned(node: &Node, key: &str) -> Option<String> {
    node.attr(key).map(str::to_string)
}

fn fill_from(head: &Node, out: &mut HeadMetadata) {
    for child in head.children() {
        match child.name() {
            Some("title") if out.title.is_none() => {
                let text = child.text_content();
                let text = text.trim();
                if !text.is_empty() {
                    out.title = Some(text.to_string());
                }
            }
            Some("meta") => {
                let tag = MetaTag {
                    name: owned(child, "name"),
                    property: owned(child, "property"),
                    content: owned(child, "content"),
                };
                if tag.name.is_some() || tag.property.is_some() || tag.content.is_some() {
                    out.meta.push(tag);
                }
            }
            Some("link") => {
                let rel = child
                    .attr("rel")
                    .unwrap_or("")
                    .split_ascii_whitespace()
                    .map(str::to_ascii_lowercase)
                    .collect::<Vec<_>>();
                let href = owned(child, "href");
                if !rel.is_empty() || href.is_some() {
                    out.links.push(LinkTag { rel, href });
                }
            }
            Some("base") if out.base_href.is_none() => out.base_href = owned(child, "href"),
            _ => {}
        }
    }
}

/// `<title>` text of a parsed document, if any.
pub fn document_title(dom: &Node) -> Option<String> {
    let head = find_head(dom)?;
    let title = find_child_element(head, "title")?;
    Some(title.text_content().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;

    #[test]
    fn collects_title_meta_links_and_base() {
        let dom = parse_document(
            r#"<html><head>
                <title> Inbox </title>
                <meta name="turbo-cache-control" content="no-preview">
                <link rel="Stylesheet" href="/app.css">
                <link rel="icon" href="/favicon.ico">
                <base href="/root/">
            </head><body></body></html>"#,
        );
        let meta = extract_head_metadata(&dom);
        assert_eq!(meta.title.as_deref(), Some("Inbox"));
        assert_eq!(meta.meta_content("turbo-cache-control"), Some("no-preview"));
        assert_eq!(meta.meta_content("missing"), None);
        assert_eq!(meta.stylesheet_hrefs().collect::<Vec<_>>(), ["/app.css"]);
        assert_eq!(meta.base_href.as_deref(), Some("/root/"));
        assert_eq!(document_title(&dom).as_deref(), Some("Inbox"));
    }
}
