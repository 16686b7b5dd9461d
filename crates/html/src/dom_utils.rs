use crate::Node;

pub fn find_child_element<'a>(node: &'a Node, name: &str) -> Option<&'a Node> {
    node.children().iter().find(|c| c.is_element_named(name))
}

pub fn find_html(dom: &Node) -> Option<&Node> {
    match dom {
        Node::Document { .. } => find_child_element(dom, "html"),
        Node::Element { .. } if dom.is_element_named("html") => Some(dom),
        _ => None,
    }
}

pub fn find_head(dom: &Node) -> Option<&Node> {
    find_child_element(find_html(dom)?, "head")
}

pub fn find_body(dom: &Node) -> Option<&Node> {
    find_child_element(find_html(dom)?, "body")
}

/// First element in pre-order with this non-empty id.
pub fn find_element_by_id<'a>(node: &'a Node, id: &str) -> Option<&'a Node> {
    if node.id_attr() == Some(id) {
        return Some(node);
    }
    node.children()
        .iter()
        .find_map(|c| find_element_by_id(c, id))
}

/// Every element in pre-order that carries `attr`.
pub fn collect_elements_with_attr<'a>(node: &'a Node, attr: &str, out: &mut Vec<&'a Node>) {
    if node.has_attr(attr) {
        out.push(node);
    }
    for child in node.children() {
        collect_elements_with_attr(child, attr, out);
    }
}

/// Non-empty ids in pre-order, duplicates included.
pub fn collect_ids<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    if let Some(id) = node.id_attr() {
        out.push(id);
    }
    for child in node.children() {
        collect_ids(child, out);
    }
}

/// Collect `<link rel="stylesheet" href>` values.
pub fn collect_stylesheet_hrefs(node: &Node, out: &mut Vec<String>) {
    if node.is_element_named("link")
        && node
            .attr("rel")
            .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
    {
        if let Some(href) = node.attr("href") {
            out.push(href.to_string());
        }
    }
    for child in node.children() {
        collect_stylesheet_hrefs(child, out);
    }
}

/// Indented one-line-per-node outline, capped at `cap` nodes.
pub fn outline_from_dom(root: &Node, cap: usize) -> Vec<String> {
    fn clip(text: &str) -> String {
        let flat = text.replace('\n', " ");
        let flat = flat.trim();
        match flat.char_indices().nth(40) {
            Some((cut, _)) => format!("{}\u{2026}", &flat[..cut]),
            None => flat.to_string(),
        }
    }

    fn walk(node: &Node, depth: usize, out: &mut Vec<String>, left: &mut usize) {
        if *left == 0 {
            return;
        }
        *left -= 1;
        let indent = "  ".repeat(depth);
        match node {
            Node::Document { doctype, .. } => match doctype {
                Some(dt) => out.push(format!("{indent}<!{dt}>")),
                None => out.push(format!("{indent}#document")),
            },
            Node::Element { name, .. } => {
                let mut line = format!("{indent}<{name}");
                for key in ["id", "class"] {
                    if let Some(value) = node.attr(key).filter(|v| !v.is_empty()) {
                        line.push_str(&format!(r#" {key}="{value}""#));
                    }
                }
                line.push('>');
                out.push(line);
            }
            Node::Text { text } => {
                let shown = clip(text);
                if !shown.is_empty() {
                    out.push(format!("{indent}\"{shown}\""));
                }
            }
            Node::Comment { text } => out.push(format!("{indent}<!-- {} -->", clip(text))),
        }
        for child in node.children() {
            walk(child, depth + 1, out, left);
        }
    }

    let mut out = Vec::new();
    let mut left = cap;
    walk(root, 0, &mut out, &mut left);
    out
}
