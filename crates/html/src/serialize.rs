use crate::tokenizer::is_void_element;
use crate::types::{Attribute, Node};

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn write_start_tag(name: &str, attributes: &[Attribute], out: &mut String) {
    out.push('<');
    out.push_str(name);
    for (key, value) in attributes {
        out.push(' ');
        out.push_str(key);
        if let Some(value) = value {
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
    }
    out.push('>');
}

pub(crate) fn is_rawtext(name: &str) -> bool {
    matches!(name, "script" | "style")
}

pub(crate) fn write_text(parent: Option<&str>, text: &str, out: &mut String) {
    if parent.is_some_and(is_rawtext) {
        out.push_str(text);
    } else {
        escape_text(text, out);
    }
}

pub(crate) fn write_end_tag(name: &str, out: &mut String) {
    if !is_void_element(name) {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

fn write_node(node: &Node, parent: Option<&str>, out: &mut String) {
    match node {
        Node::Document { doctype, children } => {
            if let Some(doctype) = doctype {
                out.push_str("<!");
                out.push_str(doctype);
                out.push('>');
            }
            for child in children {
                write_node(child, None, out);
            }
        }
        Node::Element {
            name,
            attributes,
            children,
        } => {
            write_start_tag(name, attributes, out);
            for child in children {
                write_node(child, Some(name), out);
            }
            write_end_tag(name, out);
        }
        Node::Text { text } => write_text(parent, text, out),
        Node::Comment { text } => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

/// Serialize a value tree back to markup that re-parses to the same tree.
pub fn to_html(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, None, &mut out);
    out
}

/// Serialize only the children of `node`.
pub fn inner_html(node: &Node) -> String {
    let mut out = String::new();
    for child in node.children() {
        write_node(child, node.name(), &mut out);
    }
    out
}
