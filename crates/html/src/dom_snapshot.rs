use crate::Node;
use std::fmt;

/// Deterministic line-per-node rendering of a value tree for test comparisons.
/// Not a stable format.
///
/// Equivalence rules:
/// - Node kinds and element names must match.
/// - Attributes are compared in order, names and values exact.
/// - Text must match exactly, unless `ignore_whitespace_text` drops
///   whitespace-only runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DomSnapshotOptions {
    pub ignore_whitespace_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomSnapshot {
    lines: Vec<String>,
}

impl DomSnapshot {
    pub fn new(root: &Node, options: DomSnapshotOptions) -> Self {
        let mut lines = Vec::new();
        walk(root, &options, 0, &mut lines);
        Self { lines }
    }

    pub fn as_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for DomSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn walk(node: &Node, options: &DomSnapshotOptions, depth: usize, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match node {
        Node::Document { doctype, .. } => {
            out.push(format!("{indent}#document doctype={doctype:?}"));
        }
        Node::Element {
            name, attributes, ..
        } => {
            let mut line = format!("{indent}<{name}");
            for (key, value) in attributes {
                match value {
                    Some(value) => line.push_str(&format!(" {key}={value:?}")),
                    None => line.push_str(&format!(" {key}")),
                }
            }
            line.push('>');
            out.push(line);
        }
        Node::Text { text } => {
            if options.ignore_whitespace_text && text.trim().is_empty() {
                return;
            }
            out.push(format!("{indent}#text {text:?}"));
        }
        Node::Comment { text } => out.push(format!("{indent}#comment {text:?}")),
    }
    for child in node.children() {
        walk(child, options, depth + 1, out);
    }
}

/// First differing line between two trees, with both renderings for context.
pub fn compare_dom(expected: &Node, actual: &Node, options: DomSnapshotOptions) -> Result<(), String> {
    let expected = DomSnapshot::new(expected, options);
    let actual = DomSnapshot::new(actual, options);
    if expected == actual {
        return Ok(());
    }
    let line = expected
        .as_lines()
        .iter()
        .zip(actual.as_lines())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected.as_lines().len().min(actual.as_lines().len()));
    Err(format!(
        "dom mismatch at line {line}\n--- expected\n{expected}\n--- actual\n{actual}"
    ))
}

pub fn assert_dom_eq(expected: &Node, actual: &Node, options: DomSnapshotOptions) {
    if let Err(report) = compare_dom(expected, actual, options) {
        panic!("{report}");
    }
}
