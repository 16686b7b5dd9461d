use crate::types::{Attribute, Node, Token};

/// Build a value tree from a token stream.
///
/// Invariants:
/// - End tags close the nearest open element with that name; an end tag with
///   no matching open element is ignored.
/// - Elements still open at end of input are closed implicitly.
/// - Adjacent text tokens under the same parent are merged.
pub fn build_dom(tokens: &[Token]) -> Node {
    let mut arena = BuildArena::default();
    let root = arena.push(Pending::Document {
        doctype: None,
        children: Vec::new(),
    });
    let mut open: Vec<usize> = Vec::new();

    for token in tokens {
        let parent = open.last().copied().unwrap_or(root);
        match token {
            Token::Doctype(doctype) => arena.set_doctype(root, doctype.clone()),
            Token::Comment(text) => {
                arena.add_child(parent, Pending::Comment { text: text.clone() });
            }
            Token::Text(text) => {
                if !text.is_empty() && !arena.extend_trailing_text(parent, text) {
                    arena.add_child(parent, Pending::Text { text: text.clone() });
                }
            }
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                let index = arena.add_child(
                    parent,
                    Pending::Element {
                        name: name.clone(),
                        attributes: attributes.clone(),
                        children: Vec::new(),
                    },
                );
                if !*self_closing {
                    open.push(index);
                }
            }
            Token::EndTag(name) => {
                if let Some(depth) = open.iter().rposition(|&i| arena.is_element_named(i, name)) {
                    open.truncate(depth);
                }
            }
        }
    }

    arena.finish(root)
}

#[derive(Debug)]
enum Pending {
    Document {
        doctype: Option<String>,
        children: Vec<usize>,
    },
    Element {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<usize>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

impl Pending {
    fn children(&self) -> &[usize] {
        match self {
            Pending::Document { children, .. } | Pending::Element { children, .. } => children,
            Pending::Text { .. } | Pending::Comment { .. } => &[],
        }
    }
}

#[derive(Debug, Default)]
struct BuildArena {
    nodes: Vec<Pending>,
}

impl BuildArena {
    fn push(&mut self, node: Pending) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn add_child(&mut self, parent: usize, child: Pending) -> usize {
        let index = self.push(child);
        if let Pending::Document { children, .. } | Pending::Element { children, .. } =
            &mut self.nodes[parent]
        {
            children.push(index);
        }
        index
    }

    fn extend_trailing_text(&mut self, parent: usize, text: &str) -> bool {
        let Some(&last) = self.nodes[parent].children().last() else {
            return false;
        };
        if let Pending::Text { text: existing } = &mut self.nodes[last] {
            existing.push_str(text);
            return true;
        }
        false
    }

    fn set_doctype(&mut self, root: usize, value: String) {
        if let Pending::Document { doctype, .. } = &mut self.nodes[root] {
            *doctype = Some(value);
        }
    }

    fn is_element_named(&self, index: usize, target: &str) -> bool {
        matches!(&self.nodes[index], Pending::Element { name, .. } if name == target)
    }

    /// Iterative post-order conversion so deep markup cannot overflow the stack.
    fn finish(mut self, root: usize) -> Node {
        let mut built: Vec<Node> = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, bool)> = vec![(root, false)];

        while let Some((index, expanded)) = stack.pop() {
            if !expanded {
                stack.push((index, true));
                for &child in self.nodes[index].children().iter().rev() {
                    stack.push((child, false));
                }
                continue;
            }

            let child_count = self.nodes[index].children().len();
            let children = built.split_off(built.len() - child_count);
            let node = match &mut self.nodes[index] {
                Pending::Document { doctype, .. } => Node::Document {
                    doctype: doctype.take(),
                    children,
                },
                Pending::Element {
                    name, attributes, ..
                } => Node::Element {
                    name: std::mem::take(name),
                    attributes: std::mem::take(attributes),
                    children,
                },
                Pending::Text { text } => Node::Text {
                    text: std::mem::take(text),
                },
                Pending::Comment { text } => Node::Comment {
                    text: std::mem::take(text),
                },
            };
            built.push(node);
        }

        built.pop().unwrap_or(Node::Document {
            doctype: None,
            children: Vec::new(),
        })
    }
}
