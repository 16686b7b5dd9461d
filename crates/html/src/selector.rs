//! Selector subset used to target stream actions.
//!
//! Grammar: comma-separated lists of descendant chains of compound selectors.
//! A compound is an optional type (`div`, `*`) followed by any number of
//! `#id`, `.class`, `[attr]` and `[attr=value]` parts.
//!
//! Invariants:
//! - Type and attribute names compare ASCII case-insensitively.
//! - Id, class and attribute values compare exactly.
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    HasAttr(String),
    AttrEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    pub parts: Vec<SimpleSelector>,
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    pub compounds: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub alternatives: Vec<Complex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError {
    pub input: String,
    pub reason: &'static str,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid selector {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for SelectorError {}

/// Element access needed for matching; implemented by the live document.
pub trait ElementRef: Copy {
    fn tag_name(&self) -> Option<&str>;
    fn attribute(&self, key: &str) -> Option<&str>;
    fn parent_element(&self) -> Option<Self>;
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

fn parse_compound(source: &str, input: &str) -> Result<Compound, SelectorError> {
    let err = |reason| SelectorError {
        input: input.to_string(),
        reason,
    };
    let mut parts = Vec::new();
    let mut chars = source.chars().peekable();

    if chars.peek() == Some(&'*') {
        chars.next();
        parts.push(SimpleSelector::Universal);
    } else if chars.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
        parts.push(SimpleSelector::Type(take_ident(&mut chars).to_ascii_lowercase()));
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let id = take_ident(&mut chars);
                if id.is_empty() {
                    return Err(err("empty id"));
                }
                parts.push(SimpleSelector::Id(id));
            }
            '.' => {
                let class = take_ident(&mut chars);
                if class.is_empty() {
                    return Err(err("empty class"));
                }
                parts.push(SimpleSelector::Class(class));
            }
            '[' => {
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(err("unterminated attribute selector"));
                }
                let part = match body.split_once('=') {
                    Some((key, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        SimpleSelector::AttrEquals(
                            key.trim().to_ascii_lowercase(),
                            value.to_string(),
                        )
                    }
                    None => SimpleSelector::HasAttr(body.trim().to_ascii_lowercase()),
                };
                if matches!(&part, SimpleSelector::HasAttr(k) | SimpleSelector::AttrEquals(k, _) if k.is_empty())
                {
                    return Err(err("empty attribute name"));
                }
                parts.push(part);
            }
            _ => return Err(err("unsupported syntax")),
        }
    }

    if parts.is_empty() {
        return Err(err("empty compound"));
    }
    Ok(Compound { parts })
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<SelectorList, SelectorError> {
        let mut alternatives = Vec::new();
        for alternative in input.split(',') {
            let compounds = alternative
                .split_ascii_whitespace()
                .map(|c| parse_compound(c, input))
                .collect::<Result<Vec<_>, _>>()?;
            if compounds.is_empty() {
                return Err(SelectorError {
                    input: input.to_string(),
                    reason: "empty selector",
                });
            }
            alternatives.push(Complex { compounds });
        }
        Ok(SelectorList { alternatives })
    }

    pub fn matches<E: ElementRef>(&self, element: E) -> bool {
        self.alternatives.iter().any(|c| c.matches(element))
    }
}

impl Compound {
    pub fn matches<E: ElementRef>(&self, element: E) -> bool {
        let Some(name) = element.tag_name() else {
            return false;
        };
        self.parts.iter().all(|part| match part {
            SimpleSelector::Universal => true,
            SimpleSelector::Type(t) => name.eq_ignore_ascii_case(t),
            SimpleSelector::Id(want) => element.attribute("id") == Some(want.as_str()),
            SimpleSelector::Class(want) => element
                .attribute("class")
                .is_some_and(|list| list.split_ascii_whitespace().any(|c| c == want)),
            SimpleSelector::HasAttr(key) => element.attribute(key).is_some(),
            SimpleSelector::AttrEquals(key, want) => element.attribute(key) == Some(want.as_str()),
        })
    }
}

impl Complex {
    pub fn matches<E: ElementRef>(&self, element: E) -> bool {
        let Some((last, ancestors)) = self.compounds.split_last() else {
            return false;
        };
        if !last.matches(element) {
            return false;
        }
        // Greedy right-to-left ancestor walk is exact for descendant-only chains.
        let mut cursor = element.parent_element();
        for compound in ancestors.iter().rev() {
            loop {
                let Some(candidate) = cursor else {
                    return false;
                };
                cursor = candidate.parent_element();
                if compound.matches(candidate) {
                    break;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Fake<'a> {
        chain: &'a [(&'a str, &'a [(&'a str, &'a str)])],
        depth: usize,
    }

    impl<'a> ElementRef for Fake<'a> {
        fn tag_name(&self) -> Option<&str> {
            Some(self.chain[self.depth].0)
        }
        fn attribute(&self, key: &str) -> Option<&str> {
            self.chain[self.depth]
                .1
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
        }
        fn parent_element(&self) -> Option<Self> {
            self.depth.checked_sub(1).map(|depth| Fake {
                chain: self.chain,
                depth,
            })
        }
    }

    const CHAIN: &[(&str, &[(&str, &str)])] = &[
        ("section", &[("id", "main")]),
        ("ul", &[("class", "list wide")]),
        ("li", &[("class", "item"), ("data-state", "on")]),
    ];

    fn leaf() -> Fake<'static> {
        Fake {
            chain: CHAIN,
            depth: 2,
        }
    }

    #[test]
    fn parses_compounds_and_lists() {
        let list = SelectorList::parse("li.item, #main").unwrap();
        assert_eq!(list.alternatives.len(), 2);
        assert_eq!(
            list.alternatives[0].compounds[0].parts,
            vec![
                SimpleSelector::Type("li".into()),
                SimpleSelector::Class("item".into())
            ]
        );
    }

    #[test]
    fn matches_simple_forms() {
        for source in ["li", "*", ".item", "[data-state]", "[data-state=on]", "LI.item"] {
            let list = SelectorList::parse(source).unwrap();
            assert!(list.matches(leaf()), "{source} should match");
        }
        for source in ["p", ".wide", "[data-state=off]", "#main"] {
            let list = SelectorList::parse(source).unwrap();
            assert!(!list.matches(leaf()), "{source} should not match");
        }
    }

    #[test]
    fn descendant_chains_walk_ancestors() {
        assert!(SelectorList::parse("#main li").unwrap().matches(leaf()));
        assert!(SelectorList::parse("section .wide .item").unwrap().matches(leaf()));
        assert!(!SelectorList::parse("li section").unwrap().matches(leaf()));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("a,").is_err());
        assert!(SelectorList::parse("[x").is_err());
        assert!(SelectorList::parse("a > b").is_err());
        assert!(SelectorList::parse("#").is_err());
    }
}
