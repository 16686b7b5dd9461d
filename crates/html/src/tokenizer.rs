//! Practical tokenizer for server-rendered HTML.
//!
//! Tag and attribute names are restricted to ASCII `[A-Za-z0-9:_-]` and are
//! lowercased. `script` and `style` bodies are raw text up to the matching
//! close tag. There is no HTML5 parse-error recovery; malformed markup is
//! tokenized on a best-effort basis and never rejected.
//!
//! Invariant: the scanner only cuts slices at ASCII structural bytes, so every
//! slice endpoint is a UTF-8 char boundary.
use crate::entities::decode_entities;
use crate::types::{Attribute, Token};
use memchr::memchr;

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

const RAWTEXT_ELEMENTS: &[&str] = &["script", "style"];

pub(crate) fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_name_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

fn starts_with_ignore_case(haystack: &[u8], at: usize, needle: &[u8]) -> bool {
    haystack.len() >= at + needle.len() && haystack[at..at + needle.len()].eq_ignore_ascii_case(needle)
}

/// Locate `</name` followed by optional ASCII whitespace and `>`.
/// Returns `(start_of_close_tag, end_after_gt)` relative to `haystack`.
fn find_rawtext_close(haystack: &str, name: &str) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        i += memchr(b'<', &bytes[i..])?;
        if bytes.get(i + 1) == Some(&b'/') && starts_with_ignore_case(bytes, i + 2, name.as_bytes()) {
            let mut k = i + 2 + name.len();
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if bytes.get(k) == Some(&b'>') {
                return Some((i, k + 1));
            }
        }
        i += 1;
    }
    None
}

struct Scanner<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            out: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_name_byte) {
            self.pos += 1;
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.text();
                continue;
            }
            let rest = &self.input[self.pos..];
            if rest.starts_with(COMMENT_OPEN) {
                self.comment();
            } else if starts_with_ignore_case(self.bytes, self.pos, b"<!doctype") {
                if !self.doctype() {
                    break;
                }
            } else if self.bytes.get(self.pos + 1) == Some(&b'/') {
                self.end_tag();
            } else if self.bytes.get(self.pos + 1).is_some_and(|c| c.is_ascii_alphabetic()) {
                if !self.start_tag() {
                    break;
                }
            } else {
                // A lone `<` that opens nothing is text.
                self.push_text("<");
                self.pos += 1;
            }
        }
        self.out
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Token::Text(prev)) = self.out.last_mut() {
            prev.push_str(text);
        } else {
            self.out.push(Token::Text(text.to_string()));
        }
    }

    fn text(&mut self) {
        let start = self.pos;
        let len = memchr(b'<', &self.bytes[start..]).unwrap_or(self.bytes.len() - start);
        self.pos = start + len;
        let decoded = decode_entities(&self.input[start..self.pos]);
        self.push_text(&decoded);
    }

    fn comment(&mut self) {
        let body_start = self.pos + COMMENT_OPEN.len();
        match self.input[body_start..].find(COMMENT_CLOSE) {
            Some(end) => {
                self.out
                    .push(Token::Comment(self.input[body_start..body_start + end].to_string()));
                self.pos = body_start + end + COMMENT_CLOSE.len();
            }
            None => {
                self.out.push(Token::Comment(self.input[body_start..].to_string()));
                self.pos = self.bytes.len();
            }
        }
    }

    fn doctype(&mut self) -> bool {
        let body_start = self.pos + 2;
        match self.input[body_start..].find('>') {
            Some(end) => {
                let body = self.input[body_start..body_start + end].trim().to_string();
                self.out.push(Token::Doctype(body));
                self.pos = body_start + end + 1;
                true
            }
            None => false,
        }
    }

    fn end_tag(&mut self) {
        self.pos += 2;
        let name = self.take_name();
        match memchr(b'>', &self.bytes[self.pos..]) {
            Some(gt) => self.pos += gt + 1,
            None => self.pos = self.bytes.len(),
        }
        if !name.is_empty() {
            self.out.push(Token::EndTag(name));
        }
    }

    fn attribute_value(&mut self) -> String {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                let len = memchr(quote, &self.bytes[start..]).unwrap_or(self.bytes.len() - start);
                self.pos = start + len;
                let raw = &self.input[start..self.pos];
                if self.pos < self.bytes.len() {
                    self.pos += 1;
                }
                decode_entities(raw)
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_ascii_whitespace() || c == b'>' {
                        break;
                    }
                    if c == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>') {
                        break;
                    }
                    self.pos += 1;
                }
                decode_entities(&self.input[start..self.pos])
            }
        }
    }

    /// Returns false when input ends inside the tag.
    fn start_tag(&mut self) -> bool {
        self.pos += 1;
        let name = self.take_name();
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return false,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() == Some(b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                Some(c) if is_name_byte(c) => {
                    let key = self.take_name();
                    self.skip_whitespace();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Some(self.attribute_value())
                    } else {
                        None
                    };
                    // First occurrence wins for duplicate attributes.
                    if !attributes.iter().any(|(k, _)| *k == key) {
                        attributes.push((key, value));
                    }
                }
                Some(_) => self.pos += 1,
            }
        }

        let self_closing = self_closing || is_void_element(&name);
        let rawtext = !self_closing && RAWTEXT_ELEMENTS.contains(&name.as_str());
        self.out.push(Token::StartTag {
            name: name.clone(),
            attributes,
            self_closing,
        });

        if rawtext {
            let body_start = self.pos;
            let rest = &self.input[body_start..];
            let (body_end, resume) = match find_rawtext_close(rest, &name) {
                Some((close, after)) => (body_start + close, body_start + after),
                None => (self.bytes.len(), self.bytes.len()),
            };
            let body = &self.input[body_start..body_end];
            if !body.is_empty() {
                self.out.push(Token::Text(body.to_string()));
            }
            self.out.push(Token::EndTag(name));
            self.pos = resume;
        }
        true
    }
}

pub fn tokenize(input: &str) -> Vec<Token> {
    Scanner::new(input).run()
}
