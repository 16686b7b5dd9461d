/// Decode the small entity subset server-rendered markup actually uses.
///
/// Contract:
/// - Named: `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&nbsp;`.
/// - Numeric: `&#123;` and `&#x1F4A9;`, only when semicolon-terminated and a
///   valid Unicode scalar value.
/// - Anything else (unknown names, missing `;`, overlong digit runs) passes
///   through unchanged.
pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_one(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

const NAMED: &[(&str, char)] = &[
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&apos;", '\''),
    ("&nbsp;", '\u{00A0}'),
];

const MAX_HEX_DIGITS: usize = 6;
const MAX_DEC_DIGITS: usize = 7;

/// `tail` starts with `&`. Returns the decoded char and the number of bytes consumed.
fn decode_one(tail: &str) -> Option<(char, usize)> {
    for (name, ch) in NAMED {
        if tail.starts_with(name) {
            return Some((*ch, name.len()));
        }
    }

    let numeric = tail.strip_prefix("&#")?;
    let (digits_start, radix, max_digits) = match numeric.as_bytes().first() {
        Some(b'x') | Some(b'X') => (3, 16, MAX_HEX_DIGITS),
        _ => (2, 10, MAX_DEC_DIGITS),
    };
    let body = &tail[digits_start..];
    let end = body.find(';')?;
    let digits = &body[..end];
    if digits.is_empty()
        || digits.len() > max_digits
        || !digits.chars().all(|c| c.is_digit(radix))
    {
        return None;
    }
    let ch = u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)?;
    Some((ch, digits_start + end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_entities() {
        assert_eq!(
            decode_entities("a &amp; b &lt;c&gt; &quot;d&quot; &apos;e&apos;"),
            "a & b <c> \"d\" 'e'"
        );
        assert_eq!(decode_entities("x&nbsp;y"), "x\u{00A0}y");
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;&#X43;"), "ABC");
        assert_eq!(decode_entities("caf&#233;"), "caf\u{e9}");
    }

    #[test]
    fn leaves_malformed_sequences_alone() {
        assert_eq!(decode_entities("&copy; &amp &#; &#x; &#12a;"), "&copy; &amp &#; &#x; &#12a;");
        assert_eq!(decode_entities("&#99999999;"), "&#99999999;");
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
    }

    #[test]
    fn preserves_utf8_around_entities() {
        assert_eq!(decode_entities("\u{1F600}&amp;\u{e9}"), "\u{1F600}&\u{e9}");
    }
}
