/// Incremental UTF-8 decoding for byte sources that arrive in arbitrary chunks.
///
/// Multi-byte sequences split across chunks are carried over to the next
/// call; invalid sequences become U+FFFD and decoding continues.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of an incomplete sequence held back from the last chunk (at most 3).
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    /// Decode `bytes` and append the text to `out`.
    pub fn push(&mut self, bytes: &[u8], out: &mut String) {
        let mut rest = bytes;

        while !self.carry.is_empty() && !rest.is_empty() {
            let want = sequence_len(self.carry[0]);
            if want == 0 {
                out.push('\u{FFFD}');
                self.carry.clear();
                break;
            }
            let missing = want.saturating_sub(self.carry.len());
            let take = missing.min(rest.len());
            self.carry.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.carry.len() < want {
                return;
            }
            let joined = std::mem::take(&mut self.carry);
            self.decode(&joined, out);
        }

        if !rest.is_empty() {
            self.decode(rest, out);
        }
    }

    /// Flush a trailing incomplete sequence so the stream is never silently truncated.
    pub fn finish(&mut self, out: &mut String) {
        if self.carry.is_empty() {
            return;
        }
        out.push_str(&String::from_utf8_lossy(&self.carry));
        self.carry.clear();
    }

    fn decode(&mut self, mut bytes: &[u8], out: &mut String) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, tail) = bytes.split_at(err.valid_up_to());
                    if let Ok(prefix) = std::str::from_utf8(valid) {
                        out.push_str(prefix);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            bytes = &tail[len..];
                        }
                        None => {
                            self.carry.extend_from_slice(tail);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn sequence_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_byte_char_split_across_chunks() {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();

        decoder.push(&[0xC3], &mut text);
        assert_eq!(text, "");
        assert_eq!(decoder.pending(), &[0xC3]);

        decoder.push(&[0x97], &mut text);
        assert_eq!(text, "\u{D7}");
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn carry_resolves_then_rest_of_chunk_decodes() {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();

        decoder.push(&[0xF0, 0x9F], &mut text);
        decoder.push(&[0x98, 0x80, b'!'], &mut text);
        assert_eq!(text, "\u{1F600}!");
    }

    #[test]
    fn carry_survives_a_one_byte_chunk() {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();

        decoder.push(&[0xE2], &mut text);
        decoder.push(&[0x82], &mut text);
        assert_eq!(decoder.pending(), &[0xE2, 0x82]);
        decoder.push(&[0xAC, b'x'], &mut text);
        assert_eq!(text, "\u{20AC}x");
    }

    #[test]
    fn invalid_bytes_make_progress() {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();

        decoder.push(&[0xFF, b'f'], &mut text);
        assert_eq!(text, "\u{FFFD}f");
    }

    #[test]
    fn incomplete_suffix_is_flushed_on_finish() {
        let mut decoder = Utf8Decoder::new();
        let mut text = String::new();

        decoder.push(&[b'a', 0xE2, 0x82], &mut text);
        assert_eq!(text, "a");
        decoder.finish(&mut text);
        assert_eq!(text, "a\u{FFFD}");
        assert!(decoder.pending().is_empty());
    }
}
