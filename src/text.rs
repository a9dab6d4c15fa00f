//! Text helpers shared by hover, definition, and completion: offset/word
//! lookups, plus a minimal URI and offset/position implementation for the
//! percent-encoding and line-splitting rules a `TextDocument` needs.

use crate::ast::LineIndex;

/// True for the identifier characters a `CONFIG_` name or bare Kconfig
/// symbol is made of.
fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The word touching `offset` in `source`, if any.
pub fn word_at_offset(source: &str, offset: usize) -> Option<String> {
    let bytes = source.as_bytes();
    if offset > bytes.len() {
        return None;
    }
    // A cursor sitting exactly between two words belongs to the word on
    // its left if there's nothing to its right.
    let probe = if offset < bytes.len() { offset } else { offset.saturating_sub(1) };
    if probe >= bytes.len() || !is_word_char(bytes[probe]) {
        return None;
    }
    let mut start = probe;
    while start > 0 && is_word_char(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = probe;
    while end < bytes.len() && is_word_char(bytes[end]) {
        end += 1;
    }
    Some(source[start..end].to_string())
}

/// The run of word characters immediately before `offset`, for completion.
pub fn prefix_at_offset(source: &str, offset: usize) -> String {
    let bytes = source.as_bytes();
    let offset = offset.min(bytes.len());
    let mut start = offset;
    while start > 0 && is_word_char(bytes[start - 1]) {
        start -= 1;
    }
    source[start..offset].to_string()
}

/// Strips a leading `CONFIG_` from a word, if present — word_at_offset over
/// a `.conf` line returns the whole `CONFIG_FOO` token.
pub fn strip_config_prefix(word: &str) -> &str {
    word.strip_prefix("CONFIG_").unwrap_or(word)
}

/// A minimal `file://` URI: scheme, authority (usually empty), and path.
/// Percent-decodes path components on parse, percent-encodes them back on
/// `to_string`, so `parse(s).to_string() == s` for any well-formed input
/// (parsing then stringifying a URI round-trips to the original).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub authority: String,
    pub path: String,
}

impl Uri {
    pub fn parse(s: &str) -> Option<Uri> {
        let (scheme, rest) = s.split_once("://")?;
        let (authority, encoded_path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        Some(Uri {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: percent_decode(encoded_path),
        })
    }

    /// The final path component, e.g. `"b.txt"` for `/a/b.txt`.
    pub fn basename(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, percent_encode(&self.path))
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'/' | b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// A text buffer plus its line-offset index, supporting the offset↔position
/// round trips and `replace` semantics a text-document buffer store needs.
/// `Position` is `(line, character)`, both 0-based and UTF-16-oblivious
/// (byte-offset columns), matching `LineIndex`.
#[derive(Debug, Clone)]
pub struct TextDocument {
    pub text: String,
    lines: LineIndex,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> TextDocument {
        let text = text.into();
        let lines = LineIndex::new(&text);
        TextDocument { text, lines }
    }

    pub fn offset(&self, line: u32, character: u32) -> usize {
        self.lines.offset(line, character)
    }

    pub fn pos(&self, offset: usize) -> (u32, u32) {
        self.lines.line_col(offset)
    }

    /// Replace the byte range `[start, end)` with `s`, recomputing the line
    /// index. Any `(start, end)` the caller's already-validated range laws
    /// hold is accepted; out-of-range bounds are clamped to the text length.
    pub fn replace(&mut self, start: usize, end: usize, s: &str) {
        let start = start.min(self.text.len());
        let end = end.min(self.text.len()).max(start);
        self.text.replace_range(start..end, s);
        self.lines = LineIndex::new(&self.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_parse_extracts_path_and_basename() {
        let uri = Uri::parse("file:///a/b.txt").unwrap();
        assert_eq!(uri.path, "/a/b.txt");
        assert_eq!(uri.basename(), "b.txt");
    }

    #[test]
    fn uri_roundtrips_through_display() {
        let s = "file:///a/b.txt";
        let uri = Uri::parse(s).unwrap();
        assert_eq!(uri.to_string(), s);
    }

    #[test]
    fn uri_percent_decodes_path() {
        let uri = Uri::parse("file:///a%20b/c.txt").unwrap();
        assert_eq!(uri.path, "/a b/c.txt");
    }

    #[test]
    fn text_document_offset_pos_roundtrip() {
        let doc = TextDocument::new("one\ntwo\nthree\n");
        for offset in [0usize, 4, 8, 13] {
            let (line, col) = doc.pos(offset);
            assert_eq!(doc.offset(line, col), offset);
        }
    }

    #[test]
    fn text_document_replace_updates_substring() {
        let mut doc = TextDocument::new("CONFIG_FOO=n\n");
        let start = doc.text.find('n').unwrap();
        doc.replace(start, start + 1, "y");
        assert_eq!(&doc.text[start..start + 1], "y");
    }

    #[test]
    fn word_at_offset_finds_enclosing_identifier() {
        let src = "CONFIG_FOO=y\n";
        assert_eq!(word_at_offset(src, 3).as_deref(), Some("CONFIG_FOO"));
        assert_eq!(strip_config_prefix(&word_at_offset(src, 3).unwrap()), "FOO");
    }

    #[test]
    fn prefix_at_offset_is_partial_word() {
        let src = "CONFIG_FO";
        assert_eq!(prefix_at_offset(src, src.len()), "CONFIG_FO");
    }
}
