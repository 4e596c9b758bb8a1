use crate::language::token::TokenKind;

/// The identifier characters immediately before `offset`, if any.
pub fn identifier_prefix_slice(text: &str, offset: usize) -> Option<&str> {
    if text.is_empty() {
        return None;
    }
    let len = text.len();
    let mut end = offset.min(len);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = text.as_bytes();
    let mut start = end;
    while start > 0 {
        let ch = bytes[start - 1];
        if is_ident_char(ch) {
            start -= 1;
        } else {
            break;
        }
    }
    if start == end {
        None
    } else {
        text.get(start..end)
    }
}

pub fn prefix_matches(name: &str, prefix: Option<&str>) -> bool {
    match prefix {
        Some(prefix) => name.starts_with(prefix),
        None => true,
    }
}

pub fn is_ident_string(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(is_ident_char)
}

pub fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

/// Zero-based line and column (in characters) of a byte offset.
pub fn offset_to_line_col(text: &str, offset: usize) -> (usize, usize) {
    let mut line = 0usize;
    let mut col = 0usize;
    for (idx, ch) in text.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Whether a token is a keyword or name that could be offered as typed.
pub fn is_keyword_like(kind: &TokenKind) -> bool {
    kind.as_ident().is_some_and(is_ident_string)
}
