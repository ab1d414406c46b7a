/// Literal escaping for SQL text.
///
/// Values embedded in statements are wrapped in single quotes and escaped
/// with the rules of the active client library. Bytes a quoted literal cannot
/// carry are written as a hex literal instead.

/// Escaping rules of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeStyle {
    /// MySQL client rules: `\0 \n \r \\ \' \" \Z` backslash sequences.
    Backslash,
    /// SQL standard: a quote inside a literal is written twice. A NUL ends
    /// the statement text, so input containing one is hex encoded.
    Standard,
}

/// Produces a literal for `input`.
///
/// UTF-8 input becomes a single-quoted literal; anything else (and NUL bytes
/// under [`EscapeStyle::Standard`]) becomes `X'..'`, which both backends read
/// back as the exact bytes. An empty input yields `''`.
pub fn escape(input: &[u8], style: EscapeStyle) -> String {
    match std::str::from_utf8(input) {
        Ok(text) if style == EscapeStyle::Backslash || !text.contains('\0') => {
            quote(text, style)
        }
        _ => format!("X'{}'", hex::encode_upper(input)),
    }
}

fn quote(text: &str, style: EscapeStyle) -> String {
    // worst case is every byte escaped, plus the two quotes
    let mut escaped = String::with_capacity(text.len() * 2 + 3);
    escaped.push('\'');
    for c in text.chars() {
        match (style, c) {
            (EscapeStyle::Backslash, '\0') => escaped.push_str("\\0"),
            (EscapeStyle::Backslash, '\n') => escaped.push_str("\\n"),
            (EscapeStyle::Backslash, '\r') => escaped.push_str("\\r"),
            (EscapeStyle::Backslash, '\\') => escaped.push_str("\\\\"),
            (EscapeStyle::Backslash, '\'') => escaped.push_str("\\'"),
            (EscapeStyle::Backslash, '"') => escaped.push_str("\\\""),
            (EscapeStyle::Backslash, '\x1a') => escaped.push_str("\\Z"),
            (EscapeStyle::Standard, '\'') => escaped.push_str("''"),
            _ => escaped.push(c),
        }
    }
    escaped.push('\'');
    escaped
}
