//! Utilities for formatting
use std::fmt::Debug;

pub(crate) struct NoQuotes<'a>(pub &'a str);

impl<'a> Debug for NoQuotes<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formats a key or value.
/// - If it is valid UTF-8 and only contains visible characters other than
/// quotes, it is formatted as a quoted string.
/// - Otherwise it is shown as hex.
pub(crate) fn format_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        if s.chars().all(|c| c.is_ascii_graphic() && c != '"') {
            return format!("\"{s}\"");
        }
    }
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_printable_and_binary() {
        assert_eq!(format_bytes(b"apple"), r#""apple""#);
        assert_eq!(format_bytes(&[0, 1, 255]), "0001ff");
        assert_eq!(format_bytes(b"a b"), "612062");
        assert_eq!(format_bytes(b""), r#""""#);
    }
}
