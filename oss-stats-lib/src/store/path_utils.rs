//! Path utilities for safe filesystem operations.

use core::fmt::Write;

/// Encode a record key as a single file name component.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte is written as `%XX`.
/// The encoding is injective, so distinct keys never share a file, and the result never
/// contains a path separator or a `.` that could form a traversal sequence.
#[must_use]
pub fn encode_key_component(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(encode_key_component("react-query"), "react-query");
        assert_eq!(encode_key_component("query_core"), "query_core");
    }

    #[test]
    fn separators_and_dots_are_escaped() {
        assert_eq!(encode_key_component(".."), "%2E%2E");
        assert_eq!(encode_key_component("../../etc/passwd"), "%2E%2E%2F%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_key_component("a\\b:c"), "a%5Cb%3Ac");
    }

    #[test]
    fn scoped_package_key() {
        assert_eq!(
            encode_key_component("@tanstack/query|2024-01-01"),
            "%40tanstack%2Fquery%7C2024-01-01"
        );
    }

    #[test]
    fn encoding_is_injective() {
        assert_ne!(encode_key_component("a/b"), encode_key_component("a_b"));
        assert_ne!(encode_key_component("a%2Fb"), encode_key_component("a/b"));
    }
}
