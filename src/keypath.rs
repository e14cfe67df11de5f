//! Escaping for identifiers used as store field-path keys.
//!
//! Field paths in the remote store are dot-delimited, so a user identifier
//! (an email address) cannot be used as a nested map key verbatim. This
//! module is the single place that knows the escaping scheme; callers only
//! ever compare and persist the escaped form.

/// Escape an identifier so it is safe as a field-path key.
///
/// `%` is escaped first so the transform stays reversible for inputs that
/// already contain the sentinel sequence.
pub fn escape_field_key(identifier: &str) -> String {
    identifier.replace('%', "%25").replace('.', "%2E")
}

/// Reverse [`escape_field_key`].
///
/// The engine itself never needs this (equality checks happen on the escaped
/// form), but the scheme must stay reversible for consumers that round-trip
/// keys back to display identifiers.
pub fn unescape_field_key(escaped: &str) -> String {
    escaped.replace("%2E", ".").replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_dots() {
        assert_eq!(escape_field_key("alice@example.com"), "alice@example%2Ecom");
    }

    #[test]
    fn test_round_trip() {
        for id in ["alice@example.com", "a.b.c@d.e", "no-dots@nodot", "odd%2Einput", "50%.done"] {
            assert_eq!(unescape_field_key(&escape_field_key(id)), id);
        }
    }

    #[test]
    fn test_escaped_forms_stay_distinct() {
        // An identifier that already looks escaped must not collide with the
        // escaped form of its unescaped twin.
        assert_ne!(
            escape_field_key("alice@example%2Ecom"),
            escape_field_key("alice@example.com")
        );
    }

    #[test]
    fn test_passthrough_without_special_chars() {
        assert_eq!(escape_field_key("user@host"), "user@host");
        assert_eq!(unescape_field_key("user@host"), "user@host");
    }
}
