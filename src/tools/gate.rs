//! Pre-dispatch argument validation
//!
//! Identifier lookups against the CRM cost an upstream round-trip, so
//! implausible identifiers are rejected before any network call.

/// Whether a lookup identifier is plausibly an email address or phone number
///
/// An email must contain both `@` and `.`; a phone number must contain at
/// least seven ASCII digits. Anything else (a bare name, a short numeric
/// string) is rejected.
///
/// # Examples
///
/// ```
/// use attache::tools::gate::plausible_identifier;
///
/// assert!(plausible_identifier("a@b.com"));
/// assert!(plausible_identifier("+92 300 1234567"));
/// assert!(!plausible_identifier("Taha"));
/// assert!(!plausible_identifier("12345"));
/// ```
pub fn plausible_identifier(value: &str) -> bool {
    plausible_email(value) || plausible_phone(value)
}

fn plausible_email(value: &str) -> bool {
    value.contains('@') && value.contains('.')
}

fn plausible_phone(value: &str) -> bool {
    value.chars().filter(|c| c.is_ascii_digit()).count() >= 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_email() {
        assert!(plausible_identifier("a@b.com"));
        assert!(plausible_identifier("first.last@example.co.uk"));
    }

    #[test]
    fn test_accepts_phone_with_formatting() {
        assert!(plausible_identifier("+923001234567"));
        assert!(plausible_identifier("(555) 123-4567"));
        assert!(plausible_identifier("1234567"));
    }

    #[test]
    fn test_rejects_bare_name() {
        assert!(!plausible_identifier("Taha"));
        assert!(!plausible_identifier(""));
    }

    #[test]
    fn test_rejects_short_digit_string() {
        assert!(!plausible_identifier("12345"));
        assert!(!plausible_identifier("123456"));
    }

    #[test]
    fn test_rejects_email_missing_dot_or_at() {
        assert!(!plausible_identifier("a@b"));
        assert!(!plausible_identifier("a.b.com"));
    }
}
