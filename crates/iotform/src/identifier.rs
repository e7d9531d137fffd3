//! Deterministic identifiers for resources created without a name.

/// Length of the token-derived suffix.
const SUFFIX_LEN: usize = 12;

/// Returns the stack name from a stack ARN like
/// `arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/<guid>`.
///
/// Anything that is not shaped like a stack ARN is returned as-is.
pub fn stack_name(stack_id: &str) -> &str {
    let mut segments = stack_id.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(head), Some(name), Some(_)) if head.ends_with(":stack") => name,
        _ => stack_id,
    }
}

/// Returns the first `SUFFIX_LEN` characters of the base32 sha256 digest of
/// the client request token.
fn token_suffix(client_request_token: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, client_request_token.as_bytes());
    let mut encoded = data_encoding::BASE32_NOPAD.encode(digest.as_ref());
    encoded.truncate(SUFFIX_LEN);
    encoded
}

/// Generates a resource identifier of at most `max_length` characters.
///
/// The identifier is `<stack name>-<logical id>-<suffix>`, with the prefix
/// truncated to make room for the suffix. The suffix is derived from the
/// client request token only, so retries of the same request generate the
/// same identifier.
pub fn generate(
    stack_id: Option<&str>,
    logical_id: Option<&str>,
    client_request_token: &str,
    max_length: usize,
) -> String {
    let prefix = [stack_id.map(stack_name), logical_id]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = token_suffix(client_request_token);
    log::trace!("generating identifier from '{prefix}' and token suffix {suffix}");

    let prefix_budget = max_length.saturating_sub(SUFFIX_LEN + 1);
    let prefix = prefix.chars().take(prefix_budget).collect::<String>();
    let prefix = prefix.trim_end_matches('-');
    let identifier = if prefix.is_empty() {
        suffix
    } else {
        format!("{prefix}-{suffix}")
    };
    identifier.chars().take(max_length).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_from_stack_and_logical_id() {
        let id = generate(Some("my-stack"), Some("MyResourceName"), "MyToken", 128);
        assert!(id.contains("my-stack"), "{id}");
        assert!(id.contains("MyRes"), "{id}");
        assert!(id.len() > 20, "{id}");
    }

    #[test]
    fn generation_is_idempotent() {
        for token in ["MyToken", "", "3d6c21a0-4f9e-4ad0-a8a1-3c1e6a0b2f55"] {
            let a = generate(Some("my-stack"), Some("Thing"), token, 64);
            let b = generate(Some("my-stack"), Some("Thing"), token, 64);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn distinct_tokens_generate_distinct_identifiers() {
        let a = generate(Some("my-stack"), Some("Thing"), "token-a", 64);
        let b = generate(Some("my-stack"), Some("Thing"), "token-b", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn stack_arns_contribute_their_name() {
        let arn = "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/0a1b2c3d";
        assert_eq!("my-stack", stack_name(arn));
        assert_eq!("plain", stack_name("plain"));

        let id = generate(Some(arn), Some("Logical"), "token", 128);
        assert!(id.starts_with("my-stack-Logical-"), "{id}");
    }

    #[test]
    fn never_exceeds_max_length() {
        let long = "L".repeat(300);
        for max in [1, 12, 13, 14, 20, 64, 128] {
            let id = generate(Some("my-stack"), Some(&long), "token", max);
            assert!(id.len() <= max, "{max}: {id}");
        }
        let id = generate(Some("my-stack"), Some(&long), "token", 40);
        assert_eq!(40, id.len());
        assert!(id.starts_with("my-stack-LLL"), "{id}");
    }

    #[test]
    fn truncation_at_a_separator_leaves_no_double_dash() {
        // the prefix budget of 9 ends right after "my-stack-"
        let id = generate(Some("my-stack"), Some("Logical"), "token", 22);
        assert!(!id.contains("--"), "{id}");
        assert!(id.starts_with("my-stack-"), "{id}");
        assert_eq!("my-stack-".len() + SUFFIX_LEN, id.len());

        let id = generate(Some("a-"), Some("-"), "token", 128);
        assert!(!id.contains("--"), "{id}");
    }

    #[test]
    fn missing_stack_and_logical_id() {
        let id = generate(None, None, "token", 128);
        assert_eq!(SUFFIX_LEN, id.len());
    }
}
