//! Chat-completions endpoint resolution.

/// Path suffix every resolved endpoint ends with.
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Normalizes a user-supplied base URL into a chat-completions endpoint.
///
/// 1. A URL that already contains `/chat/completions` is returned as is.
/// 2. Otherwise one trailing `/` is stripped.
/// 3. `/chat/completions` is appended when the URL already has a versioned
///    segment such as `/v1`, and `/v1/chat/completions` otherwise.
///
/// Applying the resolver to its own output returns the same URL.
///
/// ```
/// use product_council::config::resolve_endpoint;
///
/// assert_eq!(resolve_endpoint("http://h/v1"), "http://h/v1/chat/completions");
/// assert_eq!(resolve_endpoint("http://h/"), "http://h/v1/chat/completions");
/// ```
pub fn resolve_endpoint(raw: &str) -> String {
    if raw.contains(CHAT_COMPLETIONS_PATH) {
        return raw.to_string();
    }

    let base = raw.strip_suffix('/').unwrap_or(raw);

    if has_version_segment(base) {
        format!("{}{}", base, CHAT_COMPLETIONS_PATH)
    } else {
        format!("{}/v1{}", base, CHAT_COMPLETIONS_PATH)
    }
}

/// Returns true if any path segment looks like `v1`, `v2`, ...
fn has_version_segment(url: &str) -> bool {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => url,
    };

    path.split('/').any(|segment| {
        segment
            .strip_prefix('v')
            .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://h/v1", "http://h/v1/chat/completions"; "versioned base")]
    #[test_case("http://h/", "http://h/v1/chat/completions"; "bare host with slash")]
    #[test_case("http://h", "http://h/v1/chat/completions"; "bare host")]
    #[test_case("http://h/v1/", "http://h/v1/chat/completions"; "versioned base with slash")]
    #[test_case("https://api.example.com/openai/v2", "https://api.example.com/openai/v2/chat/completions"; "nested version")]
    #[test_case("http://h/custom/chat/completions", "http://h/custom/chat/completions"; "already resolved")]
    #[test_case("http://192.168.100.177:3000/v1", "http://192.168.100.177:3000/v1/chat/completions"; "local address")]
    fn test_resolve_endpoint(raw: &str, expected: &str) {
        assert_eq!(resolve_endpoint(raw), expected);
    }

    #[test]
    fn test_resolve_endpoint_is_idempotent() {
        for raw in ["http://h/v1", "http://h/", "https://proxy.local/api", "http://h/x/chat/completions"] {
            let once = resolve_endpoint(raw);
            assert_eq!(resolve_endpoint(&once), once);
        }
    }

    #[test]
    fn test_version_like_host_is_not_a_segment() {
        assert_eq!(
            resolve_endpoint("https://v1.example.com"),
            "https://v1.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_only_one_trailing_slash_is_stripped() {
        assert_eq!(resolve_endpoint("http://h//"), "http://h//v1/chat/completions");
    }
}
