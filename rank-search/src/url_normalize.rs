//! URL and domain normalisation.
//!
//! Two comparison contexts exist and they normalise differently:
//!
//! - **Storage key** ([`domain_key`]): lowercased host, scheme and port
//!   dropped, a leading `www.` stripped. `www.example.com` and
//!   `example.com` map to the same media site.
//! - **Display** ([`display_host`]): lowercased host exactly as served,
//!   `www.` kept.
//!
//! [`normalize_url`] canonicalises full URLs for within-page deduplication.

use url::Url;

/// Tracking query parameters that are stripped during URL normalisation.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Parse a URL, accepting scheme-less input such as `example.com/path`.
fn parse_lenient(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let without_slashes = trimmed.trim_start_matches("//");
            Url::parse(&format!("https://{without_slashes}")).ok()
        }
        Err(_) => None,
    }
}

/// Lowercased host of `raw`, without a trailing dot.
fn host_of(raw: &str) -> Option<String> {
    let url = parse_lenient(raw)?;
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Storage key for a media site: lowercase host with `www.` stripped.
///
/// Returns `None` when `raw` has no host.
///
/// # Examples
///
/// ```
/// use rank_search::url_normalize::domain_key;
///
/// assert_eq!(domain_key("https://www.Example.com/a"), domain_key("http://example.com:8080/"));
/// ```
pub fn domain_key(raw: &str) -> Option<String> {
    let host = host_of(raw)?;
    Some(strip_www(&host).to_owned())
}

/// Display form of a URL's host: lowercase, `www.` kept.
pub fn display_host(raw: &str) -> Option<String> {
    host_of(raw)
}

/// Strip one leading `www.` label.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Normalise a URL for deduplication comparison.
///
/// Lowercases scheme and host, removes default ports, strips tracking
/// parameters, sorts the remaining parameters, drops the fragment and a
/// trailing slash. Unparseable input is returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    if matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn www_and_bare_share_a_domain_key() {
        assert_eq!(
            domain_key("https://www.example.com/page"),
            Some("example.com".to_owned())
        );
        assert_eq!(
            domain_key("https://example.com/other"),
            Some("example.com".to_owned())
        );
    }

    #[test]
    fn domain_key_drops_scheme_port_and_case() {
        assert_eq!(
            domain_key("HTTP://Blog.Example.COM:8080/x"),
            Some("blog.example.com".to_owned())
        );
    }

    #[test]
    fn domain_key_accepts_scheme_less_input() {
        assert_eq!(domain_key("www.example.com"), Some("example.com".to_owned()));
        assert_eq!(domain_key("//cdn.example.com/a.js"), Some("cdn.example.com".to_owned()));
    }

    #[test]
    fn domain_key_only_strips_leading_www() {
        assert_eq!(
            domain_key("https://www.www-shop.jp/"),
            Some("www-shop.jp".to_owned())
        );
        assert_eq!(
            domain_key("https://shop.www.example.com/"),
            Some("shop.www.example.com".to_owned())
        );
    }

    #[test]
    fn display_host_keeps_www() {
        assert_eq!(
            display_host("https://WWW.Example.com/"),
            Some("www.example.com".to_owned())
        );
    }

    #[test]
    fn domain_key_rejects_hostless_input() {
        assert_eq!(domain_key(""), None);
        assert_eq!(domain_key("mailto:someone@example.com"), None);
    }

    #[test]
    fn domain_key_is_pure() {
        let a = domain_key("https://www.example.com/");
        let b = domain_key("https://www.example.com/");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_removes_tracking_and_sorts() {
        let a = normalize_url("https://Example.COM/path/?b=2&a=1&utm_source=x#section");
        let b = normalize_url("https://example.com/path?a=1&b=2");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_removes_default_port() {
        assert_eq!(
            normalize_url("https://example.com:443/path"),
            "https://example.com/path"
        );
    }

    #[test]
    fn normalize_preserves_root_slash() {
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn normalize_invalid_url_unchanged() {
        assert_eq!(normalize_url("not a url"), "not a url");
    }
}
