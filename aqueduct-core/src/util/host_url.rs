/// Formats a browsable URL for a bound listener.
///
/// IPv6 literals are bracketed. With `rewrite_loopback` set, the wildcard
/// binds `0.0.0.0` and `::` are rewritten to their loopback equivalents so
/// the printed URL is directly reachable from the local machine.
pub fn format_host_url(
    scheme: &str,
    host: &str,
    port: u16,
    path: Option<&str>,
    rewrite_loopback: bool,
) -> String {
    let host = match host {
        "0.0.0.0" if rewrite_loopback => "127.0.0.1",
        "::" if rewrite_loopback => "::1",
        other => other,
    };
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let mut url = format!("{scheme}://{authority}:{port}");
    if let Some(path) = path {
        url.push_str(path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::format_host_url;

    #[test]
    fn test_plain_host() {
        assert_eq!(
            format_host_url("http", "example.com", 8080, None, false),
            "http://example.com:8080"
        );
    }

    #[test]
    fn test_path_appended() {
        assert_eq!(
            format_host_url("https", "example.com", 443, Some("/api"), false),
            "https://example.com:443/api"
        );
    }

    #[test]
    fn test_ipv6_bracketed() {
        assert_eq!(
            format_host_url("http", "fe80::1", 8000, None, false),
            "http://[fe80::1]:8000"
        );
    }

    #[test]
    fn test_loopback_rewrite() {
        assert_eq!(
            format_host_url("http", "0.0.0.0", 8000, None, true),
            "http://127.0.0.1:8000"
        );
        assert_eq!(
            format_host_url("http", "::", 8000, None, true),
            "http://[::1]:8000"
        );
    }

    #[test]
    fn test_wildcards_kept_without_rewrite() {
        assert_eq!(
            format_host_url("http", "0.0.0.0", 8000, None, false),
            "http://0.0.0.0:8000"
        );
    }
}
