//! Outbound URL policy: URL shape, host rules, allowlist and blocked
//! address ranges.

use ipnet::IpNet;
use once_cell::sync::Lazy;
use std::net::IpAddr;
use url::{Host, Url};

use crate::error::FetchError;

/// Ranges std does not classify on stable: CGNAT, IPv6 link-local and
/// unique-local.
static EXTRA_BLOCKED: Lazy<Vec<IpNet>> = Lazy::new(|| {
    ["100.64.0.0/10", "fe80::/10", "fc00::/7"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
});

/// Parse a comma-separated allowlist (`example.com,.cdn.example.net`).
/// Entries are trimmed and lower-cased; empties are dropped.
pub fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// `example.com` matches the host itself and any subdomain; `.example.com`
/// matches subdomains only.
pub fn host_allowed(host: &str, allowlist: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowlist.iter().any(|entry| {
        if entry.starts_with('.') {
            host.ends_with(entry.as_str())
        } else {
            host == *entry || host.ends_with(&format!(".{entry}"))
        }
    })
}

/// Gate 1: absolute `https` URL with a host and no userinfo.
pub fn check_url_shape(raw: &str) -> Result<Url, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FetchError::InvalidUrl("empty url".into()));
    }
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.scheme() != "https" {
        return Err(FetchError::InvalidUrl(format!(
            "scheme not allowed: {}",
            url.scheme()
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(FetchError::InvalidUrl("userinfo not allowed".into()));
    }
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(url),
        _ => Err(FetchError::InvalidUrl("missing host".into())),
    }
}

/// Gates 2 and 3: local hostnames and the optional allowlist.
pub fn check_host(host: &str, allowlist: &[String]) -> Result<(), FetchError> {
    let host = host.to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local") {
        return Err(FetchError::DisallowedHost(format!("local hostname: {host}")));
    }
    if !allowlist.is_empty() && !host_allowed(&host, allowlist) {
        return Err(FetchError::DisallowedHost(format!("not in allowlist: {host}")));
    }
    Ok(())
}

/// True for loopback, link-local, multicast, unspecified, private, CGNAT and
/// IPv6 unique-local addresses. IPv4-mapped IPv6 is judged as IPv4.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    };

    let std_blocked = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_multicast() || v6.is_unspecified(),
    };

    std_blocked || EXTRA_BLOCKED.iter().any(|net| net.contains(&ip))
}

/// IP literal carried by the URL host, if any.
pub fn literal_ip(url: &Url) -> Option<IpAddr> {
    match url.host()? {
        Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
        Host::Ipv6(v6) => Some(IpAddr::V6(v6)),
        Host::Domain(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn shape_rejects_plain_http_and_credentials() {
        assert!(matches!(
            check_url_shape("http://example.com"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            check_url_shape("https://user:pw@example.com/"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            check_url_shape("/relative"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(check_url_shape("  "), Err(FetchError::InvalidUrl(_))));
        assert!(check_url_shape("https://example.com/feed.xml").is_ok());
    }

    #[test]
    fn local_hostnames_are_blocked() {
        assert!(check_host("localhost", &[]).is_err());
        assert!(check_host("LOCALHOST", &[]).is_err());
        assert!(check_host("printer.local", &[]).is_err());
        assert!(check_host("example.com", &[]).is_ok());
    }

    #[test]
    fn allowlist_bare_entry_matches_host_and_subdomains() {
        let wl = parse_allowlist(" Example.com , ,.cdn.net");
        assert_eq!(wl, vec!["example.com".to_string(), ".cdn.net".to_string()]);
        assert!(host_allowed("example.com", &wl));
        assert!(host_allowed("blog.example.com", &wl));
        assert!(!host_allowed("badexample.com", &wl));
    }

    #[test]
    fn allowlist_dot_entry_is_suffix_only() {
        let wl = parse_allowlist(".cdn.net");
        assert!(host_allowed("a.cdn.net", &wl));
        assert!(!host_allowed("cdn.net", &wl));
    }

    #[test]
    fn host_outside_allowlist_is_disallowed() {
        let wl = parse_allowlist("example.com");
        assert!(matches!(
            check_host("evil.test", &wl),
            Err(FetchError::DisallowedHost(_))
        ));
    }

    #[test]
    fn blocked_ranges() {
        for s in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.5",
            "169.254.169.254",
            "100.64.0.1",
            "100.127.255.254",
            "224.0.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "::1",
            "::",
            "fe80::1",
            "fd00::1",
            "ff02::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_blocked_ip(ip(s)), "{s} should be blocked");
        }
    }

    #[test]
    fn public_addresses_pass() {
        for s in ["93.184.216.34", "100.128.0.1", "8.8.8.8", "2606:4700::1111"] {
            assert!(!is_blocked_ip(ip(s)), "{s} should pass");
        }
    }

    #[test]
    fn literal_ip_is_extracted() {
        let u = Url::parse("https://192.168.1.5/x").unwrap();
        assert_eq!(literal_ip(&u), Some(ip("192.168.1.5")));
        let u = Url::parse("https://[::1]/x").unwrap();
        assert_eq!(literal_ip(&u), Some(ip("::1")));
        let u = Url::parse("https://example.com/x").unwrap();
        assert_eq!(literal_ip(&u), None);
    }
}
