//! Source URL validation
//!
//! Runs before any I/O. A source must be an absolute http(s) URL, either
//! as given or once percent-decoded, and must not point at loopback or private networks unless
//! the deployment explicitly allows it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::error::AppError;

/// Which hosts a source URL may point at
#[derive(Clone, Debug, Default)]
pub struct SourcePolicy {
    pub allow_private_hosts: bool,
    pub allowlist: Option<Vec<String>>,
}

impl SourcePolicy {
    /// Check an already-parsed URL against the scheme and host rules.
    pub fn check(&self, url: &Url) -> Result<(), AppError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme '{}': only http and https are allowed",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .ok_or_else(|| AppError::Validation("URL must have a host".to_string()))?;

        if let Some(allowed_domains) = &self.allowlist {
            let host_lower = host.to_string().to_lowercase();
            let is_allowed = allowed_domains.iter().any(|allowed| {
                host_lower == *allowed || host_lower.ends_with(&format!(".{}", allowed))
            });
            if !is_allowed {
                return Err(AppError::Validation(format!(
                    "Host '{}' is not in the allowed source list",
                    host_lower
                )));
            }
        }

        if self.allow_private_hosts {
            return Ok(());
        }

        let blocked = match host {
            Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(ip)),
            Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(ip)),
            Host::Domain(domain) => {
                let domain = domain.to_lowercase();
                domain == "localhost"
                    || domain.ends_with(".localhost")
                    || domain.ends_with(".local")
                    || domain.ends_with(".internal")
            }
        };

        if blocked {
            return Err(AppError::Validation(
                "Private, loopback and internal hosts are not allowed".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a raw source reference into an absolute URL.
///
/// A string that already parses is returned as-is, escapes included. Only
/// when it does not parse is it percent-decoded once and retried, so that
/// doubly-encoded query values (`https%3A%2F%2F...`) are still accepted.
pub fn validate_source_url(raw: &str, policy: &SourcePolicy) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("URL is required".to_string()));
    }

    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(parse_err) => {
            let decoded = percent_decode_str(trimmed).decode_utf8().map_err(|_| {
                AppError::Validation("URL is not valid UTF-8 once decoded".to_string())
            })?;
            if decoded == trimmed {
                return Err(AppError::Validation(format!(
                    "Invalid URL '{}': {}",
                    trimmed, parse_err
                )));
            }
            Url::parse(decoded.trim())
                .map_err(|e| AppError::Validation(format!("Invalid URL '{}': {}", trimmed, e)))?
        }
    };

    policy.check(&url)?;
    Ok(url)
}

/// Check if an IP address is loopback, private, link-local or otherwise not publicly routable
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => {
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ipv4(&mapped);
            }
            is_private_ipv6(ipv6)
        }
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || octets[0] == 0
        || (octets[0] == 100 && (64..=127).contains(&octets[1])) // 100.64.0.0/10 carrier-grade NAT
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xffc0) == 0xfe80 // fe80::/10
        || (first & 0xfe00) == 0xfc00 // fc00::/7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> SourcePolicy {
        SourcePolicy::default()
    }

    #[test]
    fn test_accepts_absolute_http_urls() {
        for raw in [
            "https://example.com/pic.jpg",
            "http://cdn.example.org/a/b/video.mp4?sig=abc",
            "https://example.com:8443/path",
        ] {
            assert!(validate_source_url(raw, &strict()).is_ok(), "{raw}");
        }
    }

    #[test]
    fn test_accepts_percent_encoded_urls() {
        let url = validate_source_url("https%3A%2F%2Fexample.com%2Fpic.jpg", &strict()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/pic.jpg");
    }

    #[test]
    fn test_escapes_in_absolute_urls_are_preserved() {
        let url = validate_source_url("https://example.com/img%23v2.jpg", &strict()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/img%23v2.jpg");
        assert_eq!(url.path(), "/img%23v2.jpg");
        assert!(url.fragment().is_none());

        let url = validate_source_url("https://example.com/files/a%2Fb.jpg", &strict()).unwrap();
        assert_eq!(url.path(), "/files/a%2Fb.jpg");

        let url =
            validate_source_url("https://cdn.example.com/x.jpg?sig=ab%2Bcd%3D", &strict()).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/x.jpg?sig=ab%2Bcd%3D");
        assert_eq!(url.query(), Some("sig=ab%2Bcd%3D"));
    }

    #[test]
    fn test_rejects_missing_and_malformed_urls() {
        for raw in ["", "   ", "not-a-url", "/relative/path.jpg", "example.com/pic.jpg"] {
            let err = validate_source_url(raw, &strict()).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{raw}");
        }
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        for raw in ["ftp://example.com/a.jpg", "file:///etc/passwd", "data:text/plain,hi"] {
            assert!(matches!(
                validate_source_url(raw, &strict()),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_rejects_private_hosts_unless_allowed() {
        for raw in [
            "http://127.0.0.1/a.jpg",
            "http://localhost:8080/a.jpg",
            "http://10.1.2.3/a.jpg",
            "http://192.168.0.10/a.jpg",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/a.jpg",
        ] {
            assert!(validate_source_url(raw, &strict()).is_err(), "{raw}");
        }

        let permissive = SourcePolicy {
            allow_private_hosts: true,
            allowlist: None,
        };
        assert!(validate_source_url("http://127.0.0.1:9000/a.jpg", &permissive).is_ok());
    }

    #[test]
    fn test_allowlist_matches_subdomains() {
        let policy = SourcePolicy {
            allow_private_hosts: false,
            allowlist: Some(vec!["example.com".to_string()]),
        };
        assert!(validate_source_url("https://cdn.example.com/a.jpg", &policy).is_ok());
        assert!(validate_source_url("https://example.com/a.jpg", &policy).is_ok());
        assert!(validate_source_url("https://evil-example.com/a.jpg", &policy).is_err());
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip(&"172.16.5.4".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"93.184.216.34".parse().unwrap()));
        assert!(!is_private_ip(&"2606:2800:220:1::1".parse().unwrap()));
    }
}
