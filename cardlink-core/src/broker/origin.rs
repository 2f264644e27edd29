use url::Url;

/// Which page origins may drive a broker.
///
/// An origin passes when it is a canonical `https` origin (no port, no
/// credentials, no path) whose host is the trusted host or a subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    trusted_host: String,
}

impl OriginPolicy {
    pub fn new(trusted_host: &str) -> Self {
        OriginPolicy {
            trusted_host: trusted_host.trim().trim_end_matches('.').to_lowercase(),
        }
    }

    pub fn trusted_host(&self) -> &str {
        &self.trusted_host
    }

    pub fn allows(&self, origin: &str) -> bool {
        if self.trusted_host.is_empty() {
            return false;
        }
        let Ok(url) = Url::parse(origin) else {
            return false;
        };
        if url.scheme() != "https" || url.origin().ascii_serialization() != origin {
            return false;
        }
        // the serialized origin keeps a non-default port, so check it separately
        if url.port().is_some() {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                host == self.trusted_host
                    || host
                        .strip_suffix(self.trusted_host.as_str())
                        .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OriginPolicy {
        OriginPolicy::new("poromagia.com")
    }

    #[test]
    fn test_trusted_origins() {
        assert!(policy().allows("https://poromagia.com"));
        assert!(policy().allows("https://www.poromagia.com"));
        assert!(policy().allows("https://admin.shop.poromagia.com"));
    }

    #[test]
    fn test_rejected_origins() {
        let policy = policy();
        assert!(!policy.allows("https://evil.example"));
        assert!(!policy.allows("http://poromagia.com"));
        assert!(!policy.allows("https://poromagia.com:8443"));
        assert!(!policy.allows("https://www.poromagia.com:444"));
        assert!(!policy.allows("https://notporomagia.com"));
        assert!(!policy.allows("https://poromagia.com.evil.example"));
        assert!(!policy.allows("https://evil.example/.poromagia.com"));
        assert!(!policy.allows("https://user@poromagia.com"));
        assert!(!policy.allows("null"));
        assert!(!policy.allows(""));
    }

    #[test]
    fn test_empty_trusted_host_allows_nothing() {
        assert!(!OriginPolicy::new("").allows("https://poromagia.com"));
    }
}
