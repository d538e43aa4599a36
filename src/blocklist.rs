//! Blocked application and domain sets for a focus session.
//!
//! A [`BlockList`] is built once when a session starts and shared read-only
//! between every enforcement layer. Editing the source mode afterwards has no
//! effect until the next session.
//!
//! # Domain Matching
//!
//! Matching is suffix based: blocking `youtube.com` blocks `youtube.com` and
//! `m.youtube.com`, but NOT `evilyoutube.com`.
//!
//! # Example
//!
//! ```
//! use focus_warden::blocklist::BlockList;
//!
//! let list = BlockList::new(["Slack"], ["https://YouTube.com/"]);
//! assert!(list.is_host_blocked("www.youtube.com"));
//! assert!(!list.is_host_blocked("evilyoutube.com"));
//! assert!(list.is_app_blocked("Slack"));
//! ```

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::warn;

use crate::config::FocusMode;

/// Accepted shape of a normalized domain entry.
static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9-]+\.)+[a-z]{2,}$").expect("domain pattern is a valid regex")
});

/// Immutable set of blocked application identifiers and domain suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    apps: BTreeSet<String>,
    domains: BTreeSet<String>,
}

impl BlockList {
    /// Build a block list, normalizing every domain entry.
    ///
    /// Domain entries that do not normalize to a valid domain are dropped
    /// with a warning. Application identifiers are kept verbatim (trimmed).
    pub fn new<A, D>(apps: A, domains: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let apps = apps
            .into_iter()
            .map(|a| a.as_ref().trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let domains = domains
            .into_iter()
            .filter_map(|d| {
                let raw = d.as_ref();
                let normalized = normalize_domain(raw);
                if normalized.is_none() {
                    warn!("Ignoring invalid blocked domain entry: {:?}", raw);
                }
                normalized
            })
            .collect();

        Self { apps, domains }
    }

    /// Build the block list for a focus mode.
    pub fn from_mode(mode: &FocusMode) -> Self {
        Self::new(&mode.blocked_apps, &mode.blocked_sites)
    }

    /// Return a copy with the given identifiers removed from the app set.
    pub fn without_apps<'a, I>(&self, exempt: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut apps = self.apps.clone();
        for id in exempt {
            apps.remove(id);
        }
        Self {
            apps,
            domains: self.domains.clone(),
        }
    }

    /// Blocked application identifiers.
    pub fn apps(&self) -> &BTreeSet<String> {
        &self.apps
    }

    /// Normalized blocked domain suffixes.
    pub fn domains(&self) -> &BTreeSet<String> {
        &self.domains
    }

    /// Whether the application identifier is blocked.
    pub fn is_app_blocked(&self, app_id: &str) -> bool {
        self.apps.contains(app_id)
    }

    /// Whether the host matches any blocked domain. Case-insensitive.
    pub fn is_host_blocked(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.domains.iter().any(|d| host_matches(&host, d))
    }

    /// Whether the URL's host matches any blocked domain.
    ///
    /// URLs without a host (`about:blank`, `file:///...`) never match.
    pub fn is_url_blocked(&self, url: &str) -> bool {
        url_host(url).is_some_and(|host| self.is_host_blocked(&host))
    }

    /// True when neither apps nor domains are blocked.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.domains.is_empty()
    }
}

/// Suffix match: `host == domain` or `host` ends with `"." + domain`.
///
/// Both arguments are expected to be lowercase.
pub fn host_matches(host: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    if host == domain {
        return true;
    }
    host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

/// Normalize a user-entered domain.
///
/// Trims whitespace, lowercases, strips an `http://` or `https://` scheme and
/// any path, and trims surrounding slashes. Returns `None` if what remains is
/// not a plausible domain name.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let mut domain = raw.trim().to_ascii_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
            break;
        }
    }

    let domain = domain.trim_matches('/');
    let domain = domain.split('/').next().unwrap_or_default();

    if DOMAIN_PATTERN.is_match(domain) {
        Some(domain.to_string())
    } else {
        None
    }
}

/// Extract the lowercase host from an absolute URL.
///
/// Handles userinfo, ports and bracketed IPv6 literals. Returns `None` for
/// URLs without an authority section.
pub fn url_host(url: &str) -> Option<String> {
    let (_, rest) = url.trim().split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let host = if let Some(v6) = authority.strip_prefix('[') {
        v6.split_once(']').map(|(h, _)| h)?
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
