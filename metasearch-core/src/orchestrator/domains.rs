//! Domain-level result filtering.
//!
//! A [`DomainFilter`] drops results from blocked domains before they are
//! merged, and optionally limits how many ranked results one domain may
//! contribute to the final list.

use url::Url;

/// Blocked domains and the per-domain result cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    blocked: Vec<String>,
    max_per_domain: Option<usize>,
}

impl DomainFilter {
    /// Filter over `blocked` entries, normalised the same way result
    /// domains are. Blank entries are ignored.
    pub fn new<I, S>(blocked: I, max_per_domain: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked = blocked
            .into_iter()
            .map(|entry| strip_www(&entry.as_ref().trim().to_ascii_lowercase()).to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self {
            blocked,
            max_per_domain,
        }
    }

    /// Whether the filter does nothing at all.
    pub fn is_noop(&self) -> bool {
        self.blocked.is_empty() && self.max_per_domain.is_none()
    }

    pub fn max_per_domain(&self) -> Option<usize> {
        self.max_per_domain
    }

    /// Whether `domain` (as returned by [`domain_of`]) is blocked.
    ///
    /// An entry with a dot matches that domain and its subdomains. A
    /// single-label entry such as `reddit` matches any domain with that
    /// label.
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocked.iter().any(|entry| {
            if entry.contains('.') {
                domain == entry
                    || domain
                        .strip_suffix(entry.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            } else {
                domain.split('.').any(|label| label == entry)
            }
        })
    }
}

/// Lowercased host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(strip_www(&host).to_string())
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
