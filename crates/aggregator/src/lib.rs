//! Pure predicate over a URL: is this a hub/aggregator page? (§4.3)
//!
//! Exact-match (ignoring trailing slash, case) against a configured set of
//! hub hostnames. The contract consumed by the Tree Reconciler is narrow:
//! `is_aggregator(url) && no referrer` means the visit roots no tree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Compiled-in defaults: widely used search engines and social
/// aggregators whose landing pages would otherwise spuriously root a new
/// tree on every visit.
pub const DEFAULT_HUB_HOSTS: &[&str] = &[
    "www.google.com",
    "www.bing.com",
    "duckduckgo.com",
    "www.reddit.com",
    "news.ycombinator.com",
    "twitter.com",
    "x.com",
];

/// Configured set of hub hostnames an [`AggregatorClassifier`] checks
/// against. Serialisable so it can live directly in `EngineConfig`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatorHosts(HashSet<String>);

impl Default for AggregatorHosts {
    fn default() -> Self {
        Self(DEFAULT_HUB_HOSTS.iter().map(|host| normalize_host(host)).collect())
    }
}

impl AggregatorHosts {
    #[must_use]
    pub fn new(hosts: impl IntoIterator<Item = String>) -> Self {
        Self(hosts.into_iter().map(|host| normalize_host(&host)).collect())
    }

    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(&normalize_host(host))
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Stateless classifier over a configured hub host set.
#[derive(Clone)]
pub struct AggregatorClassifier {
    hosts: AggregatorHosts,
}

impl AggregatorClassifier {
    #[must_use]
    pub const fn new(hosts: AggregatorHosts) -> Self {
        Self { hosts }
    }

    /// `true` when `url`'s host exactly matches a configured hub host.
    /// Unparseable URLs are never aggregators.
    #[must_use]
    pub fn is_aggregator(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_owned))
            .is_some_and(|host| self.hosts.contains(&host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_default_hub_host() {
        let classifier = AggregatorClassifier::new(AggregatorHosts::default());
        assert!(classifier.is_aggregator("https://www.google.com/search?q=rust"));
    }

    #[test]
    fn ignores_trailing_slash_and_case() {
        let classifier = AggregatorClassifier::new(AggregatorHosts::new(["Example.com".to_owned()]));
        assert!(classifier.is_aggregator("https://example.com/"));
    }

    #[test]
    fn non_hub_url_is_not_aggregator() {
        let classifier = AggregatorClassifier::new(AggregatorHosts::default());
        assert!(!classifier.is_aggregator("https://a-random-blog.example/post"));
    }

    #[test]
    fn unparseable_url_is_not_aggregator() {
        let classifier = AggregatorClassifier::new(AggregatorHosts::default());
        assert!(!classifier.is_aggregator("not a url"));
    }
}
