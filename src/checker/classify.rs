// src/checker/classify.rs
// =============================================================================
// This module decides what kind of link an href is.
//
// The rules, in order:
// 1. Empty href (after trimming)           -> malformed
// 2. Starts with '#'                       -> fragment (same-document jump)
// 3. Cannot be resolved against the page   -> malformed
// 4. Same host as the seed                 -> internal (will be crawled)
//    Anything else                         -> external (never fetched)
//
// Classifying has no side effects. Handing internal links to the work queue
// is the crawler's job, not ours.
// =============================================================================

use std::sync::Arc;
use url::Url;

use crate::config::ScopePolicy;
use crate::graph::{Link, LinkKind};

/// Returns the canonical address of a URL: the URL with its fragment removed.
///
/// The `url` crate already lower-cases the scheme and host, drops default
/// ports and normalises the path, so two spellings of the same page end up
/// as the same string.
pub fn canonicalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// The set of URLs that belong to the crawled site.
#[derive(Debug, Clone)]
pub struct Scope {
    host: String,
    port: Option<u16>,
    policy: ScopePolicy,
}

impl Scope {
    /// Builds the scope around the seed URL. Returns None if it has no host.
    pub fn for_seed(seed: &Url, policy: ScopePolicy) -> Option<Self> {
        let host = seed.host_str()?.to_ascii_lowercase();
        Some(Self {
            host,
            port: seed.port_or_known_default(),
            policy,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn contains(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        let same_host = host.eq_ignore_ascii_case(&self.host)
            || (self.policy.include_subdomains && is_subdomain_of(host, &self.host));
        if !same_host {
            return false;
        }

        !self.policy.match_port || url.port_or_known_default() == self.port
    }
}

fn is_subdomain_of(host: &str, parent: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host.len() > parent.len() + 1
        && host.ends_with(parent)
        && host.as_bytes()[host.len() - parent.len() - 1] == b'.'
}

/// Classifies the hrefs found on one page.
///
/// Cheap to clone: the scope is shared between all pages of a crawl.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    base: Url,
    scope: Arc<Scope>,
}

impl LinkClassifier {
    /// `base` is the URL of the page the links were found on.
    pub fn new(base: Url, scope: Arc<Scope>) -> Self {
        Self { base, scope }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn classify(&self, href: &str) -> Link {
        let trimmed = href.trim();

        if trimmed.is_empty() {
            return Link::new(href, None, LinkKind::Malformed);
        }

        if trimmed.starts_with('#') {
            let address = self.base.join(trimmed).ok().map(String::from);
            return Link::new(href, address, LinkKind::Fragment);
        }

        let resolved = match self.base.join(trimmed) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Found an unparsable link on {}: {} ({})", self.base, href, e);
                return Link::new(href, None, LinkKind::Malformed);
            }
        };

        let kind = if self.scope.contains(&resolved) {
            LinkKind::Internal
        } else {
            LinkKind::External
        };
        Link::new(href, Some(canonicalize(&resolved)), kind)
    }
}
