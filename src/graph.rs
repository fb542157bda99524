// src/graph.rs
// =============================================================================
// The result of a crawl: every visited page, keyed by its canonical address,
// and the links found on each page.
//
// Pages live in one owned map (an "arena"). A link never holds a reference
// to another page; it stores the target's canonical address and the graph
// looks the page up when asked. That keeps ownership a simple tree even
// though the web graph itself is full of cycles.
// =============================================================================

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Title given to every page that could not be fetched.
pub const DEAD_PAGE_TITLE: &str = "404 NOT FOUND";

/// How fetching a page turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageStatus {
    /// 2xx response; the body was parsed.
    Fetched { status: u16 },
    /// The server answered with a status outside 200-299.
    Unreachable { status: u16 },
    /// No answer within the fetch timeout.
    TimedOut,
}

impl PageStatus {
    pub fn is_dead(&self) -> bool {
        !matches!(self, PageStatus::Fetched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub address: String,
    pub title: String,
    #[serde(flatten)]
    pub status: PageStatus,
    pub links: Vec<Link>,
}

impl Page {
    pub fn fetched(address: String, status: u16, title: String, links: Vec<Link>) -> Self {
        Self {
            address,
            title,
            status: PageStatus::Fetched { status },
            links,
        }
    }

    /// A stand-in for a page that returned an error status or timed out.
    pub fn dead(address: String, status: PageStatus) -> Self {
        Self {
            address,
            title: DEAD_PAGE_TITLE.to_string(),
            status,
            links: Vec::new(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status.is_dead()
    }
}

/// Classification of a link. Exactly one applies to every link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Same site as the seed; followed by the crawler.
    Internal,
    /// Another site; never fetched.
    External,
    /// `href="#..."`, a jump inside the same document.
    Fragment,
    /// Empty or unparsable href.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// The href exactly as written in the page.
    pub raw_target: String,
    /// Absolute URL the href resolves to (None when malformed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Text inside the anchor.
    pub text: String,
    pub kind: LinkKind,
    /// Canonical address of the crawled page this link points at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// The target page returned an error status or timed out.
    pub dead: bool,
}

impl Link {
    pub(crate) fn new(raw_target: &str, address: Option<String>, kind: LinkKind) -> Self {
        Self {
            raw_target: raw_target.to_string(),
            address,
            text: String::new(),
            kind,
            target: None,
            dead: false,
        }
    }

    /// Fragment links count as internal: they point into the same page.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, LinkKind::Internal | LinkKind::Fragment)
    }

    pub fn is_fragment(&self) -> bool {
        self.kind == LinkKind::Fragment
    }

    pub fn is_malformed(&self) -> bool {
        self.kind == LinkKind::Malformed
    }

    /// The address the crawler should visit for this link, if any.
    pub fn follow_address(&self) -> Option<&str> {
        match self.kind {
            LinkKind::Internal => self.address.as_deref(),
            _ => None,
        }
    }
}

/// A link together with the page it was found on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LinkReport<'a> {
    pub source: &'a str,
    #[serde(flatten)]
    pub link: &'a Link,
}

/// Everything a crawl produced.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlGraph {
    pub seed: String,
    pub pages: BTreeMap<String, Page>,
}

impl CrawlGraph {
    /// Builds the graph and points every internal link at its crawled page.
    pub(crate) fn new(seed: String, pages: BTreeMap<String, Page>) -> Self {
        let mut graph = Self { seed, pages };
        graph.link_targets();
        graph
    }

    fn link_targets(&mut self) {
        let dead: HashMap<String, bool> = self
            .pages
            .iter()
            .map(|(address, page)| (address.clone(), page.is_dead()))
            .collect();

        for page in self.pages.values_mut() {
            for link in &mut page.links {
                let Some(address) = link.follow_address() else {
                    continue;
                };
                if let Some(&is_dead) = dead.get(address) {
                    link.target = Some(address.to_string());
                    link.dead = is_dead;
                }
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&Page> {
        self.pages.get(address)
    }

    pub fn seed_page(&self) -> Option<&Page> {
        self.pages.get(&self.seed)
    }

    /// The page a link points at, if it was crawled.
    pub fn target_of(&self, link: &Link) -> Option<&Page> {
        link.target.as_deref().and_then(|address| self.pages.get(address))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    /// Every link whose target page is dead, in address order.
    pub fn dead_links(&self) -> Vec<LinkReport<'_>> {
        self.links_where(|link| link.dead)
    }

    pub fn malformed_links(&self) -> Vec<LinkReport<'_>> {
        self.links_where(Link::is_malformed)
    }

    fn links_where(&self, keep: impl Fn(&Link) -> bool) -> Vec<LinkReport<'_>> {
        self.pages
            .values()
            .flat_map(|page| {
                page.links.iter().map(move |link| LinkReport {
                    source: &page.address,
                    link,
                })
            })
            .filter(|report| keep(report.link))
            .collect()
    }
}
