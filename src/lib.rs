// src/lib.rs
// =============================================================================
// link-graph: crawl a website and map its pages and the links between them.
//
//   let graph = link_graph::crawl("https://example.com/", CrawlConfig::default()).await?;
//   for page in graph.pages() { ... }
//
// Modules:
// - checker: fetching one page and extracting its title and links
// - crawl:   the concurrent crawler built on top of it
// - graph:   the result (pages keyed by canonical address)
// - config:  crawl settings
// - error:   what can go wrong before a crawl starts
// =============================================================================

pub mod checker;
pub mod config;
pub mod crawl;
pub mod error;
pub mod graph;

pub use config::{Admission, CrawlConfig, ScopePolicy};
pub use crawl::{crawl, Crawler};
pub use error::{CrawlError, FetchError};
pub use graph::{CrawlGraph, Link, LinkKind, LinkReport, Page, PageStatus, DEAD_PAGE_TITLE};
