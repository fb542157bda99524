// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands share the same crawl options:
//   crawl  print every page that was found (table or JSON)
//   check  print only the dead and malformed links, exit 1 if any link is dead
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use link_graph::config::{DEFAULT_MAX_PAGES, DEFAULT_WORKERS};
use link_graph::{Admission, CrawlConfig, ScopePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "link-graph",
    version,
    about = "Crawl a website and map its pages and links",
    long_about = "link-graph starts from one URL, follows every link that stays on the same site \
                  exactly once, and reports each page's title and links, including the ones \
                  that are dead."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a website and print every page found
    ///
    /// Example: link-graph crawl https://example.com --workers 8
    Crawl(CrawlArgs),

    /// Crawl a website and report dead and malformed links
    ///
    /// Exits with code 1 if at least one dead link was found.
    Check(CrawlArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// URL to start crawling from (e.g., https://example.com)
    pub seed: String,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    /// Number of pages fetched in parallel
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 3)]
    pub timeout_secs: u64,

    /// Stop following links after this many distinct pages
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES, conflicts_with = "unbounded")]
    pub max_pages: usize,

    /// Follow every internal link, with no page limit
    #[arg(long)]
    pub unbounded: bool,

    /// Treat subdomains of the seed host as part of the site
    #[arg(long)]
    pub include_subdomains: bool,

    /// Only treat links on the seed's port as part of the site
    #[arg(long)]
    pub match_port: bool,

    /// Crawl even if the seed itself is dead
    #[arg(long)]
    pub no_seed_check: bool,
}

impl CrawlArgs {
    pub fn to_config(&self) -> CrawlConfig {
        let admission = if self.unbounded {
            Admission::Unbounded
        } else {
            Admission::Capped(self.max_pages)
        };

        CrawlConfig {
            workers: self.workers,
            fetch_timeout: Duration::from_secs(self.timeout_secs),
            admission,
            scope: ScopePolicy {
                include_subdomains: self.include_subdomains,
                match_port: self.match_port,
            },
            ..CrawlConfig::default()
        }
    }
}
