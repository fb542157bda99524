// src/crawl/mod.rs
// =============================================================================
// This module handles crawling a whole website.
//
// Features:
// - Breadth-first crawl from one seed URL with a fixed pool of workers
// - Each internal address is fetched at most once, however many pages link
//   to it (see visited.rs)
// - The crawl ends by itself when no work is left (see queue.rs), or early
//   through a cancellation token
// =============================================================================

mod coordinator;
mod queue;
mod visited;

pub use coordinator::{crawl, Crawler};
pub use visited::{Claim, Lookup, VisitedStore};
