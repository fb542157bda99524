// src/checker/mod.rs
// =============================================================================
// Everything that happens to a single page:
//
// - http:     fetches it (one GET, fixed timeout, tagged outcome)
// - html:     streams the body through the tokenizer for title and links
// - classify: decides what kind of link each href is
//
// The crawl module strings these together across many pages.
// =============================================================================

mod classify;
mod html;
mod http;

pub use classify::{canonicalize, LinkClassifier, Scope};
pub use html::{encoding_for, extract_html, extract_page, Extracted, StreamExtractor};
pub use http::{charset, is_html, BodyStream, FetchOutcome, Fetcher, HttpFetcher};
