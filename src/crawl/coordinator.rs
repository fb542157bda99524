// src/crawl/coordinator.rs
// =============================================================================
// The crawler: a fixed pool of workers walking the site breadth-first.
//
// How it works:
// 1. The seed address is claimed and submitted as the first job
// 2. Each worker takes a job, fetches the page and extracts its links
// 3. Every internal link is claimed in the visited store; only the worker
//    that wins the claim submits it as a new job
// 4. The finished page is stored and the job is completed
// 5. When the last job completes the queue closes and the workers exit
// 6. The visited store is turned into a CrawlGraph
//
// Only problems with the seed are errors. A page that fails to load is
// recorded as a dead page (bad status, timeout) or simply left out (any
// other network error); the crawl keeps going either way.
// =============================================================================

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::queue::{Completion, WorkQueue};
use super::visited::{Claim, VisitedStore};
use crate::checker::{
    extract_page, is_html, Extracted, FetchOutcome, Fetcher, HttpFetcher,
    LinkClassifier, Scope,
};
use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::graph::{CrawlGraph, Page, PageStatus};

// One unit of work: an address this worker owns through a claim
struct Job {
    url: Url,
    address: String,
    // The seed response fetched while validating it
    prefetched: Option<FetchOutcome>,
}

// Everything the workers share
struct Shared {
    queue: WorkQueue<Job>,
    store: VisitedStore,
    fetcher: Arc<dyn Fetcher>,
    scope: Arc<Scope>,
}

pub struct Crawler {
    seed: Url,
    seed_address: String,
    config: CrawlConfig,
    fetcher: Arc<dyn Fetcher>,
    scope: Arc<Scope>,
    seed_response: Option<FetchOutcome>,
}

impl Crawler {
    /// Prepares a crawl and checks that the seed answers with a 2xx status.
    ///
    /// The response is kept and becomes the seed page, so the seed is only
    /// downloaded once.
    pub async fn connect(seed: &str, config: CrawlConfig) -> Result<Self, CrawlError> {
        let mut crawler = Self::unchecked(seed, config)?;
        crawler.validate_seed().await?;
        Ok(crawler)
    }

    /// Prepares a crawl without contacting the seed first.
    ///
    /// A seed that turns out to be dead gives a graph with a single dead page.
    pub fn unchecked(seed: &str, config: CrawlConfig) -> Result<Self, CrawlError> {
        let fetcher = HttpFetcher::from_config(&config)
            .map_err(|e| CrawlError::InvalidConfig(e.to_string()))?;
        Self::with_fetcher(seed, config, Arc::new(fetcher))
    }

    /// Like `unchecked`, with a caller-supplied fetcher.
    pub fn with_fetcher(
        seed: &str,
        config: CrawlConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;

        let mut seed_url = Url::parse(seed).map_err(|source| CrawlError::InvalidSeed {
            url: seed.to_string(),
            source,
        })?;
        seed_url.set_fragment(None);
        let scope = Scope::for_seed(&seed_url, config.scope)
            .ok_or_else(|| CrawlError::SeedWithoutHost(seed.to_string()))?;

        Ok(Self {
            seed_address: seed_url.to_string(),
            seed: seed_url,
            config,
            fetcher,
            scope: Arc::new(scope),
            seed_response: None,
        })
    }

    /// Fetches the seed and fails unless it returns a 2xx status.
    pub async fn validate_seed(&mut self) -> Result<(), CrawlError> {
        let url = self.seed.to_string();
        match self.fetcher.fetch(&self.seed).await {
            outcome @ FetchOutcome::Fetched { .. } => {
                self.seed_response = Some(outcome);
                Ok(())
            }
            FetchOutcome::Unreachable { status } => Err(CrawlError::SeedStatus { url, status }),
            FetchOutcome::TimedOut => Err(CrawlError::SeedTimedOut(url)),
            FetchOutcome::Failed(source) => Err(CrawlError::SeedUnreachable { url, source }),
        }
    }

    /// Canonical address of the seed; the key of the seed page in the graph.
    pub fn seed(&self) -> &str {
        &self.seed_address
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawls until there is nothing left to visit.
    pub async fn run(self) -> CrawlGraph {
        self.run_until_cancelled(CancellationToken::new()).await
    }

    /// Crawls until there is nothing left to visit or `cancel` fires.
    ///
    /// After a cancel no new pages are started; pages being fetched at that
    /// moment finish (at most one timeout later) and end up in the graph.
    pub async fn run_until_cancelled(self, cancel: CancellationToken) -> CrawlGraph {
        let Crawler {
            seed,
            seed_address,
            config,
            fetcher,
            scope,
            seed_response,
        } = self;

        log::info!(
            "Gathering statistics for {} with {} workers",
            seed_address,
            config.workers
        );

        let shared = Arc::new(Shared {
            queue: WorkQueue::new(),
            store: VisitedStore::new(config.admission),
            fetcher,
            scope,
        });

        shared.store.claim(&seed_address);
        shared.queue.submit(Job {
            url: seed,
            address: seed_address.clone(),
            prefetched: seed_response,
        });

        let mut workers = JoinSet::new();
        for id in 0..config.workers {
            let shared = Arc::clone(&shared);
            workers.spawn(async move { run_worker(id, shared).await });
        }

        let watcher = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!(
                            "Crawl cancelled, letting {} in-flight page(s) finish",
                            shared.queue.pending()
                        );
                        shared.queue.cancel();
                    }
                    _ = shared.queue.closed() => {}
                }
            })
        };

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                log::error!("Crawl worker stopped unexpectedly: {}", e);
            }
        }
        if let Err(e) = watcher.await {
            log::error!("Cancellation watcher failed: {}", e);
        }

        let graph = CrawlGraph::new(seed_address, shared.store.snapshot());
        log::info!("Crawl finished: {} page(s) visited", graph.len());
        graph
    }
}

/// Connects to the seed and crawls the whole site.
pub async fn crawl(seed: &str, config: CrawlConfig) -> Result<CrawlGraph, CrawlError> {
    Ok(Crawler::connect(seed, config).await?.run().await)
}

async fn run_worker(id: usize, shared: Arc<Shared>) {
    log::trace!("Worker {} started", id);
    while let Some(job) = shared.queue.next().await {
        let _done = Completion(&shared.queue);
        visit(&shared, job).await;
    }
    log::trace!("Worker {} finished", id);
}

async fn visit(shared: &Shared, job: Job) {
    let Job {
        url,
        address,
        prefetched,
    } = job;

    let outcome = match prefetched {
        Some(outcome) => outcome,
        None => shared.fetcher.fetch(&url).await,
    };

    let page = match outcome {
        FetchOutcome::Fetched {
            status,
            final_url,
            content_type,
            body,
        } => {
            let extracted = if is_html(content_type.as_deref()) {
                // Relative links are relative to where we ended up after redirects
                let classifier = LinkClassifier::new(final_url, Arc::clone(&shared.scope));
                extract_page(body, classifier, content_type.as_deref()).await
            } else {
                log::debug!(
                    "Not parsing {} ({})",
                    address,
                    content_type.as_deref().unwrap_or("unknown type")
                );
                Extracted::default()
            };

            for link in &extracted.links {
                if let Some(target) = link.follow_address() {
                    follow(shared, target);
                }
            }
            log::debug!("Visited {} ({} links)", address, extracted.links.len());
            Page::fetched(address, status, extracted.title, extracted.links)
        }
        FetchOutcome::Unreachable { status } => {
            log::debug!("Dead page {} (HTTP {})", address, status);
            Page::dead(address, PageStatus::Unreachable { status })
        }
        FetchOutcome::TimedOut => {
            log::debug!("Dead page {} (timed out)", address);
            Page::dead(address, PageStatus::TimedOut)
        }
        FetchOutcome::Failed(e) => {
            log::warn!("Error visiting page: {} |> {}", url, e);
            shared.store.abandon(&address);
            return;
        }
    };

    shared.store.store(page);
}

// Claims an internal address and, if we won the claim, queues it
fn follow(shared: &Shared, address: &str) {
    match shared.store.claim(address) {
        Claim::Claimed => {
            let url = match Url::parse(address) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("Cannot follow {}: {}", address, e);
                    shared.store.abandon(address);
                    return;
                }
            };
            let job = Job {
                url,
                address: address.to_string(),
                prefetched: None,
            };
            if !shared.queue.submit(job) && shared.queue.is_cancelled() {
                log::trace!("Not following {}, crawl was cancelled", address);
            }
        }
        Claim::Known => {}
        Claim::Rejected => log::debug!("Page limit reached, not following {}", address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Admission, ScopePolicy};
    use crate::error::FetchError;
    use crate::graph::{LinkKind, DEAD_PAGE_TITLE};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::{self, StreamExt};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ---- crawls against a real (local) HTTP server -------------------------

    async fn serve(server: &MockServer, at: &str, html: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .expect(1)
            .mount(server)
            .await;
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            workers: 4,
            ..CrawlConfig::default()
        }
    }

    #[tokio::test]
    async fn test_seed_page_and_internal_link() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/",
            r#"<title>Hello World</title><a href="/about">About</a>"#,
        )
        .await;
        serve(&server, "/about", "<title>About us</title>").await;

        let seed = format!("{}/", server.uri());
        let graph = crawl(&seed, config()).await.unwrap();

        assert_eq!(graph.len(), 2);
        let home = graph.seed_page().unwrap();
        assert_eq!(home.title, "Hello World");
        assert_eq!(home.links.len(), 1);

        let link = &home.links[0];
        let about = format!("{}/about", server.uri());
        assert_eq!(link.raw_target, "/about");
        assert_eq!(link.kind, LinkKind::Internal);
        assert_eq!(link.target.as_deref(), Some(about.as_str()));
        assert!(!link.dead);
        assert_eq!(graph.get(&about).unwrap().title, "About us");
        // the seed was fetched exactly once: the mock expects a single hit
    }

    #[tokio::test]
    async fn test_external_links_are_never_fetched() {
        let server = MockServer::start().await;
        serve(&server, "/", r#"<a href="https://other.com/x">ext</a>"#).await;

        let seed = format!("{}/", server.uri());
        let graph = crawl(&seed, config()).await.unwrap();

        assert_eq!(graph.len(), 1);
        let link = &graph.seed_page().unwrap().links[0];
        assert_eq!(link.kind, LinkKind::External);
        assert_eq!(link.text, "ext");
        assert_eq!(link.target, None);
        assert!(graph.get("https://other.com/x").is_none());
    }

    #[tokio::test]
    async fn test_shared_target_fetched_once() {
        let server = MockServer::start().await;
        serve(&server, "/", r#"<a href="/a">A</a><a href="/b">B</a>"#).await;
        serve(&server, "/a", r#"<a href="/shared">shared</a>"#).await;
        serve(&server, "/b", r#"<a href="/shared#part">shared</a>"#).await;
        serve(&server, "/shared", "<title>Shared</title>").await;

        let seed = format!("{}/", server.uri());
        let graph = crawl(&seed, config()).await.unwrap();

        let shared = format!("{}/shared", server.uri());
        assert_eq!(graph.len(), 4);
        let from_a = &graph.get(&format!("{}/a", server.uri())).unwrap().links[0];
        let from_b = &graph.get(&format!("{}/b", server.uri())).unwrap().links[0];
        assert_eq!(from_a.target.as_deref(), Some(shared.as_str()));
        assert_eq!(from_b.target.as_deref(), Some(shared.as_str()));
        assert_eq!(graph.target_of(from_a).unwrap().title, "Shared");
    }

    #[tokio::test]
    async fn test_dead_seed_in_unchecked_crawl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = format!("{}/", server.uri());
        let graph = Crawler::unchecked(&seed, config()).unwrap().run().await;

        assert_eq!(graph.len(), 1);
        let page = graph.seed_page().unwrap();
        assert_eq!(page.title, DEAD_PAGE_TITLE);
        assert!(page.links.is_empty());
        assert_eq!(page.status, PageStatus::Unreachable { status: 404 });
    }

    #[tokio::test]
    async fn test_connect_rejects_dead_seed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = format!("{}/", server.uri());
        let err = Crawler::connect(&seed, config()).await.err().unwrap();
        assert!(matches!(err, CrawlError::SeedStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_connect_rejects_slow_seed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = CrawlConfig {
            fetch_timeout: Duration::from_millis(50),
            ..config()
        };
        let err = Crawler::connect(&server.uri(), config).await.err().unwrap();
        assert!(matches!(err, CrawlError::SeedTimedOut(_)));
    }

    #[tokio::test]
    async fn test_dead_links_are_flagged() {
        let server = MockServer::start().await;
        serve(&server, "/", r#"<a href="/missing">gone</a><a href="/ok">ok</a>"#).await;
        serve(&server, "/ok", "<title>OK</title>").await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let seed = format!("{}/", server.uri());
        let graph = crawl(&seed, config()).await.unwrap();

        let links = &graph.seed_page().unwrap().links;
        assert!(links[0].dead);
        assert!(!links[1].dead);
        assert_eq!(graph.dead_links().len(), 1);
        let missing = graph.target_of(&links[0]).unwrap();
        assert_eq!(missing.title, DEAD_PAGE_TITLE);
    }

    #[tokio::test]
    async fn test_non_html_is_not_parsed() {
        let server = MockServer::start().await;
        serve(&server, "/", r#"<a href="/file.pdf">pdf</a>"#).await;
        Mock::given(method("GET"))
            .and(path("/file.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<a href="/hidden">x</a>"#, "application/pdf"),
            )
            .mount(&server)
            .await;

        let seed = format!("{}/", server.uri());
        let graph = crawl(&seed, config()).await.unwrap();

        let pdf = graph.get(&format!("{}/file.pdf", server.uri())).unwrap();
        assert!(pdf.links.is_empty());
        assert!(!pdf.is_dead());
        assert_eq!(graph.len(), 2);
    }

    // ---- crawls against an in-memory site ----------------------------------

    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, String>,
        fetches: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl FakeSite {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        fn fetch_count(&self, url: &str) -> usize {
            self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for FakeSite {
        async fn fetch(&self, url: &Url) -> FetchOutcome {
            let key = url.to_string();
            *self.fetches.lock().unwrap().entry(key.clone()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            if let Some((at, token)) = &self.cancel_on {
                if *at == key {
                    token.cancel();
                }
            }
            // Give other workers a chance to race us
            tokio::task::yield_now().await;

            match self.pages.get(&key) {
                Some(html) => FetchOutcome::Fetched {
                    status: 200,
                    final_url: url.clone(),
                    content_type: Some("text/html".to_string()),
                    body: stream::iter(vec![Ok::<_, FetchError>(Bytes::from(html.clone()))])
                        .boxed(),
                },
                None => FetchOutcome::Failed(FetchError::Network("connection refused".into())),
            }
        }
    }

    fn crawler(site: Arc<FakeSite>, config: CrawlConfig) -> Crawler {
        Crawler::with_fetcher("https://example.com/", config, site).unwrap()
    }

    // Every page links to every other page: lots of concurrent rediscovery
    fn mesh(size: usize) -> FakeSite {
        let links: String = (0..size)
            .map(|i| format!(r#"<a href="/p{i}">p{i}</a><a href="/p{i}#x">again</a>"#))
            .collect();
        let mut site = FakeSite::default().page("https://example.com/", &links);
        for i in 0..size {
            site = site.page(&format!("https://example.com/p{i}"), &links);
        }
        site
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_address_fetched_at_most_once() {
        let site = Arc::new(mesh(30));
        let config = CrawlConfig {
            workers: 16,
            ..CrawlConfig::default()
        };
        let graph = crawler(Arc::clone(&site), config).run().await;

        assert_eq!(graph.len(), 31);
        assert_eq!(site.total.load(Ordering::SeqCst), 31);
        for i in 0..30 {
            assert_eq!(site.fetch_count(&format!("https://example.com/p{i}")), 1);
        }
        // every link to /pN points at the same page
        for page in graph.pages() {
            for link in &page.links {
                assert_eq!(link.target, link.address);
            }
        }
    }

    #[tokio::test]
    async fn test_fragments_and_malformed_links_are_not_fetched() {
        let site = Arc::new(FakeSite::default().page(
            "https://example.com/",
            r##"<a href="#top">top</a><a href="  ">blank</a><a href="http://[::1">bad</a>"##,
        ));
        let graph = crawler(Arc::clone(&site), config()).run().await;

        assert_eq!(site.total.load(Ordering::SeqCst), 1);
        let kinds: Vec<_> = graph.seed_page().unwrap().links.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![LinkKind::Fragment, LinkKind::Malformed, LinkKind::Malformed]
        );
        assert_eq!(graph.malformed_links().len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_leaves_target_unresolved() {
        let site = Arc::new(
            FakeSite::default().page("https://example.com/", r#"<a href="/broken">b</a>"#),
        );
        let graph = crawler(Arc::clone(&site), config()).run().await;

        assert_eq!(graph.len(), 1);
        let link = &graph.seed_page().unwrap().links[0];
        assert_eq!(link.kind, LinkKind::Internal);
        assert_eq!(link.target, None);
        assert!(!link.dead);
        assert_eq!(site.fetch_count("https://example.com/broken"), 1);
    }

    #[tokio::test]
    async fn test_timed_out_page_is_dead() {
        struct Slow;

        #[async_trait]
        impl Fetcher for Slow {
            async fn fetch(&self, url: &Url) -> FetchOutcome {
                if url.path() == "/" {
                    let html = r#"<a href="/slow">slow</a>"#;
                    return FetchOutcome::Fetched {
                        status: 200,
                        final_url: url.clone(),
                        content_type: None,
                        body: stream::iter(vec![Ok::<_, FetchError>(Bytes::from_static(
                            html.as_bytes(),
                        ))])
                        .boxed(),
                    };
                }
                FetchOutcome::TimedOut
            }
        }

        let graph = Crawler::with_fetcher("https://example.com/", config(), Arc::new(Slow))
            .unwrap()
            .run()
            .await;

        let slow = graph.get("https://example.com/slow").unwrap();
        assert_eq!(slow.status, PageStatus::TimedOut);
        assert!(graph.seed_page().unwrap().links[0].dead);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let site = Arc::new(mesh(10));
        let config = CrawlConfig {
            admission: Admission::Capped(3),
            ..config()
        };
        let graph = crawler(Arc::clone(&site), config).run().await;

        assert_eq!(graph.len(), 3);
        assert_eq!(site.total.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_a_long_crawl() {
        // A chain /0 -> /1 -> ... -> /99, cancelled while fetching /3
        let token = CancellationToken::new();
        let mut site = FakeSite {
            cancel_on: Some(("https://example.com/3".to_string(), token.clone())),
            ..FakeSite::default()
        };
        site = site.page("https://example.com/", r#"<a href="/0">next</a>"#);
        for i in 0..100 {
            site = site.page(
                &format!("https://example.com/{i}"),
                &format!(r#"<a href="/{}">next</a>"#, i + 1),
            );
        }
        let site = Arc::new(site);

        let config = CrawlConfig {
            workers: 1,
            ..config()
        };
        let graph = tokio::time::timeout(
            Duration::from_secs(5),
            crawler(Arc::clone(&site), config).run_until_cancelled(token),
        )
        .await
        .expect("cancelled crawl should finish");

        assert!(graph.len() < 10, "crawled {} pages", graph.len());
        assert!(graph.get("https://example.com/3").is_some());
        // links only ever point at pages that are in the graph
        for page in graph.pages() {
            for link in &page.links {
                if let Some(target) = &link.target {
                    assert!(graph.get(target).is_some());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_subdomains_follow_scope_policy() {
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://example.com/",
                    r#"<a href="https://docs.example.com/">docs</a>"#,
                )
                .page("https://docs.example.com/", "<title>Docs</title>"),
        );
        let config = CrawlConfig {
            scope: ScopePolicy {
                include_subdomains: true,
                ..ScopePolicy::default()
            },
            ..config()
        };
        let graph = crawler(Arc::clone(&site), config).run().await;

        assert_eq!(graph.get("https://docs.example.com/").unwrap().title, "Docs");
    }

    #[test]
    fn test_bad_seeds_and_config() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(FakeSite::default());

        let err = Crawler::with_fetcher("not a url", config(), Arc::clone(&fetcher)).err();
        assert!(matches!(err, Some(CrawlError::InvalidSeed { .. })));

        let err = Crawler::with_fetcher("mailto:me@example.com", config(), Arc::clone(&fetcher)).err();
        assert!(matches!(err, Some(CrawlError::SeedWithoutHost(_))));

        let bad = CrawlConfig {
            workers: 0,
            ..config()
        };
        let err = Crawler::with_fetcher("https://example.com/", bad, fetcher).err();
        assert!(matches!(err, Some(CrawlError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_seed_is_canonical() {
        let site = Arc::new(FakeSite::default().page("https://example.com/", "<title>Home</title>"));
        let crawler = Crawler::with_fetcher("https://EXAMPLE.com#intro", config(), site).unwrap();
        assert_eq!(crawler.seed(), "https://example.com/");
        let graph = crawler.run().await;
        assert_eq!(graph.seed_page().unwrap().title, "Home");
    }
}
