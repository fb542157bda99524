// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Set up logging (RUST_LOG overrides the default "info")
// 2. Parse command-line arguments using clap
// 3. Run the crawl, stopping early on Ctrl-C
// 4. Print the results as a table or as JSON
// 5. Exit with proper code (0 = success, 1 = dead links found, 2 = error)
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, CrawlArgs};
use link_graph::{CrawlGraph, Crawler, LinkReport, PageStatus};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole chain of causes on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = crawl finished (and, for `check`, no dead links)
//   Ok(1) = `check` found dead links
//   Err   = the crawl could not start
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => {
            let graph = crawl_site(&args).await?;
            print_graph(&graph, args.json)?;
            Ok(0)
        }
        Commands::Check(args) => {
            let graph = crawl_site(&args).await?;
            let dead = graph.dead_links();
            let malformed = graph.malformed_links();
            print_report(&dead, &malformed, args.json)?;

            if dead.is_empty() {
                Ok(0)
            } else {
                Ok(1)
            }
        }
    }
}

async fn crawl_site(args: &CrawlArgs) -> Result<CrawlGraph> {
    let config = args.to_config();

    let crawler = if args.no_seed_check {
        Crawler::unchecked(&args.seed, config)?
    } else {
        Crawler::connect(&args.seed, config)
            .await
            .with_context(|| format!("cannot start crawling {}", args.seed))?
    };

    // Ctrl-C stops the crawl; we still print what was found so far
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, finishing pages in flight");
                cancel.cancel();
            }
        });
    }

    Ok(crawler.run_until_cancelled(cancel).await)
}

fn print_graph(graph: &CrawlGraph, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(graph)?);
        return Ok(());
    }

    println!("{:<60} {:<12} {:<6} {:<30}", "URL", "STATUS", "LINKS", "TITLE");
    println!("{}", "=".repeat(110));
    for page in graph.pages() {
        println!(
            "{:<60} {:<12} {:<6} {:<30}",
            truncate(&page.address, 57),
            format_status(&page.status),
            page.links.len(),
            truncate(&page.title, 30)
        );
    }
    println!();

    let dead_pages = graph.pages().filter(|page| page.is_dead()).count();
    println!("📊 Summary:");
    println!("   📄 Pages: {}", graph.len());
    println!("   ❌ Dead pages: {}", dead_pages);
    println!("   🔗 Dead links: {}", graph.dead_links().len());
    Ok(())
}

fn print_report(dead: &[LinkReport<'_>], malformed: &[LinkReport<'_>], json: bool) -> Result<()> {
    if json {
        let report = serde_json::json!({ "dead": dead, "malformed": malformed });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if dead.is_empty() && malformed.is_empty() {
        println!("✅ No dead or malformed links found");
        return Ok(());
    }

    println!("{:<50} {:<12} {:<50}", "FOUND ON", "PROBLEM", "LINK");
    println!("{}", "=".repeat(112));
    for report in dead {
        println!(
            "{:<50} {:<12} {:<50}",
            truncate(report.source, 47),
            "❌ DEAD",
            truncate(&report.link.raw_target, 50)
        );
    }
    for report in malformed {
        println!(
            "{:<50} {:<12} {:<50}",
            truncate(report.source, 47),
            "⚠️  MALFORMED",
            truncate(&report.link.raw_target, 50)
        );
    }
    println!();
    println!("📊 Summary:");
    println!("   ❌ Dead: {}", dead.len());
    println!("   ⚠️  Malformed: {}", malformed.len());
    Ok(())
}

fn format_status(status: &PageStatus) -> String {
    match status {
        PageStatus::Fetched { status } => format!("✅ {}", status),
        PageStatus::Unreachable { status } => format!("❌ {}", status),
        PageStatus::TimedOut => "⏱️  TIMEOUT".to_string(),
    }
}

// Shortens long values for the table, on a character boundary
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let kept: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
