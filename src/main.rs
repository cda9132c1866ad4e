//! feedscout command-line interface
//!
//! Searches the given URLs for feeds and prints the results as JSON (or an
//! OPML subscription list). Exits 0 when at least one seed was reachable,
//! 1 when every seed failed.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use feedscout::output::output_opml;
use feedscout::{search_with_info, SearchConfig, TryUrls};
use tracing_subscriber::EnvFilter;

/// Discover RSS, Atom, and JSON feeds on websites
#[derive(Parser, Debug)]
#[command(name = "feedscout")]
#[command(version)]
#[command(about = "Discover RSS, Atom, and JSON feeds on websites", long_about = None)]
struct Cli {
    /// Seed URLs to search
    #[arg(value_name = "URL")]
    seeds: Vec<String>,

    /// Comma-separated seed URLs (alternative to positional URLs)
    #[arg(long, value_name = "A,B,C")]
    urls: Option<String>,

    /// Probe common feed paths on each origin; pass a comma-separated list
    /// to override the built-in paths
    #[arg(long, value_name = "PATHS", num_args = 0..=1, default_missing_value = "")]
    try_urls: Option<String>,

    /// Worker pool size
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Global crawl timeout in seconds
    #[arg(long, default_value_t = 10.0, value_name = "SECS")]
    timeout: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 3.0, value_name = "SECS")]
    request_timeout: f64,

    /// Minimum delay between requests to one host, in seconds
    #[arg(long, default_value_t = 0.0, value_name = "SECS")]
    delay: f64,

    /// Maximum link depth from the seeds
    #[arg(long, default_value_t = 10)]
    max_depth: u32,

    /// User-Agent header
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Do not fetch seed origin pages for site metadata
    #[arg(long)]
    no_crawl_hosts: bool,

    /// Ignore robots.txt disallow rules
    #[arg(long)]
    no_robots: bool,

    /// Do not inline favicons as data URIs
    #[arg(long)]
    no_favicon_data_uri: bool,

    /// Output an OPML subscription list instead of JSON
    #[arg(long)]
    opml: bool,

    /// Include crawl statistics in the JSON output
    #[arg(long)]
    stats: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let mut urls: Vec<String> = cli.seeds.clone();
    if let Some(list) = &cli.urls {
        urls.extend(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }

    if urls.is_empty() {
        eprintln!("error: no URLs given; pass positional URLs or --urls");
        std::process::exit(1);
    }

    let config = build_config(&cli);
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let result = search_with_info(&url_refs, config).await;

    if let Some(error) = &result.root_error {
        tracing::warn!(url = %error.url, error_type = %error.error_type, "all seed URLs failed");
    }
    tracing::info!(feeds = result.feeds.len(), "search finished");

    let failed = result.root_error.is_some();
    if let Err(e) = print_output(&cli, &result) {
        eprintln!("error: failed to write output: {e}");
        std::process::exit(1);
    }

    std::process::exit(if failed { 1 } else { 0 });
}

fn build_config(cli: &Cli) -> SearchConfig {
    let mut config = SearchConfig {
        crawl_hosts: !cli.no_crawl_hosts,
        concurrency: cli.concurrency,
        total_timeout: Duration::from_secs_f64(cli.timeout),
        request_timeout: Duration::from_secs_f64(cli.request_timeout),
        max_depth: cli.max_depth,
        favicon_data_uri: !cli.no_favicon_data_uri,
        delay: Duration::from_secs_f64(cli.delay),
        respect_robots: !cli.no_robots,
        include_stats: cli.stats,
        ..SearchConfig::default()
    };

    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }

    config.try_urls = match &cli.try_urls {
        None => TryUrls::Disabled,
        Some(list) if list.trim().is_empty() => TryUrls::Defaults,
        Some(list) => TryUrls::Paths(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
    };

    config
}

fn print_output(
    cli: &Cli,
    result: &feedscout::SearchResult,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cli.opml {
        let bytes = output_opml(&result.feeds)?;
        out.write_all(&bytes)?;
        out.write_all(b"\n")?;
    } else if cli.stats {
        serde_json::to_writer_pretty(&mut out, result)?;
        out.write_all(b"\n")?;
    } else {
        serde_json::to_writer_pretty(&mut out, &result.feeds)?;
        out.write_all(b"\n")?;
    }

    Ok(())
}

/// Sets up the tracing subscriber based on verbosity level.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("feedscout=warn"),
            1 => EnvFilter::new("feedscout=info"),
            2 => EnvFilter::new("feedscout=debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
