use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shared::{run_ingest, Config, FeedsFile, Store};

#[derive(Parser)]
#[command(name = "ingest-feeds")]
#[command(about = "Fetch configured RSS/Atom feeds and store new articles")]
struct Args {
    /// Feeds file to read instead of $NEWS_DIGEST_HOME/feeds.json
    #[arg(short, long)]
    feeds: Option<PathBuf>,

    /// Only ingest enabled feeds in this category
    #[arg(short, long)]
    category: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;

    let feeds_path = args.feeds.unwrap_or_else(|| config.feeds_path());
    let feeds_file = FeedsFile::load(&feeds_path)
        .with_context(|| format!("Failed to load feeds from {}", feeds_path.display()))?;

    let feeds = match &args.category {
        Some(category) => feeds_file.feeds_in_category(category),
        None => feeds_file.enabled_feeds(),
    };

    let mut store = Store::open(&config.database_url).context("Failed to open database")?;

    println!("📡 Fetching {} feeds...", feeds.len());
    let report = run_ingest(&mut store, feeds, &feeds_file.settings)
        .await
        .context("Feed ingestion failed")?;

    println!(
        "✓ {}/{} feeds fetched, {} new articles, {} duplicates skipped",
        report.feeds_succeeded,
        report.feeds_attempted,
        report.articles_inserted,
        report.duplicates
    );

    if !report.failures.is_empty() {
        println!("\n⚠ {} feeds failed:", report.failures.len());
        for (url, error) in &report.failures {
            println!("  ✗ {}", url);
            println!("    {}", error);
        }
    }

    print_store_summary(&store)?;

    Ok(())
}

fn print_store_summary(store: &Store) -> Result<()> {
    let stats = store.stats().context("Failed to read store statistics")?;
    println!("\n✅ {} articles in store", stats.articles);
    println!("   Categories: {}", stats.categories);
    println!("   Countries: {}", stats.countries);

    let categories = store
        .category_counts()
        .context("Failed to count articles per category")?;
    if !categories.is_empty() {
        println!("\n📂 Articles by category:");
        for (category, count) in categories {
            println!("  {}: {}", category, count);
        }
    }

    let statuses = store.feed_statuses().context("Failed to read feed status")?;
    if !statuses.is_empty() {
        println!("\n📊 Feed status:");
        for status in statuses {
            let last_success = status
                .last_success_at
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {}: {} articles, last success: {}",
                status.name, status.articles_count, last_success
            );
            if let Some(error) = status.last_error {
                println!("    last error: {}", error);
            }
        }
    }

    Ok(())
}
