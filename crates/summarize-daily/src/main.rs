use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use shared::{
    default_target_day, preview_prompt, run_daily_summary, ClaudeClient, Config, DailyOutcome,
    Store,
};

#[derive(Parser)]
#[command(name = "summarize-daily")]
#[command(about = "Summarize one day's ingested articles with Claude")]
struct Args {
    /// Day to summarize (YYYY-MM-DD, UTC). Defaults to yesterday.
    #[arg(short, long, value_parser = parse_day)]
    date: Option<NaiveDate>,

    /// Print the prompt that would be sent without calling the API
    #[arg(long)]
    preview: bool,
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("date must be in YYYY-MM-DD format, got {raw}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    shared::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;
    let day = args.date.unwrap_or_else(default_target_day);

    let mut store = Store::open(&config.database_url).context("Failed to open database")?;

    if args.preview {
        return preview(&store, &config, day);
    }

    let llm = ClaudeClient::new(config.llm_settings()?)?;

    eprintln!("🤖 Summarizing articles for {} with {}...", day, llm.model());
    let outcome = run_daily_summary(&mut store, &llm, day)
        .await
        .with_context(|| format!("Failed to summarize {}", day))?;

    match outcome {
        DailyOutcome::NothingToSummarize => {
            eprintln!("No unsummarized articles found for {}", day);
        }
        DailyOutcome::AlreadySummarized(summary) => {
            eprintln!(
                "Summary for {} already exists ({} articles, generated {})",
                day,
                summary.article_keys.len(),
                summary.generated_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        DailyOutcome::Created(summary) => {
            eprintln!(
                "✅ Created summary for {} from {} articles\n",
                day,
                summary.article_keys.len()
            );
            println!("{}", summary.text);
        }
    }

    Ok(())
}

fn preview(store: &Store, config: &Config, day: NaiveDate) -> Result<()> {
    let Some((count, prompt)) = preview_prompt(store, day)? else {
        println!("No unsummarized articles found for {}", day);
        return Ok(());
    };

    println!("Found {} articles for {}\n", count, day);
    println!("Prompt that would be sent:\n");
    println!("{}\n", prompt);
    println!("Model: {} (max_tokens {})", config.model, config.max_tokens);

    Ok(())
}
