use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;

use threadscout_common::{default_topics, Config, Keyword, Platform, ScrapeStatus};
use threadscout_scout::{relevance, ScrapeStats, SessionRegistry};

#[derive(Parser)]
#[command(name = "scout", about = "Search developer discussions across platforms")]
struct Cli {
    /// Keyword to search for. Repeatable; defaults to the built-in topic catalogue.
    #[arg(long = "keyword", short = 'k')]
    keywords: Vec<String>,

    /// Platform to search. Repeatable; defaults to all platforms.
    #[arg(long = "platform", short = 'p')]
    platforms: Vec<Platform>,

    /// Run LLM analysis over the collected records.
    #[arg(long)]
    analyze: bool,

    /// Extra focus for the analysis prompt.
    #[arg(long, requires = "analyze")]
    focus: Option<String>,

    /// Print records (sorted by relevance) and analysis as JSON instead of stats.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(threadscout_scout::log_filter()?)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    let keywords: Vec<Keyword> = if cli.keywords.is_empty() {
        default_topics().iter().flat_map(|t| t.to_keywords()).collect()
    } else {
        cli.keywords.iter().map(Keyword::new).collect()
    };
    let platforms = if cli.platforms.is_empty() {
        Platform::ALL.to_vec()
    } else {
        cli.platforms
    };

    let registry = SessionRegistry::from_config(&config)?;
    if cli.analyze && !registry.analysis_configured() {
        bail!("--analyze requires OPENAI_API_KEY");
    }

    let handle = registry.start(keywords, platforms)?;
    info!(session_id = %handle.id(), "Scout run started");

    // Ctrl-C asks the run to stop at the next page boundary.
    let canceller = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            canceller.cancel();
        }
    });

    let snapshot = handle.wait().await;
    let stats = ScrapeStats::from_snapshot(&snapshot);

    let analysis = if cli.analyze && snapshot.total_records > 0 {
        Some(registry.analyze(handle.id(), cli.focus.as_deref()).await?)
    } else {
        None
    };

    if cli.json {
        let mut records = handle.records().map(|r| r.to_vec()).unwrap_or_default();
        relevance::sort_by_relevance(&mut records);
        let out = serde_json::json!({
            "session": snapshot,
            "records": records,
            "analysis": analysis,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{stats}");
        for failed in &snapshot.failed_pairs {
            println!(
                "  ! {} / {}: {}{}",
                failed.platform.display_name(),
                failed.keyword,
                failed.message,
                if failed.partial { " (partial)" } else { "" }
            );
        }
        if let Some(analysis) = &analysis {
            println!("\n=== Analysis ({}) ===\n{}", analysis.model, analysis.summary);
        }
    }

    if snapshot.status == ScrapeStatus::Failed {
        bail!("every platform/keyword pair failed");
    }
    Ok(())
}
