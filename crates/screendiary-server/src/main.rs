// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use screendiary_core::deps::check_dependencies;
use screendiary_core::Config;
use screendiary_db::DatabaseManager;
use screendiary_server::activity::{
    compute_metrics, detect_breaks, merge_sessions, DEFAULT_GAP_THRESHOLD_SECONDS,
    DEFAULT_MIN_BREAK_SECONDS,
};
use screendiary_server::daemon::Daemon;
use screendiary_server::search::SearchEngine;
use screendiary_server::{ai, logging, summary};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "screendiary", version, about = "Desktop activity recorder")]
struct Cli {
    /// Config file path (otherwise the usual search order applies)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the capture daemon
    Capture,
    /// Show catalog statistics
    Status,
    /// Full-text search over everything captured
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Derived activity timeline for one day (JSON)
    Activity {
        /// Day as YYYY-MM-DD
        date: String,
        /// Force a fresh AI narrative instead of the cached one
        #[arg(long)]
        regenerate: bool,
    },
    /// Message of the day, derived from the cached day summary
    Motd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.logging, &config.storage.data_dir);

    match cli.command {
        Command::Capture => run_capture(config).await,
        Command::Status => run_status(config).await,
        Command::Search { query, limit, json } => run_search(config, &query, limit, json).await,
        Command::Activity { date, regenerate } => run_activity(config, &date, regenerate).await,
        Command::Motd => run_motd(config).await,
    }
}

async fn open_database(config: &Config) -> Result<Arc<DatabaseManager>> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!(
            "failed to create data dir {}",
            config.storage.data_dir.display()
        )
    })?;
    let url = format!("sqlite:{}", config.storage.db_path().display());
    let db = DatabaseManager::new(&url)
        .await
        .context("failed to open database")?;
    Ok(Arc::new(db))
}

async fn run_capture(config: Config) -> Result<()> {
    check_dependencies(&[config.capture.tool.as_str(), "tesseract", "ffmpeg"])?;

    let config = Arc::new(config);
    let db = open_database(&config).await?;
    let mut daemon = Daemon::new(config, db);
    daemon.run().await
}

async fn run_status(config: Config) -> Result<()> {
    let db = open_database(&config).await?;
    let stats = db.get_stats().await?;
    db.close().await;

    println!("ScreenDiary Status");
    println!("{}", "=".repeat(40));
    println!("Screenshots:  {}", stats.total_screenshots);
    println!("  Live:       {}", stats.live_screenshots);
    println!("  Archived:   {}", stats.archived_screenshots);
    println!("OCR Results:  {}", stats.ocr_results);
    println!("Embeddings:   {}", stats.embeddings);
    println!("Segments:     {}", stats.video_segments);
    println!("Storage:      {} GB", stats.storage_gb);
    Ok(())
}

async fn run_search(config: Config, query: &str, limit: i64, json: bool) -> Result<()> {
    let db = open_database(&config).await?;
    let ai_client = config
        .ai
        .enabled
        .then(|| Arc::new(ai::AiClient::new(&config.ai)));
    let engine = SearchEngine::new(db.clone(), ai_client);

    let results = engine.text_search(query, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("no results for \"{}\"", query);
    } else {
        for result in &results {
            let snippet = result
                .highlights
                .first()
                .map(String::as_str)
                .unwrap_or("")
                .replace("<mark>", "")
                .replace("</mark>", "");
            println!(
                "#{:<6} {}  score {:>6.2}  {}",
                result.screenshot.id,
                result.screenshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
                result.score,
                snippet
            );
        }
    }
    db.close().await;
    Ok(())
}

async fn run_activity(config: Config, date: &str, regenerate: bool) -> Result<()> {
    let db = open_database(&config).await?;

    let events = db.get_window_events_for_day(date).await?;
    let sessions = merge_sessions(&events, DEFAULT_GAP_THRESHOLD_SECONDS);
    let breaks = detect_breaks(&sessions, DEFAULT_MIN_BREAK_SECONDS);
    let metrics = compute_metrics(&sessions, &breaks);

    let mut ai_summary = None;
    if config.ai.enabled && !config.ai.api_key.is_empty() && !events.is_empty() {
        let cached = db.get_cached_day_summary(date).await?;
        if let (Some(cached), false) = (&cached, regenerate) {
            ai_summary = serde_json::from_str(&cached.summary_text).ok();
        }
        if regenerate {
            let client = ai::AiClient::new(&config.ai);
            if let Some(result) = summary::generate_ai_summary(&client, &sessions, &metrics).await
            {
                db.save_day_summary(
                    date,
                    &result.to_string(),
                    client.chat_model(),
                    events.len() as i64,
                )
                .await?;
                ai_summary = Some(result);
            }
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "date": date,
            "sessions": sessions,
            "metrics": metrics,
            "breaks": breaks,
            "ai_summary": ai_summary,
        }))?
    );
    db.close().await;
    Ok(())
}

async fn run_motd(config: Config) -> Result<()> {
    let db = open_database(&config).await?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();

    if let Some(cached) = db.get_cached_motd(&today).await? {
        println!("{}", cached);
        db.close().await;
        return Ok(());
    }

    if !config.ai.enabled || config.ai.api_key.is_empty() {
        db.close().await;
        return Ok(());
    }

    let summary_text = db
        .get_cached_day_summary(&today)
        .await?
        .map(|s| s.summary_text);
    let client = ai::AiClient::new(&config.ai);
    if let Some(motd) = summary::generate_motd(&client, summary_text.as_deref(), &today).await {
        db.save_motd(&today, &motd).await?;
        println!("{}", motd);
    }
    db.close().await;
    Ok(())
}
