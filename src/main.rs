mod alert;
mod config;
mod db;
mod detect;
mod fetch;
mod monitor;
mod notify;
mod scan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::Settings;
use detect::city::TargetCity;
use fetch::HttpFetcher;
use monitor::Monitor;
use notify::TelegramNotifier;
use scan::{ScanOutcome, Scanner};

#[derive(Parser)]
#[command(name = "crous_monitor", about = "Watch CROUS housing listings for a city and alert on Telegram")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = config::DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,
    /// Scan history database
    #[arg(long, global = true, default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update and save settings
    Configure {
        /// City to monitor
        #[arg(long)]
        city: Option<String>,
        /// Telegram bot token
        #[arg(long)]
        token: Option<String>,
        /// Telegram chat id
        #[arg(long)]
        chat_id: Option<String>,
        /// Minutes between checks
        #[arg(long)]
        interval: Option<f64>,
        /// Result pages to scan per check (1-50)
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Show current settings
    Show,
    /// Run a single scan now
    Check {
        /// Print results without sending a notification
        #[arg(long)]
        dry_run: bool,
    },
    /// Monitor periodically until Ctrl+C
    Run,
    /// Show scan statistics
    Stats,
    /// Recent scans
    History {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Configure {
            city,
            token,
            chat_id,
            interval,
            max_pages,
        } => {
            let mut settings = Settings::load(&cli.settings)?;
            if let Some(c) = city {
                settings.city = c.trim().to_string();
            }
            if let Some(t) = token {
                settings.telegram_token = t.trim().to_string();
            }
            if let Some(c) = chat_id {
                settings.telegram_chat_id = c.trim().to_string();
            }
            if let Some(i) = interval {
                settings.interval_minutes = i;
            }
            if let Some(p) = max_pages {
                settings.max_pages = p;
            }
            settings.check_ranges()?;
            settings.save(&cli.settings)?;
            println!("Settings saved to {}", cli.settings.display());
            print_settings(&settings);
            Ok(())
        }
        Commands::Show => {
            let mut settings = Settings::load(&cli.settings)?;
            settings.apply_env();
            print_settings(&settings);
            Ok(())
        }
        Commands::Check { dry_run } => {
            let settings = load_validated(&cli.settings, !dry_run)?;
            let monitor = build_monitor(&settings, &cli.db)?;
            println!(
                "Checking {} (up to {} pages, strict postal code validation)...",
                alert::title_case(settings.city.trim()),
                settings.max_pages
            );
            let outcome = monitor.run_cycle(!dry_run).await?;
            print_outcome(&settings, &outcome);
            Ok(())
        }
        Commands::Run => {
            let settings = load_validated(&cli.settings, true)?;
            let monitor = build_monitor(&settings, &cli.db)?;
            println!("Press Ctrl+C to stop monitoring");
            monitor::supervise(
                monitor,
                settings.interval_minutes,
                monitor::until_signal(tokio::signal::ctrl_c()),
            )
            .await
        }
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Scans:         {}", s.total);
            println!("Found:         {}", s.found);
            println!("Empty:         {}", s.empty);
            println!("Fetch failed:  {}", s.fetch_failed);
            println!("Listings:      {}", s.hits);
            println!("Notified:      {}", s.notified);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, limit)?;
            if rows.is_empty() {
                println!("No scans recorded yet. Run 'check' or 'run' first.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<19} | {:<12} | {:<12} | {:>5} | {:>4} | {:<8} | {:>7}",
                "#", "Started", "City", "Outcome", "Pages", "Hits", "Notified", "Time"
            );
            println!("{}", "-".repeat(92));
            for r in &rows {
                println!(
                    "{:>5} | {:<19} | {:<12} | {:<12} | {:>5} | {:>4} | {:<8} | {:>6.1}s",
                    r.id,
                    r.started_at,
                    truncate(&r.city, 12),
                    r.outcome,
                    r.pages_scanned,
                    r.match_count,
                    if r.notified { "yes" } else { "no" },
                    r.duration_ms as f64 / 1000.0
                );
                if let Some(e) = &r.error {
                    println!("      └ {}", truncate(e, 80));
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_validated(path: &std::path::Path, require_telegram: bool) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path)?;
    settings.apply_env();
    settings.validate(require_telegram)?;
    Ok(settings)
}

fn build_monitor(
    settings: &Settings,
    db_path: &std::path::Path,
) -> anyhow::Result<Monitor<HttpFetcher, TelegramNotifier>> {
    let city = TargetCity::new(&settings.city)?;
    if city.prefix().is_none() {
        tracing::warn!(
            "No postal prefix known for {}; accepting any postal code next to the name",
            city.name()
        );
    }
    let fetcher = HttpFetcher::new(&format!("{}/", scan::BASE_URL))?;
    let scanner = Scanner::new(fetcher, city)?.with_progress(true);
    let notifier = Arc::new(TelegramNotifier::new(
        &settings.telegram_token,
        &settings.telegram_chat_id,
    ));
    let conn = db::connect(db_path).context("Failed to open scan history")?;
    db::init_schema(&conn)?;
    Ok(Monitor::new(
        scanner,
        notifier,
        conn,
        settings.max_pages,
        settings.interval_minutes,
    ))
}

fn print_settings(s: &Settings) {
    println!("City:             {}", s.city);
    println!("Telegram token:   {}", s.masked_token());
    println!("Telegram chat id: {}", s.telegram_chat_id);
    println!("Check interval:   {} minutes", s.interval_minutes);
    println!("Max pages:        {}", s.max_pages);
}

fn print_outcome(settings: &Settings, outcome: &ScanOutcome) {
    let city = alert::title_case(settings.city.trim());
    match outcome {
        ScanOutcome::FetchFailed(reason) => {
            println!("Scan failed, nothing was checked: {}", reason);
        }
        ScanOutcome::NoMatches { pages_scanned } => {
            println!(
                "No valid {} listings on {} page(s) (false positives filtered out)",
                city, pages_scanned
            );
        }
        ScanOutcome::Found {
            matches,
            pages_scanned,
        } => {
            println!(
                "{} found in {} valid listing(s) across {} page(s):\n",
                city,
                matches.len(),
                pages_scanned
            );
            println!(
                "{:>3} | {:>4} | {:<6} | {:<28} | {:<50}",
                "#", "Page", "Postal", "Title", "Context"
            );
            println!("{}", "-".repeat(104));
            for (i, m) in matches.iter().enumerate() {
                let o = &m.occurrence;
                println!(
                    "{:>3} | {:>4} | {:<6} | {:<28} | {:<50}",
                    i + 1,
                    m.page_number,
                    o.postal_code,
                    truncate(&o.title, 28),
                    truncate(&o.context, 50)
                );
                if let Some(link) = &o.link {
                    println!("    └ {}", link);
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
