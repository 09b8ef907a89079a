//! DreamWeaver - sleep and dream journal statistics
//!
//! A CLI tool that logs dreams and nights of sleep, tracks sleep
//! challenges and reports averages with simple rule-based advice.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, configuration or store error

mod analysis;
mod cli;
mod config;
mod models;
mod report;
mod store;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use cli::{Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{
    ChallengeProgress, DashboardStats, DreamDraft, Report, ReportMetadata, SleepDraft,
};
use std::path::Path;
use std::time::Duration;
use store::{ChallengeStore, RecordStore, Store};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // The config is loaded first so that its verbose flag reaches the logger
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("DreamWeaver v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(args, config).await {
        error!("Command failed: {}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle init-config: generate a default .dreamweaver.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose the store, the user and the record windows.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: a tracing subscriber was already installed");
    }
}

/// Dispatch the parsed subcommand.
async fn run(args: Args, config: Config) -> Result<()> {
    let store = Store::from_config(&config.storage)?;
    match &store {
        Store::Local(local) => debug!("Local store at {}", local.root().display()),
        Store::Remote(_) => debug!("Remote store at {:?}", config.storage.remote_url),
    }

    let user_id = config.general.user_id.clone();

    match args.command {
        Command::Report { format, output } => {
            let report = build_report(&store, &config, args.quiet).await?;
            let rendered = match format {
                OutputFormat::Json => report::generate_json_report(&report)?,
                OutputFormat::Markdown => report::generate_markdown_report(&report),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered).with_context(|| {
                        format!("Failed to write report to {}", path.display())
                    })?;
                    println!("✅ Report saved to: {}", path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Command::LogDream {
            title,
            description,
            date,
            quality,
            emotions,
            tags,
            dream_type,
            lucid,
        } => {
            let draft = DreamDraft {
                dream_date: date.unwrap_or_else(today),
                sleep_quality: quality,
                title,
                description,
                emotions,
                tags,
                dream_type,
                lucid,
            };
            let record = draft.into_record(&user_id)?;
            store.add_dream(&record).await?;

            info!("Stored dream {} for {}", record.id, user_id);
            println!(
                "🌙 Logged \"{}\" ({}, quality {})",
                record.title, record.dream_date, record.sleep_quality
            );
        }

        Command::LogSleep {
            date,
            bedtime,
            wake,
            quality,
            mood_before,
            mood_after,
            notes,
        } => {
            let draft = SleepDraft {
                sleep_date: date.unwrap_or_else(today),
                bedtime,
                wake_time: wake,
                sleep_quality: quality,
                mood_before,
                mood_after,
                notes,
            };
            let record = draft.into_record(&user_id)?;
            store.add_sleep(&record).await?;

            info!("Stored sleep record {} for {}", record.id, user_id);
            println!(
                "😴 Logged {} → {} on {}: {}h, quality {}",
                record.bedtime.format("%H:%M"),
                record.wake_time.format("%H:%M"),
                record.sleep_date,
                analysis::round_to_tenth(record.sleep_duration_hours),
                record.sleep_quality
            );
        }

        Command::Challenges => {
            let (challenges, progress) = futures::try_join!(
                store.fetch_challenges(),
                store.fetch_user_progress(&user_id)
            )?;

            let views = analysis::challenge_views(&challenges, &progress);
            let totals =
                analysis::compute_challenge_totals(&progress, &analysis::point_values(&challenges));

            println!("🏆 Challenges for {}\n", user_id);
            for view in &views {
                println!(
                    "   [{}] {} {} ({} pts, {})",
                    view.challenge.id,
                    view.challenge.difficulty.emoji(),
                    view.challenge.title,
                    view.challenge.points,
                    view.challenge.difficulty
                );
                println!("       {} - {}%", view.status, view.progress);
            }
            println!(
                "\n   Completed: {} | Active: {} | Points: {}",
                totals.completed_count, totals.active_count, totals.total_points
            );
        }

        Command::Start { challenge_id } => {
            let progress = store.start_challenge(&user_id, &challenge_id).await?;
            println!(
                "🎯 Started challenge {} ({})",
                progress.challenge_id, progress.status
            );
        }

        Command::Progress {
            challenge_id,
            set,
            step,
        } => {
            let target = match (set, step) {
                (Some(value), _) => value,
                (None, Some(step)) => {
                    let current = store
                        .fetch_user_progress(&user_id)
                        .await?
                        .into_iter()
                        .find(|p| p.challenge_id == challenge_id)
                        .unwrap_or_else(|| ChallengeProgress::not_started(&user_id, &challenge_id));

                    let mut next = current;
                    next.advance(step)?;
                    next.progress
                }
                (None, None) => anyhow::bail!("Either --set or --step is required"),
            };

            let progress = store
                .update_progress(&user_id, &challenge_id, target)
                .await?;

            if progress.completed_at.is_some() {
                println!("🏆 Challenge {} completed!", progress.challenge_id);
            } else {
                println!(
                    "📈 Challenge {}: {}% ({})",
                    progress.challenge_id, progress.progress, progress.status
                );
            }
        }

        Command::InitConfig => handle_init_config()?,
    }

    Ok(())
}

/// Fetch every window concurrently and aggregate them into a report.
async fn build_report(store: &Store, config: &Config, quiet: bool) -> Result<Report> {
    let user_id = config.general.user_id.as_str();
    let window = &config.window;

    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Loading records from the {} store...", store.name()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let fetched = futures::try_join!(
        store.count_dreams(user_id),
        store.fetch_recent_dreams(user_id, window.dream_limit),
        store.fetch_recent_sleep(user_id, window.sleep_limit),
        store.fetch_recent_sleep(user_id, window.tracker_limit),
        store.fetch_challenges(),
        store.fetch_user_progress(user_id),
    );

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let (dream_count, dreams, recent_sleep, tracker_sleep, challenges, progress) = fetched?;

    debug!(
        "Fetched {} of {} dreams, {} recent nights, {} tracked nights, {} challenges",
        dreams.len(),
        dream_count,
        recent_sleep.len(),
        tracker_sleep.len(),
        challenges.len()
    );

    if progress.iter().any(|p| !p.is_consistent()) {
        warn!("Some challenge progress entries have an inconsistent status");
    }

    let (emotions, tags) = if config.report.include_distributions {
        (
            analysis::emotion_distribution(&dreams),
            analysis::tag_distribution(&dreams),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let recent_dreams = dreams
        .iter()
        .take(config.report.recent_dreams)
        .cloned()
        .collect();

    Ok(Report {
        metadata: ReportMetadata {
            user_id: user_id.to_string(),
            generated_at: Utc::now(),
            backend: store.name().to_string(),
            dream_window: window.dream_limit,
            sleep_window: window.sleep_limit,
        },
        // Averages use the window, the headline count the whole journal
        stats: DashboardStats {
            total_dreams: dream_count.max(dreams.len()),
            ..analysis::dashboard_stats(&dreams, &recent_sleep, &progress, &challenges)
        },
        sleep: analysis::sleep_summary(&tracker_sleep),
        lucid_dreams: analysis::lucid_count(&dreams),
        insights: analysis::build_insights(&dreams, &recent_sleep),
        challenges: analysis::challenge_views(&challenges, &progress),
        emotions,
        tags,
        recent_dreams,
    })
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// The calendar day on this machine.
fn today() -> NaiveDate {
    Local::now().date_naive()
}
