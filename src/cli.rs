//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::BackendKind;
use crate::models::{parse_clock_time, DreamType};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DreamWeaver - sleep and dream journal statistics
///
/// Log your dreams and nights, follow sleep challenges, and get a
/// report with averages and simple rule-based advice.
///
/// Examples:
///   dreamweaver log-dream --title "Flying" --description "Over the sea" --quality 4
///   dreamweaver log-sleep --bedtime 23:30 --wake 07:15 --quality 3
///   dreamweaver start 2
///   dreamweaver progress 2 --step 20
///   dreamweaver report --format json -o stats.json
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .dreamweaver.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Journal owner
    #[arg(short, long, value_name = "ID", env = "DREAMWEAVER_USER", global = true)]
    pub user: Option<String>,

    /// Record store backend
    #[arg(long, value_name = "BACKEND", global = true)]
    pub backend: Option<BackendKind>,

    /// Directory of the local JSON store
    #[arg(long, value_name = "DIR", env = "DREAMWEAVER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the hosted store
    #[arg(long, value_name = "URL", env = "DREAMWEAVER_REMOTE_URL", global = true)]
    pub remote_url: Option<String>,

    /// API key of the hosted store
    #[arg(long, env = "DREAMWEAVER_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Session token for the hosted store
    #[arg(long, env = "DREAMWEAVER_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print sleep and dream statistics with insights
    Report {
        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Log a dream
    LogDream {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        /// Night of the dream (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// Sleep quality from 1 to 5
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u8).range(1..=5))]
        quality: u8,

        /// Emotions felt (comma-separated)
        #[arg(long, value_delimiter = ',')]
        emotions: Vec<String>,

        /// Free-form tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// normal, lucid, nightmare, recurring or vivid
        #[arg(long, default_value = "normal")]
        dream_type: DreamType,

        /// The dreamer was aware of dreaming
        #[arg(long)]
        lucid: bool,
    },

    /// Log a night of sleep
    LogSleep {
        /// Night of the sleep (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        #[arg(long, default_value = "22:00", value_name = "HH:MM", value_parser = parse_clock_time)]
        bedtime: NaiveTime,

        #[arg(long, default_value = "06:00", value_name = "HH:MM", value_parser = parse_clock_time)]
        wake: NaiveTime,

        /// Sleep quality from 1 to 5
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u8).range(1..=5))]
        quality: u8,

        #[arg(long)]
        mood_before: Option<String>,

        #[arg(long)]
        mood_after: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List challenges with your progress
    Challenges,

    /// Start a challenge
    Start {
        challenge_id: String,
    },

    /// Record progress on an active challenge
    Progress {
        challenge_id: String,

        /// Set progress to this percentage
        #[arg(long, conflicts_with = "step", required_unless_present = "step")]
        set: Option<u8>,

        /// Add this many percentage points (capped at 100)
        #[arg(long)]
        step: Option<u8>,
    },

    /// Generate a default .dreamweaver.toml configuration file
    InitConfig,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            Command::Progress { set: Some(value), .. } if *value > 100 => {
                return Err("Progress must be between 0 and 100".to_string());
            }
            Command::Progress { step: Some(0), .. } => {
                return Err("Step must be at least 1".to_string());
            }
            Command::LogDream {
                title, description, ..
            } => {
                if title.trim().is_empty() {
                    return Err("Dream title must not be empty".to_string());
                }
                if description.trim().is_empty() {
                    return Err("Dream description must not be empty".to_string());
                }
            }
            _ => {}
        }

        // Validate remote URL if provided
        if let Some(ref url) = self.remote_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Remote URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `general.verbose` key of the config file;
    /// `--quiet` still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["dreamweaver"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_parse_report() {
        let args = parse(&["report", "--format", "json", "-o", "out.json"]);
        match args.command {
            Command::Report { format, output } => {
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_log_sleep_times() {
        let args = parse(&["log-sleep", "--bedtime", "23:30", "--wake", "07:15"]);
        match args.command {
            Command::LogSleep {
                bedtime,
                wake,
                quality,
                ..
            } => {
                assert_eq!(bedtime, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
                assert_eq!(wake, NaiveTime::from_hms_opt(7, 15, 0).unwrap());
                assert_eq!(quality, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_quality_out_of_range_rejected() {
        let result = Args::try_parse_from([
            "dreamweaver",
            "log-dream",
            "--title",
            "t",
            "--description",
            "d",
            "--quality",
            "6",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_dream_labels() {
        let args = parse(&[
            "log-dream",
            "--title",
            "Chase",
            "--description",
            "Running",
            "--emotions",
            "fear,anxiety",
            "--dream-type",
            "nightmare",
        ]);
        match args.command {
            Command::LogDream {
                emotions,
                dream_type,
                ..
            } => {
                assert_eq!(emotions, vec!["fear", "anxiety"]);
                assert_eq!(dream_type, DreamType::Nightmare);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_progress_requires_set_or_step() {
        assert!(Args::try_parse_from(["dreamweaver", "progress", "1"]).is_err());
        assert!(
            Args::try_parse_from(["dreamweaver", "progress", "1", "--set", "5", "--step", "5"])
                .is_err()
        );

        let args = parse(&["progress", "1", "--set", "120"]);
        assert!(args.validate().is_err());

        let args = parse(&["progress", "1", "--step", "20"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["-v", "-q", "challenges"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_blank_title() {
        let args = parse(&["log-dream", "--title", "  ", "--description", "x"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["challenges"]);
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut args = parse(&["challenges"]);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
