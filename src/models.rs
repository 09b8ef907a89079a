//! Data models for the sleep and dream journal.
//!
//! This module contains the record types, the challenge progress state
//! machine and the summary/report structures used throughout the
//! application.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Lowest accepted sleep quality rating.
pub const MIN_QUALITY: u8 = 1;
/// Highest accepted sleep quality rating.
pub const MAX_QUALITY: u8 = 5;
/// Progress value at which a challenge is completed.
pub const MAX_PROGRESS: u8 = 100;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Errors raised when user input does not satisfy the record invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sleep quality must be between 1 and 5, got {0}")]
    QualityOutOfRange(u8),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("unknown dream type '{0}'")]
    UnknownDreamType(String),
}

/// Errors raised by illegal challenge progress transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("challenge '{0}' has not been started")]
    NotActive(String),

    #[error("challenge '{0}' is already active")]
    AlreadyStarted(String),

    #[error("challenge '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("progress must be between 0 and 100, got {0}")]
    OutOfRange(u8),

    #[error("progress cannot go back from {current} to {requested}")]
    Regression { current: u8, requested: u8 },
}

/// Self-rated sleep quality on a 1-5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quality(u8);

impl Quality {
    /// Creates a quality rating, rejecting values outside 1-5.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (MIN_QUALITY..=MAX_QUALITY).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::QualityOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Quality {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, MAX_QUALITY)
    }
}

/// Kind of dream, as picked from the journal's fixed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DreamType {
    #[default]
    Normal,
    Lucid,
    Nightmare,
    Recurring,
    Vivid,
}

impl fmt::Display for DreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DreamType::Normal => write!(f, "Normal"),
            DreamType::Lucid => write!(f, "Lucid"),
            DreamType::Nightmare => write!(f, "Nightmare"),
            DreamType::Recurring => write!(f, "Recurring"),
            DreamType::Vivid => write!(f, "Vivid"),
        }
    }
}

impl FromStr for DreamType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(DreamType::Normal),
            "lucid" => Ok(DreamType::Lucid),
            "nightmare" => Ok(DreamType::Nightmare),
            "recurring" => Ok(DreamType::Recurring),
            "vivid" => Ok(DreamType::Vivid),
            other => Err(ValidationError::UnknownDreamType(other.to_string())),
        }
    }
}

/// A user's logged account of a dream plus self-rated sleep quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamRecord {
    pub id: String,
    pub user_id: String,
    pub dream_date: NaiveDate,
    pub sleep_quality: Quality,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub emotions: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub dream_type: DreamType,
    #[serde(default)]
    pub lucid: bool,
    pub created_at: DateTime<Utc>,
}

impl DreamRecord {
    /// Whether the dreamer reported being lucid, either by flag or by type.
    pub fn is_lucid(&self) -> bool {
        self.lucid || self.dream_type == DreamType::Lucid
    }
}

/// Dream as submitted by the user, before it gets an id.
#[derive(Debug, Clone)]
pub struct DreamDraft {
    pub dream_date: NaiveDate,
    pub sleep_quality: u8,
    pub title: String,
    pub description: String,
    pub emotions: Vec<String>,
    pub tags: Vec<String>,
    pub dream_type: DreamType,
    pub lucid: bool,
}

impl DreamDraft {
    /// Validate the draft and turn it into an immutable record owned by `user_id`.
    pub fn into_record(self, user_id: &str) -> Result<DreamRecord, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(ValidationError::EmptyField("description"));
        }

        Ok(DreamRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            dream_date: self.dream_date,
            sleep_quality: Quality::new(self.sleep_quality)?,
            title,
            description,
            emotions: normalize_labels(self.emotions),
            tags: normalize_labels(self.tags),
            dream_type: self.dream_type,
            lucid: self.lucid,
            created_at: Utc::now(),
        })
    }
}

/// Trim labels, drop empty ones and de-duplicate.
pub fn normalize_labels<I>(labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// A user's logged sleep session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub id: String,
    pub user_id: String,
    pub sleep_date: NaiveDate,
    #[serde(with = "clock_time")]
    pub bedtime: NaiveTime,
    #[serde(with = "clock_time")]
    pub wake_time: NaiveTime,
    pub sleep_duration_hours: f64,
    pub sleep_quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sleep session as submitted by the user.
#[derive(Debug, Clone)]
pub struct SleepDraft {
    pub sleep_date: NaiveDate,
    pub bedtime: NaiveTime,
    pub wake_time: NaiveTime,
    pub sleep_quality: u8,
    pub mood_before: Option<String>,
    pub mood_after: Option<String>,
    pub notes: Option<String>,
}

impl SleepDraft {
    /// Validate the draft, derive the duration and build the record.
    pub fn into_record(self, user_id: &str) -> Result<SleepRecord, ValidationError> {
        Ok(SleepRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            sleep_date: self.sleep_date,
            bedtime: self.bedtime,
            wake_time: self.wake_time,
            sleep_duration_hours: sleep_duration_hours(self.bedtime, self.wake_time),
            sleep_quality: Quality::new(self.sleep_quality)?,
            mood_before: non_empty(self.mood_before),
            mood_after: non_empty(self.mood_after),
            notes: non_empty(self.notes),
            created_at: Utc::now(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hours slept between `bedtime` and `wake_time`, wrapping past midnight.
///
/// Only hours and minutes are considered.
pub fn sleep_duration_hours(bedtime: NaiveTime, wake_time: NaiveTime) -> f64 {
    let bed = i64::from(bedtime.hour()) * 60 + i64::from(bedtime.minute());
    let wake = i64::from(wake_time.hour()) * 60 + i64::from(wake_time.minute());

    let mut minutes = wake - bed;
    if minutes < 0 {
        minutes += MINUTES_PER_DAY;
    }

    minutes as f64 / 60.0
}

/// Parse a wall-clock `HH:MM` time. Trailing seconds are accepted and dropped.
pub fn parse_clock_time(s: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map(|t| t.with_second(0).unwrap_or(t))
        .map_err(|_| ValidationError::InvalidTime(s.to_string()))
}

/// Serde adapter storing times as `HH:MM`.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_clock_time(&s).map_err(serde::de::Error::custom)
    }
}

/// Difficulty of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl Difficulty {
    /// Returns an emoji representation of the difficulty.
    pub fn emoji(&self) -> &'static str {
        match self {
            Difficulty::Easy => "🟢",
            Difficulty::Medium => "🟡",
            Difficulty::Hard => "🔴",
        }
    }
}

/// A gamified habit-forming task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: Difficulty,
    pub points: u32,
    /// Retired challenges stay stored but are no longer offered.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Challenges offered when the store has none yet.
pub fn default_challenges() -> Vec<Challenge> {
    vec![
        Challenge {
            id: "1".to_string(),
            title: "Log 3 dreams this week".to_string(),
            description: "Keep the habit of writing down your dreams regularly".to_string(),
            difficulty: Difficulty::Easy,
            points: 50,
            active: true,
        },
        Challenge {
            id: "2".to_string(),
            title: "Sleep 8 hours for 5 days".to_string(),
            description: "Build a healthy sleep routine".to_string(),
            difficulty: Difficulty::Medium,
            points: 100,
            active: true,
        },
        Challenge {
            id: "3".to_string(),
            title: "Meditate before bed".to_string(),
            description: "Practice 10 minutes of meditation before sleeping".to_string(),
            difficulty: Difficulty::Medium,
            points: 75,
            active: true,
        },
    ]
}

/// Lifecycle state of a user's challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    #[default]
    NotStarted,
    Active,
    Completed,
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeStatus::NotStarted => write!(f, "Not started"),
            ChallengeStatus::Active => write!(f, "Active"),
            ChallengeStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A user's progress on one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub user_id: String,
    pub challenge_id: String,
    pub status: ChallengeStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChallengeProgress {
    /// Progress entry for a challenge the user has not touched yet.
    pub fn not_started(user_id: &str, challenge_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            status: ChallengeStatus::NotStarted,
            progress: 0,
            completed_at: None,
        }
    }

    /// `not_started -> active`.
    pub fn start(&mut self) -> Result<(), ProgressError> {
        match self.status {
            ChallengeStatus::NotStarted => {
                self.status = ChallengeStatus::Active;
                self.progress = 0;
                Ok(())
            }
            ChallengeStatus::Active => Err(ProgressError::AlreadyStarted(self.challenge_id.clone())),
            ChallengeStatus::Completed => {
                Err(ProgressError::AlreadyCompleted(self.challenge_id.clone()))
            }
        }
    }

    /// Set the progress of an active challenge, completing it at 100.
    pub fn update(&mut self, progress: u8) -> Result<(), ProgressError> {
        match self.status {
            ChallengeStatus::NotStarted => {
                return Err(ProgressError::NotActive(self.challenge_id.clone()))
            }
            ChallengeStatus::Completed => {
                return Err(ProgressError::AlreadyCompleted(self.challenge_id.clone()))
            }
            ChallengeStatus::Active => {}
        }

        if progress > MAX_PROGRESS {
            return Err(ProgressError::OutOfRange(progress));
        }
        if progress < self.progress {
            return Err(ProgressError::Regression {
                current: self.progress,
                requested: progress,
            });
        }

        self.progress = progress;
        if progress == MAX_PROGRESS {
            self.status = ChallengeStatus::Completed;
            self.completed_at = Some(Utc::now());
        }

        Ok(())
    }

    /// Add `step` to the current progress, saturating at 100.
    pub fn advance(&mut self, step: u8) -> Result<(), ProgressError> {
        let next = self.progress.saturating_add(step).min(MAX_PROGRESS);
        self.update(next)
    }

    /// `status == completed` exactly when `progress == 100`.
    pub fn is_consistent(&self) -> bool {
        self.progress <= MAX_PROGRESS
            && (self.status == ChallengeStatus::Completed) == (self.progress == MAX_PROGRESS)
    }
}

/// Kind of canned advisory message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightKind {
    LowQuality,
    HighQuality,
    ShortSleep,
    DailyTip,
    None,
}

impl InsightKind {
    /// Returns an emoji representation of the insight.
    pub fn emoji(&self) -> &'static str {
        match self {
            InsightKind::LowQuality => "🌧️",
            InsightKind::HighQuality => "💚",
            InsightKind::ShortSleep => "⏰",
            InsightKind::DailyTip => "💡",
            InsightKind::None => "",
        }
    }
}

/// A canned advisory message selected by a threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
}

/// Completed/active counts and points earned across a user's challenges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeTotals {
    pub completed_count: usize,
    pub active_count: usize,
    pub total_points: u64,
}

/// Summary of the sleep tracker window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    pub total_nights: usize,
    pub avg_duration: f64,
    pub avg_quality: f64,
    pub best_streak: usize,
}

/// Headline numbers shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_dreams: usize,
    pub avg_sleep_quality: f64,
    pub avg_sleep_duration: f64,
    pub completed_challenges: usize,
    pub active_challenges: usize,
    pub total_points: u64,
}

/// A challenge joined with the user's progress on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub challenge: Challenge,
    pub status: ChallengeStatus,
    pub progress: u8,
}

/// Metadata about the statistics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    /// Storage backend the records were read from.
    pub backend: String,
    pub dream_window: usize,
    pub sleep_window: usize,
}

/// The complete statistics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub stats: DashboardStats,
    pub sleep: SleepSummary,
    pub lucid_dreams: usize,
    pub insights: Vec<Insight>,
    pub challenges: Vec<ChallengeView>,
    pub emotions: Vec<(String, usize)>,
    pub tags: Vec<(String, usize)>,
    pub recent_dreams: Vec<DreamRecord>,
}
