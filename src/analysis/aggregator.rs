//! Sleep and dream statistics.
//!
//! This module provides pure functions computing averages, rule-based
//! insights and challenge totals over an already-fetched window of records.
//! None of them fail: empty input yields zero averages and no insight.

use crate::models::{
    Challenge, ChallengeProgress, ChallengeStatus, ChallengeTotals, ChallengeView,
    DashboardStats, DreamRecord, Insight, InsightKind, SleepRecord, SleepSummary,
};
use std::collections::{BTreeSet, HashMap};

/// Average quality strictly below this is flagged as poor sleep.
pub const LOW_QUALITY_THRESHOLD: f64 = 3.0;
/// Average quality at or above this is praised.
pub const HIGH_QUALITY_THRESHOLD: f64 = 4.0;
/// Average nightly hours strictly below this is flagged as short sleep.
pub const SHORT_SLEEP_HOURS: f64 = 7.0;
/// Minimum number of sleep records before the duration rule applies.
pub const MIN_DURATION_SAMPLE: usize = 3;

const DAILY_TIP: &str = "Avoid caffeine 6 hours before bed to improve your sleep quality.";

fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean self-rated quality over the dreams, 0 when there are none.
pub fn average_sleep_quality(dreams: &[DreamRecord]) -> f64 {
    mean(dreams.iter().map(|d| f64::from(d.sleep_quality.value())))
}

/// Mean hours slept over the sleep records, 0 when there are none.
pub fn average_sleep_duration(records: &[SleepRecord]) -> f64 {
    mean(records.iter().map(|r| r.sleep_duration_hours))
}

/// Mean quality of the sleep records themselves, 0 when there are none.
pub fn average_sleep_record_quality(records: &[SleepRecord]) -> f64 {
    mean(records.iter().map(|r| f64::from(r.sleep_quality.value())))
}

pub fn classify_quality_insight(avg: f64) -> InsightKind {
    if avg < LOW_QUALITY_THRESHOLD {
        InsightKind::LowQuality
    } else if avg >= HIGH_QUALITY_THRESHOLD {
        InsightKind::HighQuality
    } else {
        InsightKind::None
    }
}

/// Short-sleep rule; needs at least [`MIN_DURATION_SAMPLE`] records.
pub fn classify_duration_insight(avg: f64, sample_size: usize) -> InsightKind {
    if sample_size >= MIN_DURATION_SAMPLE && avg < SHORT_SLEEP_HOURS {
        InsightKind::ShortSleep
    } else {
        InsightKind::None
    }
}

/// Count completed and active challenges and sum the points of completed ones.
///
/// Challenge ids missing from `point_value_of` are worth nothing.
pub fn compute_challenge_totals(
    progress_list: &[ChallengeProgress],
    point_value_of: &HashMap<String, u32>,
) -> ChallengeTotals {
    let mut totals = ChallengeTotals::default();

    for progress in progress_list {
        match progress.status {
            ChallengeStatus::Completed => {
                totals.completed_count += 1;
                totals.total_points += point_value_of
                    .get(&progress.challenge_id)
                    .copied()
                    .map(u64::from)
                    .unwrap_or(0);
            }
            ChallengeStatus::Active => totals.active_count += 1,
            ChallengeStatus::NotStarted => {}
        }
    }

    totals
}

/// Map challenge ids to their point values.
pub fn point_values(challenges: &[Challenge]) -> HashMap<String, u32> {
    challenges
        .iter()
        .map(|c| (c.id.clone(), c.points))
        .collect()
}

/// Round for display to one decimal place.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Canned message for an insight kind.
///
/// `avg_duration` is only used by the short-sleep message.
pub fn describe_insight(kind: InsightKind, avg_duration: f64) -> Option<Insight> {
    let (title, description) = match kind {
        InsightKind::LowQuality => (
            "Low Sleep Quality",
            "Your dreams point to below-average sleep quality. Let's work on it together!"
                .to_string(),
        ),
        InsightKind::HighQuality => (
            "Great Sleep Quality!",
            "You are sleeping really well! Keep it up.".to_string(),
        ),
        InsightKind::ShortSleep => (
            "Sleep More",
            format!(
                "You are sleeping {:.1}h on average. Try to get 7-9h.",
                avg_duration
            ),
        ),
        InsightKind::DailyTip => ("Tip of the Day", DAILY_TIP.to_string()),
        InsightKind::None => return None,
    };

    Some(Insight {
        kind,
        title: title.to_string(),
        description,
    })
}

/// Build the coach insights for a window of dreams and sleep records.
///
/// The quality rule only runs when there is at least one dream; the tip of
/// the day is always last.
pub fn build_insights(dreams: &[DreamRecord], sleep: &[SleepRecord]) -> Vec<Insight> {
    let mut insights = Vec::new();

    if !dreams.is_empty() {
        let kind = classify_quality_insight(average_sleep_quality(dreams));
        insights.extend(describe_insight(kind, 0.0));
    }

    let avg_duration = average_sleep_duration(sleep);
    let kind = classify_duration_insight(avg_duration, sleep.len());
    insights.extend(describe_insight(kind, avg_duration));

    insights.extend(describe_insight(InsightKind::DailyTip, 0.0));

    insights
}

/// Longest run of consecutive calendar dates with a sleep record.
pub fn best_streak(records: &[SleepRecord]) -> usize {
    let dates: BTreeSet<_> = records.iter().map(|r| r.sleep_date).collect();

    let mut best = 0;
    let mut current = 0;
    let mut previous = None;

    for date in dates {
        current = match previous {
            Some(prev) if prev + chrono::Days::new(1) == date => current + 1,
            _ => 1,
        };
        best = best.max(current);
        previous = Some(date);
    }

    best
}

/// Summary numbers for the sleep tracker window.
pub fn sleep_summary(records: &[SleepRecord]) -> SleepSummary {
    SleepSummary {
        total_nights: records.len(),
        avg_duration: average_sleep_duration(records),
        avg_quality: average_sleep_record_quality(records),
        best_streak: best_streak(records),
    }
}

fn label_distribution<F>(dreams: &[DreamRecord], labels: F) -> Vec<(String, usize)>
where
    F: Fn(&DreamRecord) -> &BTreeSet<String>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for dream in dreams {
        for label in labels(dream) {
            *counts.entry(label.as_str()).or_default() += 1;
        }
    }

    let mut distribution: Vec<_> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();

    distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    distribution
}

/// How often each emotion appears, most frequent first.
pub fn emotion_distribution(dreams: &[DreamRecord]) -> Vec<(String, usize)> {
    label_distribution(dreams, |d| &d.emotions)
}

/// How often each tag appears, most frequent first.
pub fn tag_distribution(dreams: &[DreamRecord]) -> Vec<(String, usize)> {
    label_distribution(dreams, |d| &d.tags)
}

pub fn lucid_count(dreams: &[DreamRecord]) -> usize {
    dreams.iter().filter(|d| d.is_lucid()).count()
}

/// Headline dashboard numbers.
///
/// `total_dreams` is the size of the given window; a caller that knows the
/// size of the whole journal replaces it.
pub fn dashboard_stats(
    dreams: &[DreamRecord],
    sleep: &[SleepRecord],
    progress: &[ChallengeProgress],
    challenges: &[Challenge],
) -> DashboardStats {
    let totals = compute_challenge_totals(progress, &point_values(challenges));

    DashboardStats {
        total_dreams: dreams.len(),
        avg_sleep_quality: average_sleep_quality(dreams),
        avg_sleep_duration: average_sleep_duration(sleep),
        completed_challenges: totals.completed_count,
        active_challenges: totals.active_count,
        total_points: totals.total_points,
    }
}

/// Join every challenge with the user's progress on it.
pub fn challenge_views(
    challenges: &[Challenge],
    progress: &[ChallengeProgress],
) -> Vec<ChallengeView> {
    challenges
        .iter()
        .map(|challenge| {
            let user_progress = progress.iter().find(|p| p.challenge_id == challenge.id);
            ChallengeView {
                challenge: challenge.clone(),
                status: user_progress.map(|p| p.status).unwrap_or_default(),
                progress: user_progress.map(|p| p.progress).unwrap_or(0),
            }
        })
        .collect()
}
