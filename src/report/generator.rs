//! Markdown and JSON report generation.
//!
//! This module renders the aggregated journal statistics. Averages are
//! rounded to a tenth for display only.

use crate::analysis::round_to_tenth;
use crate::models::{
    ChallengeStatus, ChallengeView, DashboardStats, DreamRecord, Insight, Report, ReportMetadata,
    SleepSummary,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# DreamWeaver Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_stats_section(&report.stats, report.lucid_dreams));
    output.push_str(&generate_sleep_section(&report.sleep));
    output.push_str(&generate_insights_section(&report.insights));
    output.push_str(&generate_challenges_section(&report.challenges));
    output.push_str(&generate_distribution_section(
        "Emotions",
        "Emotion",
        &report.emotions,
    ));
    output.push_str(&generate_distribution_section("Tags", "Tag", &report.tags));
    output.push_str(&generate_recent_dreams_section(&report.recent_dreams));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **User:** {}\n", metadata.user_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Store:** {}\n", metadata.backend));
    section.push_str(&format!(
        "- **Window:** last {} dreams, last {} nights\n",
        metadata.dream_window, metadata.sleep_window
    ));
    section.push('\n');

    section
}

/// Generate the headline numbers.
fn generate_stats_section(stats: &DashboardStats, lucid_dreams: usize) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(
        "| 🌙 Dreams | ✨ Lucid | 😴 Avg Quality | ⏱️ Avg Sleep | 🏆 Completed | 🎯 Active | **Points** |\n",
    );
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {}/5 | {}h | {} | {} | **{}** |\n\n",
        stats.total_dreams,
        lucid_dreams,
        round_to_tenth(stats.avg_sleep_quality),
        round_to_tenth(stats.avg_sleep_duration),
        stats.completed_challenges,
        stats.active_challenges,
        stats.total_points
    ));

    section
}

/// Generate the sleep tracker section.
fn generate_sleep_section(sleep: &SleepSummary) -> String {
    let mut section = String::new();

    section.push_str("## Sleep Tracker\n\n");

    if sleep.total_nights == 0 {
        section.push_str("No nights logged yet.\n\n");
        return section;
    }

    section.push_str(&format!("- **Nights logged:** {}\n", sleep.total_nights));
    section.push_str(&format!(
        "- **Average duration:** {}h\n",
        round_to_tenth(sleep.avg_duration)
    ));
    section.push_str(&format!(
        "- **Average quality:** {}/5\n",
        round_to_tenth(sleep.avg_quality)
    ));
    section.push_str(&format!(
        "- **Best streak:** {} night(s)\n\n",
        sleep.best_streak
    ));

    section
}

/// Generate the insights section.
fn generate_insights_section(insights: &[Insight]) -> String {
    if insights.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Insights\n\n");
    for insight in insights {
        section.push_str(&format!(
            "> {} **{}** {}\n\n",
            insight.kind.emoji(),
            insight.title,
            insight.description
        ));
    }

    section
}

/// Generate the challenges table.
fn generate_challenges_section(challenges: &[ChallengeView]) -> String {
    if challenges.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Challenges\n\n");
    section.push_str("| ID | Challenge | Difficulty | Points | Status | Progress |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|:---:|\n");

    for view in challenges {
        let status = match view.status {
            ChallengeStatus::Completed => "✅ Completed".to_string(),
            other => other.to_string(),
        };
        section.push_str(&format!(
            "| {} | {} | {} {} | {} | {} | {}% |\n",
            view.challenge.id,
            view.challenge.title,
            view.challenge.difficulty.emoji(),
            view.challenge.difficulty,
            view.challenge.points,
            status,
            view.progress
        ));
    }
    section.push('\n');

    section
}

/// Generate a label frequency table.
fn generate_distribution_section(title: &str, column: &str, counts: &[(String, usize)]) -> String {
    if counts.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", title));
    section.push_str(&format!("| {} | Count |\n", column));
    section.push_str("|:---|:---:|\n");
    for (label, count) in counts {
        section.push_str(&format!("| {} | {} |\n", label, count));
    }
    section.push('\n');

    section
}

/// Generate the recent dreams list.
fn generate_recent_dreams_section(dreams: &[DreamRecord]) -> String {
    let mut section = String::new();

    section.push_str("## Recent Dreams\n\n");

    if dreams.is_empty() {
        section.push_str("No dreams logged yet. Write one down tomorrow morning! 🌙\n\n");
        return section;
    }

    for dream in dreams {
        section.push_str(&format!(
            "- **{}** ({}, {}) quality {}",
            dream.title, dream.dream_date, dream.dream_type, dream.sleep_quality
        ));
        if !dream.emotions.is_empty() {
            let emotions: Vec<_> = dream.emotions.iter().map(String::as_str).collect();
            section.push_str(&format!(" · {}", emotions.join(", ")));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by DreamWeaver*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Challenge, Difficulty, DreamType, InsightKind, Quality};
    use chrono::{NaiveDate, Utc};

    fn create_test_report() -> Report {
        Report {
            metadata: ReportMetadata {
                user_id: "alice".to_string(),
                generated_at: Utc::now(),
                backend: "local".to_string(),
                dream_window: 10,
                sleep_window: 7,
            },
            stats: DashboardStats {
                total_dreams: 4,
                avg_sleep_quality: 4.75,
                avg_sleep_duration: 6.54,
                completed_challenges: 1,
                active_challenges: 1,
                total_points: 50,
            },
            sleep: SleepSummary {
                total_nights: 3,
                avg_duration: 6.5,
                avg_quality: 3.0,
                best_streak: 3,
            },
            lucid_dreams: 1,
            insights: vec![Insight {
                kind: InsightKind::ShortSleep,
                title: "Sleep More".to_string(),
                description: "You are sleeping 6.5h on average.".to_string(),
            }],
            challenges: vec![ChallengeView {
                challenge: Challenge {
                    id: "1".to_string(),
                    title: "Log 3 dreams this week".to_string(),
                    description: String::new(),
                    difficulty: Difficulty::Easy,
                    points: 50,
                    active: true,
                },
                status: ChallengeStatus::Completed,
                progress: 100,
            }],
            emotions: vec![("joy".to_string(), 2)],
            tags: vec![],
            recent_dreams: vec![DreamRecord {
                id: "d1".to_string(),
                user_id: "alice".to_string(),
                dream_date: NaiveDate::from_ymd_opt(2026, 10, 3).unwrap(),
                sleep_quality: Quality::new(5).unwrap(),
                title: "Flying over the sea".to_string(),
                description: "Warm wind".to_string(),
                emotions: ["joy".to_string()].into_iter().collect(),
                tags: Default::default(),
                dream_type: DreamType::Vivid,
                lucid: true,
                created_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# DreamWeaver Report"));
        assert!(markdown.contains("## Overview"));
        assert!(markdown.contains("## Sleep Tracker"));
        assert!(markdown.contains("## Insights"));
        assert!(markdown.contains("## Challenges"));
        assert!(markdown.contains("## Emotions"));
        assert!(!markdown.contains("## Tags"));
        assert!(markdown.contains("Flying over the sea"));
    }

    #[test]
    fn test_stats_are_rounded_for_display() {
        let section = generate_stats_section(&create_test_report().stats, 1);
        assert!(section.contains("4.8/5"));
        assert!(section.contains("6.5h"));
    }

    #[test]
    fn test_empty_sleep_section() {
        let section = generate_sleep_section(&SleepSummary::default());
        assert!(section.contains("No nights logged yet."));
    }

    #[test]
    fn test_challenges_section() {
        let section = generate_challenges_section(&create_test_report().challenges);
        assert!(section.contains("✅ Completed"));
        assert!(section.contains("100%"));
        assert!(section.contains("Easy"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"insights\""));
        assert!(json.contains("\"SHORT_SLEEP\""));
        assert!(json.contains("\"total_points\": 50"));
    }
}
