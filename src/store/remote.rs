//! Hosted record store.
//!
//! Talks to a PostgREST-style HTTP API (the shape exposed by hosted
//! Postgres services) with four tables: `dreams`, `sleep_analysis`,
//! `challenges` and `user_challenges`.

use super::{ChallengeStore, RecordStore, StoreError};
use crate::models::{
    normalize_labels, parse_clock_time, Challenge, ChallengeProgress, DreamRecord, DreamType,
    ProgressError, Quality, SleepRecord, ValidationError,
};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

const DREAMS_TABLE: &str = "dreams";
const SLEEP_TABLE: &str = "sleep_analysis";
const CHALLENGES_TABLE: &str = "challenges";
const PROGRESS_TABLE: &str = "user_challenges";

/// Store backed by a hosted REST API.
pub struct RemoteStore {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

/// Row of the `dreams` table. Emotions and tags are comma-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DreamRow {
    id: String,
    user_id: String,
    title: String,
    description: String,
    dream_date: NaiveDate,
    sleep_quality: u8,
    #[serde(default)]
    dream_type: DreamType,
    #[serde(default)]
    lucid: bool,
    #[serde(default)]
    emotions: String,
    #[serde(default)]
    tags: String,
    created_at: DateTime<Utc>,
}

/// Row of the `sleep_analysis` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SleepRow {
    id: String,
    user_id: String,
    sleep_date: NaiveDate,
    bedtime: String,
    wake_time: String,
    sleep_duration: f64,
    sleep_quality: u8,
    #[serde(default)]
    mood_before: Option<String>,
    #[serde(default)]
    mood_after: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

/// Columns changed by a progress update.
#[derive(Debug, Serialize)]
struct ProgressPatch<'a> {
    progress: u8,
    status: crate::models::ChallengeStatus,
    completed_at: Option<&'a DateTime<Utc>>,
}

fn join_labels(labels: &BTreeSet<String>) -> String {
    labels.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn split_labels(joined: &str) -> BTreeSet<String> {
    normalize_labels(joined.split(',').map(String::from))
}

impl From<&DreamRecord> for DreamRow {
    fn from(record: &DreamRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            dream_date: record.dream_date,
            sleep_quality: record.sleep_quality.value(),
            dream_type: record.dream_type,
            lucid: record.lucid,
            emotions: join_labels(&record.emotions),
            tags: join_labels(&record.tags),
            created_at: record.created_at,
        }
    }
}

impl TryFrom<DreamRow> for DreamRecord {
    type Error = ValidationError;

    fn try_from(row: DreamRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sleep_quality: Quality::new(row.sleep_quality)?,
            emotions: split_labels(&row.emotions),
            tags: split_labels(&row.tags),
            id: row.id,
            user_id: row.user_id,
            dream_date: row.dream_date,
            title: row.title,
            description: row.description,
            dream_type: row.dream_type,
            lucid: row.lucid,
            created_at: row.created_at,
        })
    }
}

impl From<&SleepRecord> for SleepRow {
    fn from(record: &SleepRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            sleep_date: record.sleep_date,
            bedtime: record.bedtime.format("%H:%M").to_string(),
            wake_time: record.wake_time.format("%H:%M").to_string(),
            sleep_duration: record.sleep_duration_hours,
            sleep_quality: record.sleep_quality.value(),
            mood_before: record.mood_before.clone(),
            mood_after: record.mood_after.clone(),
            notes: record.notes.clone(),
            created_at: record.created_at,
        }
    }
}

impl TryFrom<SleepRow> for SleepRecord {
    type Error = ValidationError;

    fn try_from(row: SleepRow) -> Result<Self, Self::Error> {
        Ok(Self {
            bedtime: parse_clock_time(&row.bedtime)?,
            wake_time: parse_clock_time(&row.wake_time)?,
            sleep_quality: Quality::new(row.sleep_quality)?,
            sleep_duration_hours: row.sleep_duration.max(0.0),
            id: row.id,
            user_id: row.user_id,
            sleep_date: row.sleep_date,
            mood_before: row.mood_before,
            mood_after: row.mood_after,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// Query for the newest `limit` rows of one user.
fn recent_query(user_id: &str, date_column: &str, limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", user_id)),
        ("order", format!("{}.desc,created_at.desc", date_column)),
        ("limit", limit.to_string()),
    ]
}

/// Total from a `Content-Range` header such as `0-9/12` or `*/0`.
fn content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.parse().ok()
}

/// Filter selecting one user's row for one challenge.
fn progress_filter(user_id: &str, challenge_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("user_id", format!("eq.{}", user_id)),
        ("challenge_id", format!("eq.{}", challenge_id)),
    ]
}

impl RemoteStore {
    /// Create a client for the API at `base_url`.
    ///
    /// `access_token` is the user's session token; without it requests are
    /// authorized with the API key alone.
    pub fn new(
        base_url: &str,
        api_key: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dreamweaver/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("Using hosted store at {}", base_url);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token,
            http_client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);

        self.http_client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    /// Turn non-2xx responses into [`StoreError::Status`].
    async fn check(table: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            table: table.to_string(),
            status,
            body,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        debug!("GET {} {:?}", table, query);

        let response = self
            .request(Method::GET, table)
            .query(query)
            .send()
            .await?;

        Ok(Self::check(table, response).await?.json().await?)
    }

    /// Count matching rows using PostgREST's `Content-Range` total.
    async fn count(&self, table: &str, filter: &[(&str, String)]) -> Result<usize, StoreError> {
        debug!("COUNT {} {:?}", table, filter);

        let response = self
            .request(Method::GET, table)
            .query(&[("select", "id")])
            .query(filter)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::check(table, response).await?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);

        match total {
            Some(total) => Ok(total),
            None => {
                let rows: Vec<serde_json::Value> = response.json().await?;
                Ok(rows.len())
            }
        }
    }

    async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        debug!("POST {}", table);

        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        Self::check(table, response).await?;
        Ok(())
    }

    async fn patch<T: Serialize>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        body: &T,
    ) -> Result<(), StoreError> {
        debug!("PATCH {} {:?}", table, filter);

        let response = self
            .request(Method::PATCH, table)
            .query(filter)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        Self::check(table, response).await?;
        Ok(())
    }

    async fn find_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<Option<ChallengeProgress>, StoreError> {
        let mut query = progress_filter(user_id, challenge_id);
        query.push(("select", "*".to_string()));

        let rows: Vec<ChallengeProgress> = self.select(PROGRESS_TABLE, &query).await?;
        Ok(rows.into_iter().next())
    }
}

impl RecordStore for RemoteStore {
    async fn fetch_recent_dreams(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DreamRecord>, StoreError> {
        let rows: Vec<DreamRow> = self
            .select(DREAMS_TABLE, &recent_query(user_id, "dream_date", limit))
            .await?;

        rows.into_iter()
            .map(|row| DreamRecord::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn fetch_recent_sleep(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SleepRecord>, StoreError> {
        let rows: Vec<SleepRow> = self
            .select(SLEEP_TABLE, &recent_query(user_id, "sleep_date", limit))
            .await?;

        rows.into_iter()
            .map(|row| SleepRecord::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn count_dreams(&self, user_id: &str) -> Result<usize, StoreError> {
        self.count(DREAMS_TABLE, &[("user_id", format!("eq.{}", user_id))])
            .await
    }

    async fn add_dream(&self, record: &DreamRecord) -> Result<(), StoreError> {
        self.insert(DREAMS_TABLE, &DreamRow::from(record)).await?;
        info!("Saved dream {}", record.id);
        Ok(())
    }

    async fn add_sleep(&self, record: &SleepRecord) -> Result<(), StoreError> {
        self.insert(SLEEP_TABLE, &SleepRow::from(record)).await?;
        info!("Saved sleep record {}", record.id);
        Ok(())
    }
}

impl ChallengeStore for RemoteStore {
    async fn fetch_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let query = [
            ("select", "*".to_string()),
            ("active", "eq.true".to_string()),
            ("order", "points.asc".to_string()),
        ];
        self.select(CHALLENGES_TABLE, &query).await
    }

    async fn fetch_user_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChallengeProgress>, StoreError> {
        let query = [
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
        ];
        self.select(PROGRESS_TABLE, &query).await
    }

    async fn start_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<ChallengeProgress, StoreError> {
        let query = [
            ("select", "id".to_string()),
            ("id", format!("eq.{}", challenge_id)),
            ("active", "eq.true".to_string()),
        ];
        let found: Vec<serde_json::Value> = self.select(CHALLENGES_TABLE, &query).await?;
        if found.is_empty() {
            return Err(StoreError::UnknownChallenge(challenge_id.to_string()));
        }

        let progress = match self.find_progress(user_id, challenge_id).await? {
            Some(mut existing) => {
                existing.start()?;
                let patch = ProgressPatch {
                    progress: existing.progress,
                    status: existing.status,
                    completed_at: None,
                };
                self.patch(
                    PROGRESS_TABLE,
                    &progress_filter(user_id, challenge_id),
                    &patch,
                )
                .await?;
                existing
            }
            None => {
                let mut progress = ChallengeProgress::not_started(user_id, challenge_id);
                progress.start()?;
                self.insert(PROGRESS_TABLE, &progress).await?;
                progress
            }
        };

        info!("Started challenge {} for {}", challenge_id, user_id);
        Ok(progress)
    }

    async fn update_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
        progress: u8,
    ) -> Result<ChallengeProgress, StoreError> {
        let mut current = self
            .find_progress(user_id, challenge_id)
            .await?
            .ok_or_else(|| ProgressError::NotActive(challenge_id.to_string()))?;

        current.update(progress)?;

        let patch = ProgressPatch {
            progress: current.progress,
            status: current.status,
            completed_at: current.completed_at.as_ref(),
        };
        self.patch(
            PROGRESS_TABLE,
            &progress_filter(user_id, challenge_id),
            &patch,
        )
        .await?;

        info!(
            "Challenge {} for {} is now {} at {}%",
            challenge_id, user_id, current.status, current.progress
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn test_store() -> RemoteStore {
        RemoteStore::new(
            "https://example.supabase.co/",
            "anon-key",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn dream_row() -> DreamRow {
        DreamRow {
            id: "d1".to_string(),
            user_id: "u1".to_string(),
            title: "Falling".to_string(),
            description: "Down a well".to_string(),
            dream_date: NaiveDate::from_ymd_opt(2026, 10, 2).unwrap(),
            sleep_quality: 2,
            dream_type: DreamType::Nightmare,
            lucid: false,
            emotions: "fear, anxiety,,fear".to_string(),
            tags: "".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_table_url_trims_slash() {
        let store = test_store();
        assert_eq!(
            store.table_url("dreams"),
            "https://example.supabase.co/rest/v1/dreams"
        );
    }

    #[test]
    fn test_recent_query() {
        let query = recent_query("u1", "sleep_date", 7);
        assert!(query.contains(&("user_id", "eq.u1".to_string())));
        assert!(query.contains(&("order", "sleep_date.desc,created_at.desc".to_string())));
        assert!(query.contains(&("limit", "7".to_string())));
    }

    #[test]
    fn test_dream_row_splits_labels() {
        let record = DreamRecord::try_from(dream_row()).unwrap();
        let emotions: Vec<_> = record.emotions.iter().cloned().collect();
        assert_eq!(emotions, vec!["anxiety".to_string(), "fear".to_string()]);
        assert!(record.tags.is_empty());

        let row = DreamRow::from(&record);
        assert_eq!(row.emotions, "anxiety,fear");
    }

    #[test]
    fn test_dream_row_rejects_bad_quality() {
        let row = DreamRow {
            sleep_quality: 7,
            ..dream_row()
        };
        assert_eq!(
            DreamRecord::try_from(row),
            Err(ValidationError::QualityOutOfRange(7))
        );
    }

    #[test]
    fn test_sleep_row_accepts_seconds() {
        let row = SleepRow {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            sleep_date: NaiveDate::from_ymd_opt(2026, 10, 2).unwrap(),
            bedtime: "22:30:00".to_string(),
            wake_time: "06:00:00".to_string(),
            sleep_duration: 7.5,
            sleep_quality: 4,
            mood_before: None,
            mood_after: Some("rested".to_string()),
            notes: None,
            created_at: Utc::now(),
        };

        let record = SleepRecord::try_from(row).unwrap();
        assert_eq!(record.bedtime, NaiveTime::from_hms_opt(22, 30, 0).unwrap());
        assert_eq!(record.sleep_duration_hours, 7.5);

        let back = SleepRow::from(&record);
        assert_eq!(back.bedtime, "22:30");
    }

    #[test]
    fn test_progress_patch_serialization() {
        let patch = ProgressPatch {
            progress: 40,
            status: crate::models::ChallengeStatus::Active,
            completed_at: None,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json["completed_at"].is_null());
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-9/12"), Some(12));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-9/*"), None);
    }

    mod http {
        use super::*;
        use crate::models::{ChallengeStatus, ProgressError};
        use crate::store::StoreError;
        use serde_json::json;
        use std::time::Duration;
        use wiremock::matchers::{body_partial_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn store_for(server: &MockServer) -> RemoteStore {
            RemoteStore::new(&server.uri(), "anon-key", None, Duration::from_secs(5)).unwrap()
        }

        fn active_row(progress: u8) -> serde_json::Value {
            json!([{
                "user_id": "alice",
                "challenge_id": "2",
                "status": "active",
                "progress": progress,
            }])
        }

        #[tokio::test]
        async fn test_fetch_recent_dreams_orders_and_limits() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/dreams"))
                .and(query_param("user_id", "eq.u1"))
                .and(query_param("order", "dream_date.desc,created_at.desc"))
                .and(query_param("limit", "10"))
                .and(header("apikey", "anon-key"))
                .and(header("authorization", "Bearer anon-key"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!([serde_json::to_value(dream_row()).unwrap()])),
                )
                .expect(1)
                .mount(&server)
                .await;

            let dreams = store_for(&server)
                .fetch_recent_dreams("u1", 10)
                .await
                .unwrap();

            assert_eq!(dreams.len(), 1);
            assert_eq!(dreams[0].title, "Falling");
            assert_eq!(dreams[0].emotions.len(), 2);
        }

        #[tokio::test]
        async fn test_error_status_is_reported() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/sleep_analysis"))
                .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
                .mount(&server)
                .await;

            let err = store_for(&server)
                .fetch_recent_sleep("u1", 7)
                .await
                .unwrap_err();

            match err {
                StoreError::Status {
                    table,
                    status,
                    body,
                } => {
                    assert_eq!(table, "sleep_analysis");
                    assert_eq!(status.as_u16(), 401);
                    assert_eq!(body, "JWT expired");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_count_dreams_reads_content_range() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/dreams"))
                .and(query_param("user_id", "eq.alice"))
                .and(header("prefer", "count=exact"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-range", "0-11/12")
                        .set_body_json(json!([])),
                )
                .mount(&server)
                .await;

            let count = store_for(&server).count_dreams("alice").await.unwrap();
            assert_eq!(count, 12);
        }

        #[tokio::test]
        async fn test_fetch_challenges_only_active() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/challenges"))
                .and(query_param("active", "eq.true"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                    "id": "1",
                    "title": "Log 3 dreams this week",
                    "difficulty": "easy",
                    "points": 50,
                }])))
                .expect(1)
                .mount(&server)
                .await;

            let challenges = store_for(&server).fetch_challenges().await.unwrap();
            assert_eq!(challenges.len(), 1);
            assert!(challenges[0].active);
        }

        #[tokio::test]
        async fn test_restarting_challenge_is_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "2" }])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/user_challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(active_row(40)))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(201))
                .expect(0)
                .mount(&server)
                .await;
            Mock::given(method("PATCH"))
                .respond_with(ResponseTemplate::new(204))
                .expect(0)
                .mount(&server)
                .await;

            let err = store_for(&server)
                .start_challenge("alice", "2")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                StoreError::Progress(ProgressError::AlreadyStarted(_))
            ));
        }

        #[tokio::test]
        async fn test_start_inserts_new_row() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "2" }])))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/user_challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/rest/v1/user_challenges"))
                .and(body_partial_json(json!({ "challenge_id": "2", "status": "active" })))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;

            let started = store_for(&server)
                .start_challenge("alice", "2")
                .await
                .unwrap();
            assert_eq!(started.status, ChallengeStatus::Active);
        }

        #[tokio::test]
        async fn test_update_unstarted_challenge_is_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/user_challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;
            Mock::given(method("PATCH"))
                .respond_with(ResponseTemplate::new(204))
                .expect(0)
                .mount(&server)
                .await;

            let err = store_for(&server)
                .update_progress("alice", "2", 20)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                StoreError::Progress(ProgressError::NotActive(_))
            ));
        }

        #[tokio::test]
        async fn test_update_progress_patches_row() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rest/v1/user_challenges"))
                .respond_with(ResponseTemplate::new(200).set_body_json(active_row(40)))
                .mount(&server)
                .await;
            Mock::given(method("PATCH"))
                .and(path("/rest/v1/user_challenges"))
                .and(query_param("challenge_id", "eq.2"))
                .and(body_partial_json(json!({ "progress": 100, "status": "completed" })))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let done = store_for(&server)
                .update_progress("alice", "2", 100)
                .await
                .unwrap();
            assert_eq!(done.status, ChallengeStatus::Completed);
            assert!(done.completed_at.is_some());
        }
    }
}
