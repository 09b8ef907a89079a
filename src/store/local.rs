//! Local JSON file store.
//!
//! Each collection lives in its own JSON array file inside the data
//! directory. Files are replaced atomically through a temp file in the
//! same directory, so a crash never leaves a half-written collection.

use super::{ChallengeStore, RecordStore, StoreError};
use crate::models::{
    default_challenges, Challenge, ChallengeProgress, DreamRecord, ProgressError, SleepRecord,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const DREAMS_FILE: &str = "dreams.json";
const SLEEP_FILE: &str = "sleep.json";
const CHALLENGES_FILE: &str = "challenges.json";
const PROGRESS_FILE: &str = "user_challenges.json";

/// Store backed by JSON files in a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a whole collection. A missing file is an empty collection.
    async fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        let path = self.root.join(file);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist yet", path.display());
                Ok(Vec::new())
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Replace a whole collection.
    async fn write_all<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), StoreError> {
        let path = self.root.join(file);
        let bytes = serde_json::to_vec_pretty(items).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let root = self.root.clone();
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&root)?;
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|r| r);

        result.map_err(|source| StoreError::Io { path, source })
    }
}

impl RecordStore for LocalStore {
    async fn fetch_recent_dreams(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DreamRecord>, StoreError> {
        let mut dreams: Vec<DreamRecord> = self.read_all(DREAMS_FILE).await?;
        dreams.retain(|d| d.user_id == user_id);
        dreams.sort_by(|a, b| {
            b.dream_date
                .cmp(&a.dream_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        dreams.truncate(limit);

        debug!("Loaded {} dreams for {}", dreams.len(), user_id);
        Ok(dreams)
    }

    async fn fetch_recent_sleep(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SleepRecord>, StoreError> {
        let mut records: Vec<SleepRecord> = self.read_all(SLEEP_FILE).await?;
        records.retain(|r| r.user_id == user_id);
        records.sort_by(|a, b| {
            b.sleep_date
                .cmp(&a.sleep_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        records.truncate(limit);

        debug!("Loaded {} sleep records for {}", records.len(), user_id);
        Ok(records)
    }

    async fn count_dreams(&self, user_id: &str) -> Result<usize, StoreError> {
        let dreams: Vec<DreamRecord> = self.read_all(DREAMS_FILE).await?;
        Ok(dreams.iter().filter(|d| d.user_id == user_id).count())
    }

    async fn add_dream(&self, record: &DreamRecord) -> Result<(), StoreError> {
        let mut dreams: Vec<DreamRecord> = self.read_all(DREAMS_FILE).await?;
        dreams.push(record.clone());
        self.write_all(DREAMS_FILE, &dreams).await?;

        info!("Saved dream {} ({} total)", record.id, dreams.len());
        Ok(())
    }

    async fn add_sleep(&self, record: &SleepRecord) -> Result<(), StoreError> {
        let mut records: Vec<SleepRecord> = self.read_all(SLEEP_FILE).await?;
        records.push(record.clone());
        self.write_all(SLEEP_FILE, &records).await?;

        info!("Saved sleep record {} ({} total)", record.id, records.len());
        Ok(())
    }
}

impl ChallengeStore for LocalStore {
    async fn fetch_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let mut challenges: Vec<Challenge> = self.read_all(CHALLENGES_FILE).await?;
        if !challenges.is_empty() {
            challenges.retain(|c| c.active);
            return Ok(challenges);
        }

        info!("No challenges found, seeding defaults");
        let defaults = default_challenges();
        self.write_all(CHALLENGES_FILE, &defaults).await?;
        Ok(defaults)
    }

    async fn fetch_user_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChallengeProgress>, StoreError> {
        let mut progress: Vec<ChallengeProgress> = self.read_all(PROGRESS_FILE).await?;
        progress.retain(|p| p.user_id == user_id);
        Ok(progress)
    }

    async fn start_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<ChallengeProgress, StoreError> {
        let challenges = self.fetch_challenges().await?;
        if !challenges.iter().any(|c| c.id == challenge_id) {
            return Err(StoreError::UnknownChallenge(challenge_id.to_string()));
        }

        let mut all: Vec<ChallengeProgress> = self.read_all(PROGRESS_FILE).await?;
        let index = match all
            .iter()
            .position(|p| p.user_id == user_id && p.challenge_id == challenge_id)
        {
            Some(i) => i,
            None => {
                all.push(ChallengeProgress::not_started(user_id, challenge_id));
                all.len() - 1
            }
        };

        all[index].start()?;
        let started = all[index].clone();
        self.write_all(PROGRESS_FILE, &all).await?;

        info!("Started challenge {} for {}", challenge_id, user_id);
        Ok(started)
    }

    async fn update_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
        progress: u8,
    ) -> Result<ChallengeProgress, StoreError> {
        let mut all: Vec<ChallengeProgress> = self.read_all(PROGRESS_FILE).await?;
        let entry = all
            .iter_mut()
            .find(|p| p.user_id == user_id && p.challenge_id == challenge_id)
            .ok_or_else(|| ProgressError::NotActive(challenge_id.to_string()))?;

        entry.update(progress)?;
        let updated = entry.clone();
        self.write_all(PROGRESS_FILE, &all).await?;

        info!(
            "Challenge {} for {} is now {} at {}%",
            challenge_id, user_id, updated.status, updated.progress
        );
        Ok(updated)
    }
}
