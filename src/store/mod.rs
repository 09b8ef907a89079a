//! Record and challenge storage.
//!
//! The aggregator only ever sees plain slices; this module provides the
//! collaborators that fetch them. Two backends exist: a local directory of
//! JSON files and a hosted PostgREST-style API.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use crate::config::{BackendKind, StorageConfig};
use crate::models::{
    Challenge, ChallengeProgress, DreamRecord, ProgressError, SleepRecord, ValidationError,
};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{table} request returned {status}: {body}")]
    Status {
        table: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid stored record: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("unknown challenge '{0}'")]
    UnknownChallenge(String),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Source of dream and sleep records.
///
/// Fetches return the most recent `limit` records of `user_id`, newest first.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn fetch_recent_dreams(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DreamRecord>, StoreError>;

    async fn fetch_recent_sleep(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SleepRecord>, StoreError>;

    /// Size of the user's whole journal, ignoring any window.
    async fn count_dreams(&self, user_id: &str) -> Result<usize, StoreError>;

    async fn add_dream(&self, record: &DreamRecord) -> Result<(), StoreError>;

    async fn add_sleep(&self, record: &SleepRecord) -> Result<(), StoreError>;
}

/// Source of challenges and the user's progress on them.
#[allow(async_fn_in_trait)]
pub trait ChallengeStore {
    /// Challenges currently offered. Retired ones are left out.
    async fn fetch_challenges(&self) -> Result<Vec<Challenge>, StoreError>;

    async fn fetch_user_progress(&self, user_id: &str)
        -> Result<Vec<ChallengeProgress>, StoreError>;

    /// Move a challenge from `not_started` to `active`.
    async fn start_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<ChallengeProgress, StoreError>;

    /// Record new progress on an active challenge.
    async fn update_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
        progress: u8,
    ) -> Result<ChallengeProgress, StoreError>;
}

/// The backend selected by configuration.
pub enum Store {
    Local(LocalStore),
    Remote(RemoteStore),
}

impl Store {
    /// Open the backend described by the storage settings.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Local => Ok(Store::Local(LocalStore::new(&config.data_dir))),
            BackendKind::Remote => {
                let Some(url) = config.remote_url.as_deref() else {
                    bail!("storage.remote_url must be set for the remote backend");
                };
                let Some(api_key) = config.api_key.as_deref() else {
                    bail!("storage.api_key (or DREAMWEAVER_API_KEY) must be set for the remote backend");
                };
                let store = RemoteStore::new(
                    url,
                    api_key,
                    config.access_token.clone(),
                    Duration::from_secs(config.timeout_seconds),
                )?;
                Ok(Store::Remote(store))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Store::Local(_) => "local",
            Store::Remote(_) => "remote",
        }
    }
}

impl RecordStore for Store {
    async fn fetch_recent_dreams(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DreamRecord>, StoreError> {
        match self {
            Store::Local(s) => s.fetch_recent_dreams(user_id, limit).await,
            Store::Remote(s) => s.fetch_recent_dreams(user_id, limit).await,
        }
    }

    async fn fetch_recent_sleep(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SleepRecord>, StoreError> {
        match self {
            Store::Local(s) => s.fetch_recent_sleep(user_id, limit).await,
            Store::Remote(s) => s.fetch_recent_sleep(user_id, limit).await,
        }
    }

    async fn count_dreams(&self, user_id: &str) -> Result<usize, StoreError> {
        match self {
            Store::Local(s) => s.count_dreams(user_id).await,
            Store::Remote(s) => s.count_dreams(user_id).await,
        }
    }

    async fn add_dream(&self, record: &DreamRecord) -> Result<(), StoreError> {
        match self {
            Store::Local(s) => s.add_dream(record).await,
            Store::Remote(s) => s.add_dream(record).await,
        }
    }

    async fn add_sleep(&self, record: &SleepRecord) -> Result<(), StoreError> {
        match self {
            Store::Local(s) => s.add_sleep(record).await,
            Store::Remote(s) => s.add_sleep(record).await,
        }
    }
}

impl ChallengeStore for Store {
    async fn fetch_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        match self {
            Store::Local(s) => s.fetch_challenges().await,
            Store::Remote(s) => s.fetch_challenges().await,
        }
    }

    async fn fetch_user_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChallengeProgress>, StoreError> {
        match self {
            Store::Local(s) => s.fetch_user_progress(user_id).await,
            Store::Remote(s) => s.fetch_user_progress(user_id).await,
        }
    }

    async fn start_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<ChallengeProgress, StoreError> {
        match self {
            Store::Local(s) => s.start_challenge(user_id, challenge_id).await,
            Store::Remote(s) => s.start_challenge(user_id, challenge_id).await,
        }
    }

    async fn update_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
        progress: u8,
    ) -> Result<ChallengeProgress, StoreError> {
        match self {
            Store::Local(s) => s.update_progress(user_id, challenge_id, progress).await,
            Store::Remote(s) => s.update_progress(user_id, challenge_id, progress).await,
        }
    }
}
