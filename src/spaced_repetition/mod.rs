//! Spaced repetition for saved vocabulary and grammar
//!
//! - SM-2 scheduling of one item per review (`algorithm`)
//! - Due-item selection and review sessions (`session`)
//! - Progress counts, streaks and daily history (`stats`)
//! - A JSON-file store holding every learner's items (`ReviewStore`)

pub mod algorithm;
pub mod item;
pub mod session;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub use algorithm::{Quality, ReviewFeedback, ReviewScheduler};
pub use item::{ContentId, ReviewItem};
pub use session::{ReviewMode, ReviewSession};
pub use stats::{HistoryResponse, LearningProgress, ReviewHistory, ReviewStatistics};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid quality rating: {0} (expected 0-5)")]
    InvalidQualityRating(i32),
    #[error("Item not tracked: {content} for learner {learner_id}")]
    UnknownItem {
        learner_id: String,
        content: ContentId,
    },
    #[error("Concurrent modification: expected version {expected}, found {found}")]
    ConcurrentModification { expected: u64, found: u64 },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session already complete: {0}")]
    SessionComplete(String),
    #[error("Card {index} of session {session_id} was already answered")]
    AlreadyAnswered { session_id: String, index: usize },
}

/// Upper bound accepted for `max_interval_days`; keeps due dates representable
const MAX_INTERVAL_LIMIT: u32 = 365_000;

/// Scheduler thresholds and session sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Lowest easiness factor an item can reach
    pub easiness_factor_floor: f64,
    /// Easiness factor given to newly tracked items
    pub easiness_factor_default: f64,
    /// Consecutive passes after which an item counts as memorized
    pub memorization_threshold: u32,
    /// Lowest quality rating that counts as a pass
    pub passing_quality: i32,
    /// Items per session when the caller gives no limit
    pub items_per_session: usize,
    /// Longest interval a pass can schedule
    pub max_interval_days: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            easiness_factor_floor: 1.3,
            easiness_factor_default: 2.5,
            memorization_threshold: 2,
            passing_quality: 3,
            items_per_session: 20,
            max_interval_days: 36_500,
        }
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<(), ReviewError> {
        if !(self.easiness_factor_floor.is_finite() && self.easiness_factor_floor > 0.0) {
            return Err(ReviewError::InvalidConfig(
                "easiness_factor_floor must be a positive number".to_string(),
            ));
        }
        if !self.easiness_factor_default.is_finite()
            || self.easiness_factor_default < self.easiness_factor_floor
        {
            return Err(ReviewError::InvalidConfig(
                "easiness_factor_default must not be below easiness_factor_floor".to_string(),
            ));
        }
        if self.memorization_threshold == 0 {
            return Err(ReviewError::InvalidConfig(
                "memorization_threshold must be at least 1".to_string(),
            ));
        }
        if !(1..=algorithm::MAX_QUALITY).contains(&self.passing_quality) {
            return Err(ReviewError::InvalidConfig(
                "passing_quality must be between 1 and 5".to_string(),
            ));
        }
        if !(1..=MAX_INTERVAL_LIMIT).contains(&self.max_interval_days) {
            return Err(ReviewError::InvalidConfig(format!(
                "max_interval_days must be between 1 and {}",
                MAX_INTERVAL_LIMIT
            )));
        }
        if self.items_per_session == 0 {
            return Err(ReviewError::InvalidConfig(
                "items_per_session must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

type ItemKey = (String, ContentId);

fn item_key(learner_id: &str, content: ContentId) -> ItemKey {
    (learner_id.to_string(), content)
}

/// All learners' review items, persisted under `<data_dir>/review`.
pub struct ReviewStore {
    data_dir: PathBuf,
    scheduler: ReviewScheduler,
    items: HashMap<ItemKey, ReviewItem>,
    history: HashMap<String, ReviewHistory>,
    /// Open sessions; not persisted
    sessions: HashMap<String, ReviewSession>,
}

impl ReviewStore {
    const CONFIG_FILE: &'static str = "config.json";
    const ITEMS_FILE: &'static str = "items.json";
    const HISTORY_FILE: &'static str = "history.json";

    pub fn new(data_dir: PathBuf) -> Result<Self, ReviewError> {
        let review_dir = data_dir.join("review");
        fs::create_dir_all(&review_dir)?;

        let mut store = Self {
            data_dir: review_dir,
            scheduler: ReviewScheduler::default(),
            items: HashMap::new(),
            history: HashMap::new(),
            sessions: HashMap::new(),
        };
        store.load_all()?;
        tracing::debug!(
            "Review store opened at {:?} with {} items",
            store.data_dir,
            store.items.len()
        );
        Ok(store)
    }

    fn load_all(&mut self) -> Result<(), ReviewError> {
        let config_path = self.data_dir.join(Self::CONFIG_FILE);
        if config_path.exists() {
            let data = fs::read_to_string(&config_path)?;
            let config: ReviewConfig = serde_json::from_str(&data)?;
            config.validate()?;
            self.scheduler = ReviewScheduler::new(config);
        }

        let items_path = self.data_dir.join(Self::ITEMS_FILE);
        if items_path.exists() {
            let data = fs::read_to_string(&items_path)?;
            let items: Vec<ReviewItem> = serde_json::from_str(&data)?;
            self.items = items
                .into_iter()
                .map(|item| (item_key(&item.learner_id, item.content), item))
                .collect();
        }

        let history_path = self.data_dir.join(Self::HISTORY_FILE);
        if history_path.exists() {
            let data = fs::read_to_string(&history_path)?;
            self.history = serde_json::from_str(&data)?;
        }

        Ok(())
    }

    fn save_config(&self, config: &ReviewConfig) -> Result<(), ReviewError> {
        let path = self.data_dir.join(Self::CONFIG_FILE);
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&path, data)?;
        Ok(())
    }

    fn save_items(&self, items: &HashMap<ItemKey, ReviewItem>) -> Result<(), ReviewError> {
        let mut items: Vec<&ReviewItem> = items.values().collect();
        items.sort_by(|a, b| {
            a.learner_id
                .cmp(&b.learner_id)
                .then_with(|| a.content.cmp(&b.content))
        });

        let path = self.data_dir.join(Self::ITEMS_FILE);
        let data = serde_json::to_string_pretty(&items)?;
        fs::write(&path, data)?;
        Ok(())
    }

    fn save_history(&self) -> Result<(), ReviewError> {
        let path = self.data_dir.join(Self::HISTORY_FILE);
        let data = serde_json::to_string_pretty(&self.history)?;
        fs::write(&path, data)?;
        Ok(())
    }

    /// Writes `items` and only then makes it the live item set.
    fn commit_items(&mut self, items: HashMap<ItemKey, ReviewItem>) -> Result<(), ReviewError> {
        self.save_items(&items)?;
        self.items = items;
        Ok(())
    }

    fn learner_items<'a>(
        &'a self,
        learner_id: &'a str,
    ) -> impl Iterator<Item = &'a ReviewItem> + Clone + 'a {
        self.items
            .values()
            .filter(move |item| item.learner_id == learner_id)
    }

    fn unknown(learner_id: &str, content: ContentId) -> ReviewError {
        ReviewError::UnknownItem {
            learner_id: learner_id.to_string(),
            content,
        }
    }

    // ========== Config Methods ==========

    pub fn get_config(&self) -> &ReviewConfig {
        self.scheduler.config()
    }

    pub fn update_config(&mut self, config: ReviewConfig) -> Result<(), ReviewError> {
        config.validate()?;
        self.save_config(&config)?;
        tracing::info!("Review config updated: {:?}", config);
        self.scheduler = ReviewScheduler::new(config);
        Ok(())
    }

    // ========== Tracking Methods ==========

    pub fn track(&mut self, learner_id: &str, content: ContentId) -> Result<ReviewItem, ReviewError> {
        self.track_at(learner_id, content, Utc::now())
    }

    pub fn track_at(
        &mut self,
        learner_id: &str,
        content: ContentId,
        now: DateTime<Utc>,
    ) -> Result<ReviewItem, ReviewError> {
        let key = item_key(learner_id, content);
        if let Some(existing) = self.items.get(&key) {
            tracing::debug!("{} already tracked by {}", content, learner_id);
            return Ok(existing.clone());
        }

        let item = ReviewItem::new(
            learner_id.to_string(),
            content,
            self.scheduler.config().easiness_factor_default,
            now,
        );
        let mut items = self.items.clone();
        items.insert(key, item.clone());
        self.commit_items(items)?;
        tracing::info!("{} tracked by {}", content, learner_id);
        Ok(item)
    }

    /// Tracks every content id not yet tracked; returns how many were added.
    pub fn track_batch(
        &mut self,
        learner_id: &str,
        contents: &[ContentId],
    ) -> Result<usize, ReviewError> {
        let now = Utc::now();
        let default_ef = self.scheduler.config().easiness_factor_default;
        let mut items = self.items.clone();
        let mut added = 0;

        for &content in contents {
            let key = item_key(learner_id, content);
            if items.contains_key(&key) {
                continue;
            }
            let item = ReviewItem::new(learner_id.to_string(), content, default_ef, now);
            items.insert(key, item);
            added += 1;
        }

        if added > 0 {
            self.commit_items(items)?;
        }
        tracing::info!(
            "Batch tracked {} of {} items for {}",
            added,
            contents.len(),
            learner_id
        );
        Ok(added)
    }

    pub fn untrack(&mut self, learner_id: &str, content: ContentId) -> Result<(), ReviewError> {
        let mut items = self.items.clone();
        items
            .remove(&item_key(learner_id, content))
            .ok_or_else(|| Self::unknown(learner_id, content))?;
        self.commit_items(items)?;
        tracing::info!("{} untracked by {}", content, learner_id);
        Ok(())
    }

    pub fn is_tracked(&self, learner_id: &str, content: ContentId) -> bool {
        self.items.contains_key(&item_key(learner_id, content))
    }

    pub fn get(&self, learner_id: &str, content: ContentId) -> Option<&ReviewItem> {
        self.items.get(&item_key(learner_id, content))
    }

    // ========== Review Methods ==========

    pub fn review(
        &mut self,
        learner_id: &str,
        content: ContentId,
        quality: i32,
        expected_version: Option<u64>,
    ) -> Result<ReviewItem, ReviewError> {
        self.review_at(learner_id, content, quality, expected_version, Utc::now())
    }

    /// Applies one review and commits it if `expected_version` still matches.
    pub fn review_at(
        &mut self,
        learner_id: &str,
        content: ContentId,
        quality: i32,
        expected_version: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<ReviewItem, ReviewError> {
        let quality = Quality::new(quality)?;
        let key = item_key(learner_id, content);
        let current = self
            .items
            .get(&key)
            .ok_or_else(|| Self::unknown(learner_id, content))?;
        check_version(current, expected_version)?;

        let mut updated = self.scheduler.record_review(current, quality.value(), now)?;
        updated.version = current.version + 1;
        let passed = self.scheduler.is_pass(quality);

        let mut items = self.items.clone();
        items.insert(key, updated.clone());
        self.commit_items(items)?;

        // The review is committed at this point; history is catch-up data
        self.history
            .entry(learner_id.to_string())
            .or_default()
            .record_review(now, passed);
        if let Err(e) = self.save_history() {
            tracing::warn!("Failed to save review history for {}: {}", learner_id, e);
        }

        tracing::info!(
            "Review of {} by {} with quality {}: interval {}d, ef {:.2}",
            content,
            learner_id,
            quality.value(),
            updated.interval_days,
            updated.easiness_factor
        );
        Ok(updated)
    }

    /// Manual memorized toggle from the word list.
    ///
    /// Marking memorized lifts `repetitions` to the threshold and the
    /// interval to the one the schedule gives there; clearing it resets
    /// progress like a lapse, leaving the easiness factor alone.
    pub fn set_memorized(
        &mut self,
        learner_id: &str,
        content: ContentId,
        memorized: bool,
    ) -> Result<ReviewItem, ReviewError> {
        self.set_memorized_at(learner_id, content, memorized, Utc::now())
    }

    pub fn set_memorized_at(
        &mut self,
        learner_id: &str,
        content: ContentId,
        memorized: bool,
        now: DateTime<Utc>,
    ) -> Result<ReviewItem, ReviewError> {
        let threshold = self.scheduler.config().memorization_threshold;
        let mut items = self.items.clone();
        let item = items
            .get_mut(&item_key(learner_id, content))
            .ok_or_else(|| Self::unknown(learner_id, content))?;

        if memorized {
            item.repetitions = item.repetitions.max(threshold);
            let interval = item.interval_days.max(algorithm::base_interval(item.repetitions));
            if interval != item.interval_days {
                item.interval_days = interval;
                item.next_review_at = now + chrono::Duration::days(interval as i64);
            }
        } else {
            item.repetitions = 0;
            item.interval_days = item.interval_days.min(1);
            item.next_review_at = item.next_review_at.min(now + chrono::Duration::days(1));
        }
        item.is_memorized = memorized;
        item.last_reviewed_at = Some(now);
        if item.next_review_at < now {
            item.next_review_at = now;
        }
        item.version += 1;
        item.updated_at = now;

        let updated = item.clone();
        self.commit_items(items)?;
        tracing::info!(
            "{} memorized status set to {} for {}",
            content,
            memorized,
            learner_id
        );
        Ok(updated)
    }

    // ========== Query Methods ==========

    /// Study-all listing, optionally filtered on the memorized flag.
    pub fn items(&self, learner_id: &str, memorized: Option<bool>) -> Vec<ReviewItem> {
        session::select_all(self.learner_items(learner_id))
            .filter(|item| memorized.map_or(true, |m| item.is_memorized == m))
            .cloned()
            .collect()
    }

    pub fn list_due(&self, learner_id: &str, as_of: DateTime<Utc>) -> Vec<ReviewItem> {
        session::select_due(self.learner_items(learner_id), as_of)
            .cloned()
            .collect()
    }

    pub fn statistics(&self, learner_id: &str, now: DateTime<Utc>) -> ReviewStatistics {
        stats::aggregate(self.learner_items(learner_id), now)
    }

    pub fn progress(&self, learner_id: &str) -> LearningProgress {
        stats::progress(self.learner_items(learner_id))
    }

    pub fn history(&self, learner_id: &str, now: DateTime<Utc>) -> HistoryResponse {
        let empty = ReviewHistory::default();
        let history = self.history.get(learner_id).unwrap_or(&empty);
        HistoryResponse::from_history(history, now)
    }

    // ========== Session Methods ==========

    pub fn create_session(
        &mut self,
        learner_id: &str,
        mode: ReviewMode,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> ReviewSession {
        let limit = limit.unwrap_or(self.scheduler.config().items_per_session);
        let items: Vec<ReviewItem> = match mode {
            ReviewMode::Today => {
                session::select_due(self.learner_items(learner_id), session::end_of_day(now))
                    .take(limit)
                    .cloned()
                    .collect()
            }
            ReviewMode::StudyAll => session::select_all(self.learner_items(learner_id))
                .take(limit)
                .cloned()
                .collect(),
        };

        let session = ReviewSession::new(learner_id.to_string(), items, mode);
        tracing::debug!(
            "Session {} for {} ({:?}) with {} items",
            session.id,
            learner_id,
            mode,
            session.items.len()
        );
        // One open session per learner; a new one replaces the last
        self.sessions.retain(|_, open| open.learner_id != learner_id);
        if !session.is_complete() {
            self.sessions.insert(session.id.clone(), session.clone());
        }
        session
    }

    /// Reviews the session's current item and moves to the next one.
    ///
    /// The item must not have changed since the session was built, and a
    /// card revisited with `session_back` cannot be answered twice.
    /// Finished sessions are dropped.
    pub fn answer_session(
        &mut self,
        session_id: &str,
        quality: i32,
        now: DateTime<Utc>,
    ) -> Result<ReviewSession, ReviewError> {
        let (learner_id, content, version) = {
            let session = self
                .sessions
                .get(session_id)
                .ok_or_else(|| ReviewError::SessionNotFound(session_id.to_string()))?;
            let item = session
                .current_item()
                .ok_or_else(|| ReviewError::SessionComplete(session_id.to_string()))?;
            if session.is_answered() {
                return Err(ReviewError::AlreadyAnswered {
                    session_id: session_id.to_string(),
                    index: session.current_index,
                });
            }
            (session.learner_id.clone(), item.content, item.version)
        };

        let updated = self.review_at(&learner_id, content, quality, Some(version), now)?;

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.to_string()))?;
        let index = session.current_index;
        session.items[index] = updated;
        session.next();

        let (done, total) = session.progress();
        tracing::debug!("Session {} at {}/{}", session_id, done, total);

        let snapshot = session.clone();
        if snapshot.is_complete() {
            self.sessions.remove(session_id);
        }
        Ok(snapshot)
    }

    /// Steps back to the previous card without touching any item.
    pub fn session_back(&mut self, session_id: &str) -> Result<ReviewSession, ReviewError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.to_string()))?;
        session.previous();
        Ok(session.clone())
    }

    /// Moves ahead over cards already answered in this session.
    pub fn session_forward(&mut self, session_id: &str) -> Result<ReviewSession, ReviewError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.to_string()))?;
        if session.is_answered() {
            session.next();
        }
        Ok(session.clone())
    }
}

pub type SharedReviewStore = Arc<RwLock<ReviewStore>>;

/// Open the store once and share it between request handlers
pub fn create_shared_store(data_dir: PathBuf) -> Result<SharedReviewStore, ReviewError> {
    let store = ReviewStore::new(data_dir)?;
    Ok(Arc::new(RwLock::new(store)))
}

fn check_version(current: &ReviewItem, expected: Option<u64>) -> Result<(), ReviewError> {
    match expected {
        Some(expected) if expected != current.version => {
            Err(ReviewError::ConcurrentModification {
                expected,
                found: current.version,
            })
        }
        _ => Ok(()),
    }
}
