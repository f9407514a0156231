use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Vocabulary,
    Grammar,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Vocabulary => "vocabulary",
            ContentKind::Grammar => "grammar",
        }
    }
}

/// A vocabulary word or grammar point a learner can track.
///
/// Ordering is by kind, then id, which is the tie-break used when
/// several items fall due at the same instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId {
    pub kind: ContentKind,
    pub id: u64,
}

#[cfg(test)]
impl ContentId {
    pub fn vocabulary(id: u64) -> Self {
        Self {
            kind: ContentKind::Vocabulary,
            id,
        }
    }

    pub fn grammar(id: u64) -> Self {
        Self {
            kind: ContentKind::Grammar,
            id,
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LearningState {
    /// Tracked but never reviewed
    New,
    /// Reviewed, still below the memorization threshold
    Learning,
    /// Memorized; reviews keep stretching the interval
    Reviewing,
}

/// Mastery state of one (learner, content) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewItem {
    pub learner_id: String,
    pub content: ContentId,
    pub is_memorized: bool,
    /// Consecutive passing reviews since the last lapse
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub next_review_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    /// Every review ever recorded, lapses included
    pub review_count: u32,
    /// Bumped on each committed change
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn new(
        learner_id: String,
        content: ContentId,
        easiness_factor: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id,
            content,
            is_memorized: false,
            repetitions: 0,
            easiness_factor,
            interval_days: 0,
            // Available for immediate review
            next_review_at: now,
            last_reviewed_at: None,
            review_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.next_review_at <= as_of
    }

    pub fn learning_state(&self) -> LearningState {
        if self.is_memorized {
            LearningState::Reviewing
        } else if self.last_reviewed_at.is_none() {
            LearningState::New
        } else {
            LearningState::Learning
        }
    }
}
