//! SM-2 (SuperMemo 2) review scheduling.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but the answer was recognised
//! - 2: Incorrect, but the answer seemed easy once shown
//! - 3: Correct with serious difficulty
//! - 4: Correct after hesitation
//! - 5: Perfect recall

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::item::ReviewItem;
use super::{ReviewConfig, ReviewError};

pub const MIN_QUALITY: i32 = 0;
pub const MAX_QUALITY: i32 = 5;

/// A validated recall quality in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i32) -> Result<Self, ReviewError> {
        if (MIN_QUALITY..=MAX_QUALITY).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ReviewError::InvalidQualityRating(value))
        }
    }

    pub fn value(self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i32> for Quality {
    type Error = ReviewError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for i32 {
    fn from(quality: Quality) -> Self {
        quality.value()
    }
}

/// Answer buttons shown on the flashcard screen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewFeedback {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewFeedback {
    pub fn quality(self) -> Quality {
        match self {
            ReviewFeedback::Again => Quality(0),
            ReviewFeedback::Hard => Quality(2),
            ReviewFeedback::Good => Quality(3),
            ReviewFeedback::Easy => Quality(5),
        }
    }
}

impl From<ReviewFeedback> for Quality {
    fn from(feedback: ReviewFeedback) -> Self {
        feedback.quality()
    }
}

/// Interval the schedule opens with: one day after the first pass, six after the second.
pub fn base_interval(repetitions: u32) -> u32 {
    if repetitions <= 1 {
        1
    } else {
        6
    }
}

/// Computes review transitions with the thresholds of a [`ReviewConfig`].
#[derive(Debug, Clone)]
pub struct ReviewScheduler {
    config: ReviewConfig,
}

impl ReviewScheduler {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn is_pass(&self, quality: Quality) -> bool {
        quality.value() >= self.config.passing_quality
    }

    /// Next easiness factor for a rating, never below the configured floor.
    pub fn next_easiness_factor(&self, ease_factor: f64, quality: Quality) -> f64 {
        let miss = (MAX_QUALITY - quality.value()) as f64;
        let next = ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
        next.max(self.config.easiness_factor_floor)
    }

    /// Applies one review event at `now`. The input item is left untouched.
    pub fn record_review(
        &self,
        item: &ReviewItem,
        quality: i32,
        now: DateTime<Utc>,
    ) -> Result<ReviewItem, ReviewError> {
        let quality = Quality::new(quality)?;
        Ok(self.apply(item, quality, now))
    }

    fn apply(&self, item: &ReviewItem, quality: Quality, now: DateTime<Utc>) -> ReviewItem {
        let ease_factor = self.next_easiness_factor(item.easiness_factor, quality);
        let passed = self.is_pass(quality);

        let (repetitions, interval_days) = if passed {
            let repetitions = item.repetitions + 1;
            let interval = match repetitions {
                1 | 2 => base_interval(repetitions),
                _ => (item.interval_days.max(1) as f64 * ease_factor).round() as u32,
            };
            (repetitions, interval.min(self.config.max_interval_days))
        } else {
            (0, 1)
        };

        let mut next = item.clone();
        next.easiness_factor = ease_factor;
        next.repetitions = repetitions;
        next.interval_days = interval_days;
        next.next_review_at = now + Duration::days(interval_days as i64);
        next.last_reviewed_at = Some(now);
        next.is_memorized = passed && repetitions >= self.config.memorization_threshold;
        next.review_count += 1;
        next.updated_at = now;
        next
    }
}

impl Default for ReviewScheduler {
    fn default() -> Self {
        Self::new(ReviewConfig::default())
    }
}
