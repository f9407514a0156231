use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::ReviewItem;

/// Items whose review date has arrived by `as_of`, most overdue first.
///
/// Ties on the review instant fall back to content order so the sequence is
/// stable between calls. Each call recomputes from `items`.
pub fn select_due<'a, I>(items: I, as_of: DateTime<Utc>) -> impl Iterator<Item = &'a ReviewItem>
where
    I: IntoIterator<Item = &'a ReviewItem>,
{
    let mut due: Vec<&ReviewItem> = items.into_iter().filter(|i| i.is_due(as_of)).collect();
    due.sort_by(|a, b| {
        a.next_review_at
            .cmp(&b.next_review_at)
            .then_with(|| a.content.cmp(&b.content))
    });
    due.into_iter()
}

/// Every item in content order, for "study all" mode.
pub fn select_all<'a, I>(items: I) -> impl Iterator<Item = &'a ReviewItem>
where
    I: IntoIterator<Item = &'a ReviewItem>,
{
    let mut all: Vec<&ReviewItem> = items.into_iter().collect();
    all.sort_by(|a, b| a.content.cmp(&b.content));
    all.into_iter()
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Last representable instant of the UTC day containing `at`.
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = at.date_naive() + Duration::days(1);
    start_of_day(tomorrow) - Duration::nanoseconds(1)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Only what is due by the end of today
    #[default]
    Today,
    /// Everything the learner tracks
    StudyAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    pub id: String,
    pub learner_id: String,
    pub mode: ReviewMode,
    pub items: Vec<ReviewItem>,
    pub current_index: usize,
    pub completed_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub learner_id: String,
    #[serde(default)]
    pub mode: ReviewMode,
    pub limit: Option<usize>,
}

impl ReviewSession {
    pub fn new(learner_id: String, items: Vec<ReviewItem>, mode: ReviewMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            learner_id,
            mode,
            items,
            current_index: 0,
            completed_count: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn current_item(&self) -> Option<&ReviewItem> {
        self.items.get(self.current_index)
    }

    pub fn next(&mut self) -> Option<&ReviewItem> {
        if self.current_index < self.items.len() {
            self.current_index += 1;
            self.completed_count = self.completed_count.max(self.current_index);
        }
        if self.is_complete() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self.current_item()
    }

    pub fn previous(&mut self) -> Option<&ReviewItem> {
        if self.current_index > 0 {
            self.current_index -= 1;
        }
        self.current_item()
    }

    /// Whether the current card was already passed once, i.e. reached again with `previous`.
    pub fn is_answered(&self) -> bool {
        self.current_index < self.completed_count
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.items.len()
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.current_index, self.items.len())
    }
}
