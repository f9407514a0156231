use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::item::{LearningState, ReviewItem};
use super::session::{end_of_day, select_due};

/// Counts behind the vocabulary progress bars.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReviewStatistics {
    pub total: usize,
    pub memorized: usize,
    pub due_today: usize,
}

pub fn aggregate<'a, I>(items: I, now: DateTime<Utc>) -> ReviewStatistics
where
    I: IntoIterator<Item = &'a ReviewItem>,
    I::IntoIter: Clone,
{
    let items = items.into_iter();
    ReviewStatistics {
        total: items.clone().count(),
        memorized: items.clone().filter(|i| i.is_memorized).count(),
        due_today: select_due(items, end_of_day(now)).count(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LearningProgress {
    pub total: usize,
    pub memorized: usize,
    /// Everything not yet memorized, unreviewed items included
    pub learning: usize,
    /// Tracked but never reviewed
    pub unreviewed: usize,
    pub memorized_percentage: u32,
}

pub fn progress<'a, I>(items: I) -> LearningProgress
where
    I: IntoIterator<Item = &'a ReviewItem>,
{
    let mut progress = LearningProgress::default();
    for item in items {
        progress.total += 1;
        match item.learning_state() {
            LearningState::Reviewing => progress.memorized += 1,
            LearningState::Learning => progress.learning += 1,
            LearningState::New => {
                progress.learning += 1;
                progress.unreviewed += 1;
            }
        }
    }

    if progress.total > 0 {
        progress.memorized_percentage = (progress.memorized * 100 / progress.total) as u32;
    }
    progress
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub passed: u32,
    pub lapsed: u32,
}

impl DailyStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            passed: 0,
            lapsed: 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.lapsed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StreakData {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_review_date: Option<NaiveDate>,
    pub streak_start_date: Option<NaiveDate>,
}

/// Per-learner review activity, kept alongside the items.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReviewHistory {
    pub total_reviews: u64,
    pub reviews_by_date: BTreeMap<NaiveDate, DailyStats>,
    pub streak: StreakData,
}

impl ReviewHistory {
    pub fn record_review(&mut self, at: DateTime<Utc>, passed: bool) {
        self.total_reviews += 1;

        let date = at.date_naive();
        let daily = self
            .reviews_by_date
            .entry(date)
            .or_insert_with(|| DailyStats::new(date));
        if passed {
            daily.passed += 1;
        } else {
            daily.lapsed += 1;
        }

        self.update_streak(date);
    }

    fn update_streak(&mut self, today: NaiveDate) {
        match self.streak.last_review_date {
            None => {
                self.streak.current_streak = 1;
                self.streak.streak_start_date = Some(today);
            }
            Some(last) => {
                let diff = today.signed_duration_since(last).num_days();
                if diff <= 0 {
                    // Same day, or a late write for an earlier day
                    return;
                }
                if diff == 1 {
                    self.streak.current_streak += 1;
                } else {
                    self.streak.current_streak = 1;
                    self.streak.streak_start_date = Some(today);
                }
            }
        }

        self.streak.last_review_date = Some(today);
        self.streak.longest_streak = self.streak.longest_streak.max(self.streak.current_streak);
    }

    /// Streak as seen on `today`; a gap of more than one day breaks it.
    pub fn current_streak(&self, today: NaiveDate) -> u32 {
        match self.streak.last_review_date {
            Some(last) if today.signed_duration_since(last).num_days() <= 1 => {
                self.streak.current_streak
            }
            _ => 0,
        }
    }

    pub fn recent_days(&self, today: NaiveDate, days: i64) -> Vec<&DailyStats> {
        (0..days)
            .filter_map(|i| self.reviews_by_date.get(&(today - Duration::days(i))))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub total_reviews: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub today_reviews: u32,
    pub week_reviews: u32,
    pub week_lapses: u32,
}

impl HistoryResponse {
    pub fn from_history(history: &ReviewHistory, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let today_reviews = history
            .reviews_by_date
            .get(&today)
            .map(|d| d.total())
            .unwrap_or(0);
        let week = history.recent_days(today, 7);

        Self {
            total_reviews: history.total_reviews,
            current_streak: history.current_streak(today),
            longest_streak: history.streak.longest_streak,
            today_reviews,
            week_reviews: week.iter().map(|d| d.total()).sum(),
            week_lapses: week.iter().map(|d| d.lapsed).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaced_repetition::item::ContentId;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn item(id: u64, due: DateTime<Utc>, memorized: bool) -> ReviewItem {
        let mut item = ReviewItem::new("bob".to_string(), ContentId::vocabulary(id), 2.5, due);
        item.next_review_at = due;
        item.is_memorized = memorized;
        if memorized {
            item.repetitions = 2;
        }
        item
    }

    #[test]
    fn test_aggregate_empty() {
        let items: Vec<ReviewItem> = Vec::new();
        assert_eq!(aggregate(&items, noon()), ReviewStatistics::default());
    }

    #[test]
    fn test_aggregate_counts() {
        let now = noon();
        let items = vec![
            item(1, now - Duration::days(1), false),
            item(2, now + Duration::hours(6), true),
            item(3, now + Duration::days(1), true),
        ];

        let stats = aggregate(&items, now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.memorized, 2);
        assert_eq!(stats.due_today, 2);
        assert_eq!(aggregate(&items, now), stats);
    }

    #[test]
    fn test_progress() {
        let now = noon();
        let items = vec![
            item(1, now, true),
            item(2, now, false),
            item(3, now, false),
        ];
        let progress = progress(&items);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.memorized, 1);
        assert_eq!(progress.learning, 2);
        assert_eq!(progress.unreviewed, 2);
        assert_eq!(progress.memorized_percentage, 33);

        let none: Vec<ReviewItem> = Vec::new();
        assert_eq!(super::progress(&none).memorized_percentage, 0);
    }

    #[test]
    fn test_streak_same_day() {
        let mut history = ReviewHistory::default();
        let now = noon();
        history.record_review(now, true);
        history.record_review(now, false);
        history.record_review(now, true);
        assert_eq!(history.streak.current_streak, 1);
        assert_eq!(history.total_reviews, 3);

        let daily = history.reviews_by_date.get(&now.date_naive()).unwrap();
        assert_eq!(daily.passed, 2);
        assert_eq!(daily.lapsed, 1);
    }

    #[test]
    fn test_streak_consecutive_and_gap() {
        let mut history = ReviewHistory::default();
        let day0 = noon();
        history.record_review(day0, true);
        history.record_review(day0 + Duration::days(1), true);
        history.record_review(day0 + Duration::days(2), true);
        assert_eq!(history.streak.current_streak, 3);

        history.record_review(day0 + Duration::days(5), true);
        assert_eq!(history.streak.current_streak, 1);
        assert_eq!(history.streak.longest_streak, 3);
    }

    #[test]
    fn test_current_streak_expires() {
        let mut history = ReviewHistory::default();
        let day0 = noon();
        history.record_review(day0, true);
        assert_eq!(history.current_streak(day0.date_naive()), 1);
        assert_eq!(history.current_streak((day0 + Duration::days(1)).date_naive()), 1);
        assert_eq!(history.current_streak((day0 + Duration::days(2)).date_naive()), 0);
    }

    #[test]
    fn test_history_response() {
        let mut history = ReviewHistory::default();
        let now = noon();
        history.record_review(now - Duration::days(1), false);
        history.record_review(now, true);

        let response = HistoryResponse::from_history(&history, now);
        assert_eq!(response.total_reviews, 2);
        assert_eq!(response.today_reviews, 1);
        assert_eq!(response.week_reviews, 2);
        assert_eq!(response.week_lapses, 1);
        assert_eq!(response.current_streak, 2);
    }
}
