use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spaced_repetition::{ContentId, ReviewFeedback};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerRequest {
    pub learner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub learner_id: String,
    pub content: ContentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackBatchRequest {
    pub learner_id: String,
    pub contents: Vec<ContentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackBatchResponse {
    pub requested: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedResponse {
    pub saved: bool,
}

/// Either a raw 0-5 quality or one of the answer buttons
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rating {
    Quality(i32),
    Feedback(ReviewFeedback),
}

impl Rating {
    pub fn quality(self) -> i32 {
        match self {
            Rating::Quality(q) => q,
            Rating::Feedback(feedback) => feedback.quality().value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordReviewRequest {
    pub learner_id: String,
    pub content: ContentId,
    pub rating: Rating,
    /// Version the client loaded; a mismatch is rejected
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMemorizedRequest {
    pub learner_id: String,
    pub content: ContentId,
    pub memorized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsRequest {
    pub learner_id: String,
    pub memorized: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueRequest {
    pub learner_id: String,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnswerRequest {
    pub session_id: String,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
