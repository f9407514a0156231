//! Review operations shared by the HTTP routes and the stdio dispatcher

use chrono::Utc;

use super::types::*;
use crate::spaced_repetition::session::CreateSessionRequest;
use crate::spaced_repetition::{
    HistoryResponse, LearningProgress, ReviewConfig, ReviewError, ReviewItem, ReviewSession,
    ReviewStatistics, SharedReviewStore,
};

pub async fn get_config(store: &SharedReviewStore) -> ReviewConfig {
    store.read().await.get_config().clone()
}

pub async fn update_config(
    store: &SharedReviewStore,
    config: ReviewConfig,
) -> Result<SuccessResponse, ReviewError> {
    store.write().await.update_config(config)?;
    Ok(SuccessResponse { success: true })
}

pub async fn track(
    store: &SharedReviewStore,
    request: ContentRequest,
) -> Result<ReviewItem, ReviewError> {
    store
        .write()
        .await
        .track(&request.learner_id, request.content)
}

pub async fn track_batch(
    store: &SharedReviewStore,
    request: TrackBatchRequest,
) -> Result<TrackBatchResponse, ReviewError> {
    let added = store
        .write()
        .await
        .track_batch(&request.learner_id, &request.contents)?;
    Ok(TrackBatchResponse {
        requested: request.contents.len(),
        added,
    })
}

pub async fn untrack(
    store: &SharedReviewStore,
    request: ContentRequest,
) -> Result<SuccessResponse, ReviewError> {
    store
        .write()
        .await
        .untrack(&request.learner_id, request.content)?;
    Ok(SuccessResponse { success: true })
}

pub async fn is_saved(store: &SharedReviewStore, request: ContentRequest) -> SavedResponse {
    let saved = store
        .read()
        .await
        .is_tracked(&request.learner_id, request.content);
    SavedResponse { saved }
}

pub async fn get_item(
    store: &SharedReviewStore,
    request: ContentRequest,
) -> Result<ReviewItem, ReviewError> {
    store
        .read()
        .await
        .get(&request.learner_id, request.content)
        .cloned()
        .ok_or(ReviewError::UnknownItem {
            learner_id: request.learner_id,
            content: request.content,
        })
}

pub async fn record_review(
    store: &SharedReviewStore,
    request: RecordReviewRequest,
) -> Result<ReviewItem, ReviewError> {
    store.write().await.review(
        &request.learner_id,
        request.content,
        request.rating.quality(),
        request.expected_version,
    )
}

pub async fn set_memorized(
    store: &SharedReviewStore,
    request: SetMemorizedRequest,
) -> Result<ReviewItem, ReviewError> {
    store
        .write()
        .await
        .set_memorized(&request.learner_id, request.content, request.memorized)
}

pub async fn items(store: &SharedReviewStore, request: ItemsRequest) -> Vec<ReviewItem> {
    store
        .read()
        .await
        .items(&request.learner_id, request.memorized)
}

pub async fn list_due(store: &SharedReviewStore, request: DueRequest) -> Vec<ReviewItem> {
    let as_of = request.as_of.unwrap_or_else(Utc::now);
    store.read().await.list_due(&request.learner_id, as_of)
}

pub async fn statistics(store: &SharedReviewStore, request: LearnerRequest) -> ReviewStatistics {
    store
        .read()
        .await
        .statistics(&request.learner_id, Utc::now())
}

pub async fn progress(store: &SharedReviewStore, request: LearnerRequest) -> LearningProgress {
    store.read().await.progress(&request.learner_id)
}

pub async fn history(store: &SharedReviewStore, request: LearnerRequest) -> HistoryResponse {
    store.read().await.history(&request.learner_id, Utc::now())
}

pub async fn create_session(
    store: &SharedReviewStore,
    request: CreateSessionRequest,
) -> ReviewSession {
    store.write().await.create_session(
        &request.learner_id,
        request.mode,
        request.limit,
        Utc::now(),
    )
}

pub async fn answer_session(
    store: &SharedReviewStore,
    request: SessionAnswerRequest,
) -> Result<ReviewSession, ReviewError> {
    store
        .write()
        .await
        .answer_session(&request.session_id, request.rating.quality(), Utc::now())
}

pub async fn session_back(
    store: &SharedReviewStore,
    request: SessionRequest,
) -> Result<ReviewSession, ReviewError> {
    store.write().await.session_back(&request.session_id)
}

pub async fn session_forward(
    store: &SharedReviewStore,
    request: SessionRequest,
) -> Result<ReviewSession, ReviewError> {
    store.write().await.session_forward(&request.session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaced_repetition::{create_shared_store, ContentId, ReviewFeedback, ReviewMode};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_track_review_and_stats() {
        let dir = tempdir().unwrap();
        let store = create_shared_store(dir.path().to_path_buf()).unwrap();
        let content = ContentId::vocabulary(10);

        let tracked = track(
            &store,
            ContentRequest {
                learner_id: "alice".to_string(),
                content,
            },
        )
        .await
        .unwrap();
        assert_eq!(tracked.version, 0);

        let reviewed = record_review(
            &store,
            RecordReviewRequest {
                learner_id: "alice".to_string(),
                content,
                rating: Rating::Feedback(ReviewFeedback::Good),
                expected_version: Some(0),
            },
        )
        .await
        .unwrap();
        assert_eq!(reviewed.repetitions, 1);
        assert_eq!(reviewed.interval_days, 1);

        let stats = statistics(
            &store,
            LearnerRequest {
                learner_id: "alice".to_string(),
            },
        )
        .await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.due_today, 0);
    }

    #[tokio::test]
    async fn test_concurrent_reviews_with_same_version() {
        let dir = tempdir().unwrap();
        let store = create_shared_store(dir.path().to_path_buf()).unwrap();
        let content = ContentId::grammar(1);
        store.write().await.track("alice", content).unwrap();

        let submit = |quality| {
            let store = store.clone();
            async move {
                record_review(
                    &store,
                    RecordReviewRequest {
                        learner_id: "alice".to_string(),
                        content,
                        rating: Rating::Quality(quality),
                        expected_version: Some(0),
                    },
                )
                .await
            }
        };

        let (a, b) = tokio::join!(submit(5), submit(1));
        let conflicts = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(ReviewError::ConcurrentModification { .. })))
            .count();
        assert_eq!(conflicts, 1);
        assert_eq!(store.read().await.get("alice", content).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_item() {
        let dir = tempdir().unwrap();
        let store = create_shared_store(dir.path().to_path_buf()).unwrap();

        let result = get_item(
            &store,
            ContentRequest {
                learner_id: "alice".to_string(),
                content: ContentId::vocabulary(1),
            },
        )
        .await;
        assert!(matches!(result, Err(ReviewError::UnknownItem { .. })));
    }

    #[tokio::test]
    async fn test_session_answer_flow() {
        let dir = tempdir().unwrap();
        let store = create_shared_store(dir.path().to_path_buf()).unwrap();
        store
            .write()
            .await
            .track("alice", ContentId::vocabulary(3))
            .unwrap();

        let session = create_session(
            &store,
            CreateSessionRequest {
                learner_id: "alice".to_string(),
                mode: ReviewMode::Today,
                limit: None,
            },
        )
        .await;
        assert_eq!(session.items.len(), 1);

        let answered = answer_session(
            &store,
            SessionAnswerRequest {
                session_id: session.id.clone(),
                rating: Rating::Feedback(ReviewFeedback::Easy),
            },
        )
        .await
        .unwrap();
        assert!(answered.is_complete());
        assert_eq!(answered.items[0].repetitions, 1);

        let gone = session_back(
            &store,
            SessionRequest {
                session_id: session.id,
            },
        )
        .await;
        assert!(matches!(gone, Err(ReviewError::SessionNotFound(_))));
    }
}
