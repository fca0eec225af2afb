//! In-memory survey registry shared by HTTP handlers

use rankpool_common::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::survey::session::{SurveySession, SurveyView};
use crate::types::ResourceId;

/// Map of active surveys keyed by session token
///
/// Survey progress lives only in memory. The durable parts of a session
/// (its assignment and any exported results) are on disk, so a restarted
/// process rebuilds a survey from the same images.
#[derive(Clone, Default)]
pub struct SurveyRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SurveySession>>>,
}

impl SurveyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a survey for `session`, keeping an existing one untouched
    pub async fn open(
        &self,
        session: &SessionId,
        assignment: &[ResourceId],
        set_size: usize,
    ) -> SurveyView {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session.clone())
            .or_insert_with(|| {
                tracing::debug!(session = %session, "Survey opened");
                SurveySession::new(session.clone(), assignment, set_size)
            })
            .view()
    }

    pub async fn view(&self, session: &SessionId) -> Option<SurveyView> {
        self.sessions.read().await.get(session).map(SurveySession::view)
    }

    /// Run `f` against the survey under the write lock
    ///
    /// Returns `None` if no survey is open for `session`.
    pub async fn with_session<R>(
        &self,
        session: &SessionId,
        f: impl FnOnce(&mut SurveySession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(session).map(f)
    }

    /// Register a survey rebuilt elsewhere, keeping an existing one untouched
    pub async fn restore(&self, survey: SurveySession) -> SurveyView {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(survey.session_id().clone())
            .or_insert(survey)
            .view()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<ResourceId> {
        (0..n).map(|i| format!("{}.jpg", i)).collect()
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let registry = SurveyRegistry::new();
        let session = SessionId::parse("reg-1").unwrap();

        registry.open(&session, &ids(10), 5).await;
        registry
            .with_session(&session, |s| s.restart())
            .await
            .unwrap()
            .unwrap();

        // Reopening with another assignment keeps the original survey
        let view = registry.open(&session, &ids(4), 2).await;
        assert_eq!(view.num_sets, 2);
        assert_eq!(view.current_batch.len(), 5);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_restore_keeps_open_survey() {
        let registry = SurveyRegistry::new();
        let session = SessionId::parse("reg-2").unwrap();

        registry.open(&session, &ids(10), 5).await;
        let view = registry
            .restore(SurveySession::submitted_at(
                session.clone(),
                &ids(10),
                5,
                "ranking_reg-2.json".into(),
            ))
            .await;
        assert!(!view.submitted);

        let other = SessionId::parse("reg-3").unwrap();
        let view = registry
            .restore(SurveySession::submitted_at(
                other,
                &ids(10),
                5,
                "ranking_reg-3.json".into(),
            ))
            .await;
        assert!(view.submitted);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = SurveyRegistry::new();
        let session = SessionId::parse("missing").unwrap();

        assert!(registry.view(&session).await.is_none());
        assert!(registry.with_session(&session, |s| s.num_sets()).await.is_none());
        assert!(registry.is_empty().await);
    }
}
