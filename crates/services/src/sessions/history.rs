use chrono::{DateTime, Utc};
use std::sync::Arc;

use storage::repository::SlotStore;
use yle_core::grading::{AssessmentResult, grade_session};
use yle_core::model::{AssessmentId, SessionId, SessionStatus, StudentId, TestSession};

use super::persistence::SessionPersistence;
use crate::catalog::AssessmentProvider;
use crate::error::SessionError;

/// Presentation-agnostic row for one archived session.
///
/// No pre-formatted strings; the front end formats times and scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHistoryItem {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub assessment_id: AssessmentId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub answered: u32,
    pub completion_secs: Option<i64>,
}

impl SessionHistoryItem {
    #[must_use]
    pub fn from_session(session: &TestSession) -> Self {
        Self {
            session_id: session.id().clone(),
            student_id: session.student_id().clone(),
            assessment_id: session.assessment_id().clone(),
            status: session.status(),
            started_at: session.start_time(),
            completed_at: session.end_time(),
            answered: u32::try_from(session.answers().len()).unwrap_or(u32::MAX),
            completion_secs: session.completion_secs(),
        }
    }
}

/// Read-only queries over the session history slot.
#[derive(Clone)]
pub struct SessionHistoryService {
    persistence: SessionPersistence,
}

impl SessionHistoryService {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self {
            persistence: SessionPersistence::new(store),
        }
    }

    /// Up to `limit` archived sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the slot cannot be read.
    pub async fn recent(&self, limit: usize) -> Result<Vec<SessionHistoryItem>, SessionError> {
        let history = self.persistence.load_history().await?;
        Ok(history
            .iter()
            .rev()
            .take(limit)
            .map(SessionHistoryItem::from_session)
            .collect())
    }

    /// Archived sessions for one student, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the slot cannot be read.
    pub async fn for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<SessionHistoryItem>, SessionError> {
        let history = self.persistence.load_history().await?;
        Ok(history
            .iter()
            .rev()
            .filter(|session| session.student_id() == student_id)
            .map(SessionHistoryItem::from_session)
            .collect())
    }

    /// Grade every archived session whose assessment `provider` knows, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the slot cannot be read.
    pub async fn results(
        &self,
        provider: &dyn AssessmentProvider,
    ) -> Result<Vec<AssessmentResult>, SessionError> {
        let history = self.persistence.load_history().await?;
        let mut results = Vec::new();
        for session in history.iter().rev() {
            let Some(assessment) = provider.assessment(session.assessment_id()) else {
                continue;
            };
            results.push(grade_session(session, assessment)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::sessions::manager::SessionManager;
    use storage::repository::InMemoryStore;
    use yle_core::model::{
        AnswerResponse, Assessment, QuestionContent, QuestionDraft, QuestionId,
        QuestionMetadata, QuestionType, SkillArea, YleLevel,
    };
    use yle_core::time::{fixed_clock, fixed_now};

    fn assessment() -> Assessment {
        let question = QuestionDraft {
            id: QuestionId::new("starters-mc-001"),
            kind: QuestionType::MultipleChoice,
            level: YleLevel::Starters,
            skill_area: SkillArea::Vocabulary,
            difficulty: 1,
            content: QuestionContent::new("What color is the sun?", "Choose.")
                .with_options(["Blue", "Yellow"]),
            correct_answer: AnswerResponse::text("Yellow"),
            points: 1,
            time_limit_secs: None,
            metadata: QuestionMetadata::system(fixed_now()),
        }
        .validate()
        .unwrap();
        Assessment::new(
            AssessmentId::new("starters-practice-001"),
            "Starters Practice Test",
            "",
            YleLevel::Starters,
            vec![question],
            30,
            70,
            fixed_now(),
        )
        .unwrap()
    }

    async fn complete(manager: &mut SessionManager, student: &str, assessment: &str, answer: &str) {
        manager
            .create_session(StudentId::new(student), AssessmentId::new(assessment), 30)
            .await
            .unwrap();
        manager.start_session().await.unwrap();
        manager
            .save_answer(QuestionId::new("starters-mc-001"), AnswerResponse::text(answer), 4)
            .await
            .unwrap();
        manager.complete_session().await.unwrap();
    }

    #[tokio::test]
    async fn queries_read_newest_first() {
        let store = InMemoryStore::new();
        let mut manager = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        complete(&mut manager, "s1", "starters-practice-001", "Yellow").await;
        complete(&mut manager, "s2", "starters-practice-001", "Blue").await;
        complete(&mut manager, "s1", "unknown-assessment", "Blue").await;

        let history = SessionHistoryService::new(Arc::new(store));

        let recent = history.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].assessment_id.as_str(), "unknown-assessment");
        assert_eq!(recent[1].student_id.as_str(), "s2");
        assert!(recent.iter().all(|item| item.status == SessionStatus::Completed));

        let mine = history.for_student(&StudentId::new("s1")).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].answered, 1);

        let catalog = InMemoryCatalog::new(vec![assessment()]).unwrap();
        let results = history.results(&catalog).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].student_id.as_str(), "s2");
        assert!(!results[0].passed);
        assert_eq!(results[1].percentage, 100);
    }

    #[tokio::test]
    async fn empty_history_reads_empty() {
        let history = SessionHistoryService::new(Arc::new(InMemoryStore::new()));
        assert!(history.recent(10).await.unwrap().is_empty());
    }
}
