use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use storage::repository::{InMemoryStore, SlotStore};
use tracing::{debug, info, warn};
use yle_core::model::{
    AnswerResponse, Assessment, AssessmentId, QuestionId, SessionStateError, StudentAnswer,
    StudentId, TestSession,
};

use super::environment::EnvironmentProbe;
use super::id::generate_session_id;
use super::persistence::SessionPersistence;
use super::progress::SessionProgress;
use crate::Clock;
use crate::error::SessionError;

/// Authoritative holder of the current test session.
///
/// Every successful mutation is written through to the current-session slot
/// before it becomes visible in memory, so a failed write leaves the previous
/// state in place. Completed sessions are also appended to the history slot.
pub struct SessionManager {
    clock: Clock,
    persistence: SessionPersistence,
    environment: EnvironmentProbe,
    current: Option<TestSession>,
}

impl SessionManager {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn SlotStore>) -> Self {
        Self {
            clock,
            persistence: SessionPersistence::new(store),
            environment: EnvironmentProbe::default(),
            current: None,
        }
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(clock, Arc::new(InMemoryStore::new()))
    }

    /// Set the environment captured into each new session's metadata.
    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentProbe) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn persistence(&self) -> &SessionPersistence {
        &self.persistence
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Replace the clock, e.g. to advance a fixed clock in tests.
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    //
    // ─── LIFECYCLE ──────────────────────────────────────────────────────────────
    //

    /// Create and persist a `not-started` session, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage`/`Encode` if the session cannot be persisted;
    /// the previous current session is kept in that case.
    pub async fn create_session(
        &mut self,
        student_id: StudentId,
        assessment_id: AssessmentId,
        time_limit_minutes: u32,
    ) -> Result<&TestSession, SessionError> {
        let now = self.clock.now();
        let id = generate_session_id(now, &mut rand::rng());
        let session = TestSession::new(
            id,
            student_id,
            assessment_id,
            time_limit_minutes,
            self.environment.metadata(),
            now,
        );

        self.persistence.save_current(&session).await?;
        info!(
            session_id = %session.id(),
            student_id = %session.student_id(),
            assessment_id = %session.assessment_id(),
            "created session"
        );
        Ok(self.current.insert(session))
    }

    /// Create a session for `assessment` using its id and time limit.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::create_session`].
    pub async fn create_for_assessment(
        &mut self,
        student_id: StudentId,
        assessment: &Assessment,
    ) -> Result<&TestSession, SessionError> {
        self.create_session(
            student_id,
            assessment.id().clone(),
            assessment.time_limit_minutes(),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession`, `SessionError::State` unless the
    /// session is `not-started`, or a persistence error.
    pub async fn start_session(&mut self) -> Result<(), SessionError> {
        self.mutate(|session, now| session.start(now)).await?;
        info!("session started");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession`, `SessionError::State` unless the
    /// session is `in-progress`, or a persistence error.
    pub async fn pause_session(&mut self) -> Result<(), SessionError> {
        self.mutate(|session, _| session.pause()).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession`, `SessionError::State` unless the
    /// session is `paused`, or a persistence error.
    pub async fn resume_session(&mut self) -> Result<(), SessionError> {
        self.mutate(|session, _| session.resume()).await
    }

    /// Complete the session and append a copy of it to history.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession`, `SessionError::State` unless the
    /// session is `in-progress` or `paused`, or a persistence error. If only the
    /// history write fails the session stays completed.
    pub async fn complete_session(&mut self) -> Result<(), SessionError> {
        self.mutate(|session, now| session.complete(now)).await?;

        let session = self.current.as_ref().ok_or(SessionError::NoActiveSession)?;
        let len = self.persistence.append_history(session).await?;
        info!(session_id = %session.id(), history_len = len, "session completed");
        Ok(())
    }

    //
    // ─── ANSWERS & NAVIGATION ───────────────────────────────────────────────────
    //

    /// Record an answer, replacing any previous one for `question_id` and
    /// bumping its attempt count.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession`,
    /// `SessionError::State(NonFiniteAnswer)` for NaN or infinite numbers, or a
    /// persistence error. Nothing is written when the answer is rejected.
    pub async fn save_answer(
        &mut self,
        question_id: QuestionId,
        response: AnswerResponse,
        time_spent_secs: u32,
    ) -> Result<StudentAnswer, SessionError> {
        let answer = self
            .mutate(|session, now| {
                session
                    .record_answer(question_id, response, time_spent_secs, now)
                    .cloned()
            })
            .await?;
        debug!(
            question_id = %answer.question_id,
            attempts = answer.attempts,
            "saved answer"
        );
        Ok(answer)
    }

    /// Advance one question with no upper bound. Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession` or a persistence error.
    pub async fn next_question(&mut self) -> Result<usize, SessionError> {
        self.mutate(|session, _| Ok(session.next_question())).await
    }

    /// Advance one question, refusing to move past the last of `total`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State(QuestionOutOfRange)` on the last question.
    pub async fn next_question_within(&mut self, total: usize) -> Result<usize, SessionError> {
        self.mutate(|session, _| session.next_question_within(total))
            .await
    }

    /// # Errors
    ///
    /// Returns `SessionError::State(AtFirstQuestion)` at index 0, and leaves
    /// storage untouched.
    pub async fn previous_question(&mut self) -> Result<usize, SessionError> {
        self.mutate(|session, _| session.previous_question()).await
    }

    /// Jump to `index` with no upper bound.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession` or a persistence error.
    pub async fn go_to_question(&mut self, index: usize) -> Result<usize, SessionError> {
        self.mutate(|session, _| {
            session.go_to_question(index);
            Ok(index)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `SessionError::State(QuestionOutOfRange)` when `index >= total`.
    pub async fn go_to_question_within(
        &mut self,
        index: usize,
        total: usize,
    ) -> Result<usize, SessionError> {
        self.mutate(|session, _| session.go_to_question_within(index, total))
            .await
    }

    /// Set the countdown, flooring negative values at zero. Returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession` or a persistence error.
    pub async fn update_time_remaining(&mut self, seconds: i64) -> Result<u32, SessionError> {
        self.mutate(|session, _| {
            session.set_time_remaining(seconds);
            Ok(session.time_remaining())
        })
        .await
    }

    //
    // ─── READS ──────────────────────────────────────────────────────────────────
    //

    /// The current session, loading it from storage once if memory is empty.
    ///
    /// Unreadable or corrupt storage yields `None`; it is logged, never returned.
    pub async fn current_session(&mut self) -> Option<&TestSession> {
        if self.current.is_none() {
            match self.persistence.load_current().await {
                Ok(Some(session)) => {
                    debug!(session_id = %session.id(), "recovered session from storage");
                    self.current = Some(session);
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "could not read persisted session"),
            }
        }
        self.current.as_ref()
    }

    /// The in-memory session without touching storage.
    #[must_use]
    pub fn session(&self) -> Option<&TestSession> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn answer_for_question(&self, question_id: &QuestionId) -> Option<&StudentAnswer> {
        self.current.as_ref()?.answer_for(question_id)
    }

    /// True when there is no session or its countdown has reached zero.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.current.as_ref().is_none_or(TestSession::is_expired)
    }

    /// `round(100 * answered / total_questions)`, or 0 without a session.
    #[must_use]
    pub fn progress_percentage(&self, total_questions: usize) -> u32 {
        self.current
            .as_ref()
            .map_or(0, |session| session.progress_percentage(total_questions))
    }

    #[must_use]
    pub fn progress(&self, total_questions: usize) -> Option<SessionProgress> {
        let session = self.current.as_ref()?;
        let answered = session.answers().len();
        Some(SessionProgress {
            total: total_questions,
            answered,
            remaining: total_questions.saturating_sub(answered),
            percentage: session.progress_percentage(total_questions),
            current_index: session.current_question_index(),
            time_remaining: session.time_remaining(),
            is_expired: session.is_expired(),
        })
    }

    /// Drop the current session from memory and storage. History is kept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the slot cannot be erased; memory is
    /// cleared regardless.
    pub async fn clear_session(&mut self) -> Result<(), SessionError> {
        let cleared = self.current.take();
        debug!(
            session_id = cleared.as_ref().map(|session| session.id().as_str()),
            "clearing session"
        );
        self.persistence.clear_current().await?;
        Ok(())
    }

    //
    // ─── INTERNALS ──────────────────────────────────────────────────────────────
    //

    /// Apply `f` to a copy of the current session, persist it, then commit.
    async fn mutate<T, F>(&mut self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut TestSession, DateTime<Utc>) -> Result<T, SessionStateError>,
    {
        let mut next = self
            .current
            .as_ref()
            .ok_or(SessionError::NoActiveSession)?
            .clone();
        let out = f(&mut next, self.clock.now())?;
        self.persistence.save_current(&next).await?;
        self.current = Some(next);
        Ok(out)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("clock", &self.clock)
            .field("environment", &self.environment)
            .field("current", &self.current.as_ref().map(TestSession::id))
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::persistence::{CURRENT_SESSION_SLOT, HISTORY_LIMIT};
    use chrono::Duration;
    use yle_core::model::{SessionAction, SessionStatus};
    use yle_core::time::{fixed_clock, fixed_now};

    fn manager_with_store() -> (SessionManager, InMemoryStore) {
        let store = InMemoryStore::new();
        let manager = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        (manager, store)
    }

    async fn started(manager: &mut SessionManager) {
        manager
            .create_session(
                StudentId::new("s1"),
                AssessmentId::new("starters-practice-001"),
                30,
            )
            .await
            .unwrap();
        manager.start_session().await.unwrap();
    }

    #[tokio::test]
    async fn operations_without_session_fail_softly() {
        let mut manager = SessionManager::in_memory(fixed_clock());

        assert!(matches!(
            manager.start_session().await,
            Err(SessionError::NoActiveSession)
        ));
        assert!(manager.pause_session().await.is_err());
        assert!(manager.resume_session().await.is_err());
        assert!(manager.complete_session().await.is_err());
        assert!(manager.next_question().await.is_err());
        assert!(manager.previous_question().await.is_err());
        assert!(manager.go_to_question(2).await.is_err());
        assert!(manager.update_time_remaining(10).await.is_err());
        assert!(
            manager
                .save_answer(QuestionId::new("q"), AnswerResponse::text("a"), 1)
                .await
                .is_err()
        );

        assert!(manager.answer_for_question(&QuestionId::new("q")).is_none());
        assert!(manager.is_session_expired());
        assert_eq!(manager.progress_percentage(10), 0);
        assert!(manager.progress(10).is_none());
        assert!(manager.current_session().await.is_none());
    }

    #[tokio::test]
    async fn create_captures_environment_and_persists() {
        let (manager, store) = manager_with_store();
        let mut manager = manager.with_environment(
            EnvironmentProbe::new("Mozilla/5.0 (iPhone) Safari/604.1").with_reduced_motion(true),
        );
        let session = manager
            .create_session(StudentId::new("s1"), AssessmentId::new("a1"), 30)
            .await
            .unwrap()
            .clone();

        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert_eq!(session.time_remaining(), 1800);
        assert!(session.id().as_str().starts_with("session_1700000000000_"));
        assert_eq!(
            session.metadata().device_info,
            Some(yle_core::model::DeviceClass::Mobile)
        );
        assert!(store.get(CURRENT_SESSION_SLOT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn state_machine_legality() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        manager
            .create_session(StudentId::new("s1"), AssessmentId::new("a1"), 30)
            .await
            .unwrap();

        let err = manager.resume_session().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::State(SessionStateError::InvalidTransition {
                from: SessionStatus::NotStarted,
                action: SessionAction::Resume,
            })
        ));
        assert_eq!(manager.session().unwrap().status(), SessionStatus::NotStarted);

        manager.start_session().await.unwrap();
        assert!(manager.start_session().await.is_err());
        manager.pause_session().await.unwrap();
        manager.resume_session().await.unwrap();
        assert_eq!(manager.session().unwrap().status(), SessionStatus::InProgress);

        manager.complete_session().await.unwrap();
        assert!(manager.complete_session().await.is_err());
        assert!(manager.start_session().await.is_err());
        assert!(manager.resume_session().await.is_err());
        assert_eq!(manager.session().unwrap().status(), SessionStatus::Completed);
        assert_eq!(manager.persistence().load_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_resets_start_time() {
        let mut clock = fixed_clock();
        let mut manager = SessionManager::in_memory(clock);
        manager
            .create_session(StudentId::new("s1"), AssessmentId::new("a1"), 30)
            .await
            .unwrap();

        clock.advance(Duration::minutes(3));
        manager.set_clock(clock);
        manager.start_session().await.unwrap();
        assert_eq!(
            manager.session().unwrap().start_time(),
            fixed_now() + Duration::minutes(3)
        );
    }

    #[tokio::test]
    async fn resubmission_replaces_and_counts_attempts() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        started(&mut manager).await;

        let q = QuestionId::new("starters-mc-001");
        manager
            .save_answer(q.clone(), AnswerResponse::text("Blue"), 5)
            .await
            .unwrap();
        let second = manager
            .save_answer(q.clone(), AnswerResponse::text("Yellow"), 12)
            .await
            .unwrap();

        assert_eq!(second.attempts, 2);
        let session = manager.session().unwrap();
        assert_eq!(session.answers().len(), 1);
        let stored = manager.answer_for_question(&q).unwrap();
        assert_eq!(stored.response, AnswerResponse::text("Yellow"));
        assert_eq!(stored.time_spent, 12);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn attempts_match_submission_counts() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        started(&mut manager).await;

        let plan = [("a", 3), ("b", 1), ("c", 5)];
        for round in 0..5 {
            for (qid, times) in plan {
                if round < times {
                    manager
                        .save_answer(QuestionId::new(qid), AnswerResponse::Number(1.0), 1)
                        .await
                        .unwrap();
                }
            }
        }

        let session = manager.session().unwrap();
        assert_eq!(session.answers().len(), plan.len());
        for (qid, times) in plan {
            let answer = session.answer_for(&QuestionId::new(qid)).unwrap();
            assert_eq!(answer.attempts, times);
        }
    }

    #[tokio::test]
    async fn non_finite_answer_leaves_session_and_history_intact() {
        let store = InMemoryStore::new();
        let mut manager = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        started(&mut manager).await;
        manager.complete_session().await.unwrap();

        started(&mut manager).await;
        let q = QuestionId::new("movers-number-001");
        manager
            .save_answer(q.clone(), AnswerResponse::Number(12.0), 3)
            .await
            .unwrap();
        let before = manager.session().unwrap().clone();

        let err = manager
            .save_answer(q.clone(), AnswerResponse::Number(f64::NAN), 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::State(SessionStateError::NonFiniteAnswer { .. })
        ));
        assert!(
            manager
                .save_answer(q.clone(), AnswerResponse::Number(f64::INFINITY), 4)
                .await
                .is_err()
        );
        assert_eq!(manager.session().unwrap(), &before);

        let raw = store.get(CURRENT_SESSION_SLOT).await.unwrap().unwrap();
        assert!(!raw.contains("null"));
        let mut reloaded = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        assert_eq!(reloaded.current_session().await.unwrap(), &before);

        reloaded.complete_session().await.unwrap();
        assert_eq!(reloaded.persistence().load_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_without_session_still_erases_slot() {
        let store = InMemoryStore::new();
        let mut writer = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        started(&mut writer).await;

        let mut fresh = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        assert!(fresh.session().is_none());
        fresh.clear_session().await.unwrap();
        assert!(store.get(CURRENT_SESSION_SLOT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn time_floor() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        started(&mut manager).await;

        assert_eq!(manager.update_time_remaining(-5).await.unwrap(), 0);
        assert!(manager.is_session_expired());
        assert_eq!(manager.update_time_remaining(100).await.unwrap(), 100);
        assert!(!manager.is_session_expired());
        manager.update_time_remaining(-1).await.unwrap();
        assert_eq!(manager.session().unwrap().time_remaining(), 0);
    }

    #[tokio::test]
    async fn navigation_bounds() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        started(&mut manager).await;

        assert!(matches!(
            manager.previous_question().await,
            Err(SessionError::State(SessionStateError::AtFirstQuestion))
        ));
        assert_eq!(manager.session().unwrap().current_question_index(), 0);

        for expected in 1..=12 {
            assert_eq!(manager.next_question().await.unwrap(), expected);
        }
        assert_eq!(manager.previous_question().await.unwrap(), 11);
        assert_eq!(manager.go_to_question(0).await.unwrap(), 0);

        assert!(manager.go_to_question_within(5, 5).await.is_err());
        assert_eq!(manager.go_to_question_within(4, 5).await.unwrap(), 4);
        assert!(manager.next_question_within(5).await.is_err());
        assert_eq!(manager.session().unwrap().current_question_index(), 4);
    }

    #[tokio::test]
    async fn progress_percentage() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        started(&mut manager).await;
        assert_eq!(manager.progress_percentage(10), 0);

        for i in 0..3 {
            manager
                .save_answer(
                    QuestionId::new(format!("q{i}")),
                    AnswerResponse::text("x"),
                    1,
                )
                .await
                .unwrap();
        }
        assert_eq!(manager.progress_percentage(10), 30);

        let progress = manager.progress(10).unwrap();
        assert_eq!(progress.answered, 3);
        assert_eq!(progress.remaining, 7);
        assert_eq!(progress.time_remaining, 1800);
        assert!(!progress.is_expired);
    }

    #[tokio::test]
    async fn reload_recovers_identical_session() {
        let store = InMemoryStore::new();
        let mut manager = SessionManager::new(fixed_clock(), Arc::new(store.clone()));
        started(&mut manager).await;
        manager
            .save_answer(
                QuestionId::new("drag-1"),
                AnswerResponse::parts(["cat", "dog"]),
                7,
            )
            .await
            .unwrap();
        manager.next_question().await.unwrap();
        manager.update_time_remaining(1234).await.unwrap();
        manager.pause_session().await.unwrap();
        let before = manager.session().unwrap().clone();

        let mut reloaded = SessionManager::new(fixed_clock(), Arc::new(store));
        assert!(reloaded.session().is_none());
        let recovered = reloaded.current_session().await.unwrap();
        assert_eq!(recovered, &before);
    }

    #[tokio::test]
    async fn corrupt_storage_reads_as_no_session() {
        let store = InMemoryStore::new();
        store.set(CURRENT_SESSION_SLOT, "{\"id\":").await.unwrap();
        let mut manager = SessionManager::new(fixed_clock(), Arc::new(store.clone()));

        assert!(manager.current_session().await.is_none());
        assert!(store.get(CURRENT_SESSION_SLOT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_keeps_history() {
        let (mut manager, store) = manager_with_store();
        started(&mut manager).await;
        manager.complete_session().await.unwrap();
        manager.clear_session().await.unwrap();

        assert!(manager.session().is_none());
        assert!(store.get(CURRENT_SESSION_SLOT).await.unwrap().is_none());
        assert!(manager.current_session().await.is_none());
        assert_eq!(manager.persistence().load_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let mut manager = SessionManager::in_memory(fixed_clock());
        let mut ids = Vec::new();
        for _ in 0..55 {
            started(&mut manager).await;
            ids.push(manager.session().unwrap().id().clone());
            manager.complete_session().await.unwrap();
        }

        let history = manager.persistence().load_history().await.unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        let kept: Vec<_> = history.iter().map(|s| s.id().clone()).collect();
        assert_eq!(kept, ids[5..].to_vec());
    }
}
