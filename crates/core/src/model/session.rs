use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::answer::{AnswerResponse, StudentAnswer};
use crate::model::ids::{AssessmentId, QuestionId, SessionId, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("cannot {action} a session that is {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: SessionAction,
    },

    #[error("already at the first question")]
    AtFirstQuestion,

    #[error("question index {index} is out of range for {total} questions")]
    QuestionOutOfRange { index: usize, total: usize },

    #[error("answer to {question} is not a finite number")]
    NonFiniteAnswer { question: QuestionId },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of a test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not-started",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed)
    }

    /// Status reached by applying `action`, or `None` if the edge does not exist.
    #[must_use]
    pub fn after(self, action: SessionAction) -> Option<SessionStatus> {
        match (self, action) {
            (SessionStatus::NotStarted, SessionAction::Start)
            | (SessionStatus::Paused, SessionAction::Resume) => Some(SessionStatus::InProgress),
            (SessionStatus::InProgress, SessionAction::Pause) => Some(SessionStatus::Paused),
            (SessionStatus::InProgress | SessionStatus::Paused, SessionAction::Complete) => {
                Some(SessionStatus::Completed)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Complete,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            SessionAction::Start => "start",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Complete => "complete",
        };
        f.write_str(verb)
    }
}

//
// ─── METADATA ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessibilityFeature {
    HighContrast,
    ReducedMotion,
    ScreenReader,
}

/// Environment captured once when a session is created. Descriptive only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_info: Option<BrowserKind>,
    #[serde(default)]
    pub accessibility_features: Vec<AccessibilityFeature>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One student's attempt at an assessment.
///
/// All mutation goes through methods so that the invariants hold:
/// - at most one answer per question, with `attempts` counting submissions
/// - `time_remaining` never goes below zero (it is unsigned)
/// - `status` only moves along the edges in [`SessionStatus::after`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    id: SessionId,
    student_id: StudentId,
    assessment_id: AssessmentId,
    start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    current_question_index: usize,
    answers: Vec<StudentAnswer>,
    time_remaining: u32,
    status: SessionStatus,
    #[serde(default)]
    metadata: SessionMetadata,
}

impl TestSession {
    /// Create a `not-started` session with `time_limit_minutes * 60` seconds on the clock.
    #[must_use]
    pub fn new(
        id: SessionId,
        student_id: StudentId,
        assessment_id: AssessmentId,
        time_limit_minutes: u32,
        metadata: SessionMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            assessment_id,
            start_time: created_at,
            end_time: None,
            current_question_index: 0,
            answers: Vec::new(),
            time_remaining: time_limit_minutes.saturating_mul(60),
            status: SessionStatus::NotStarted,
            metadata,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    #[must_use]
    pub fn assessment_id(&self) -> &AssessmentId {
        &self.assessment_id
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    #[must_use]
    pub fn answers(&self) -> &[StudentAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    fn transition(&mut self, action: SessionAction) -> Result<(), SessionStateError> {
        let next = self
            .status
            .after(action)
            .ok_or(SessionStateError::InvalidTransition {
                from: self.status,
                action,
            })?;
        self.status = next;
        Ok(())
    }

    /// `not-started → in-progress`; resets `start_time`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` from any other status.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.transition(SessionAction::Start)?;
        self.start_time = now;
        Ok(())
    }

    /// `in-progress → paused`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` from any other status.
    pub fn pause(&mut self) -> Result<(), SessionStateError> {
        self.transition(SessionAction::Pause)
    }

    /// `paused → in-progress`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` from any other status.
    pub fn resume(&mut self) -> Result<(), SessionStateError> {
        self.transition(SessionAction::Resume)
    }

    /// `in-progress | paused → completed`; sets `end_time`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` when not started or already completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.transition(SessionAction::Complete)?;
        self.end_time = Some(now);
        Ok(())
    }

    /// Record a submission, replacing any earlier answer for the same question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NonFiniteAnswer` for NaN or infinite numbers;
    /// the session is left unchanged.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        response: AnswerResponse,
        time_spent: u32,
        now: DateTime<Utc>,
    ) -> Result<&StudentAnswer, SessionStateError> {
        if !response.is_storable() {
            return Err(SessionStateError::NonFiniteAnswer {
                question: question_id,
            });
        }

        let pos = self
            .answers
            .iter()
            .position(|answer| answer.question_id == question_id);

        match pos {
            Some(idx) => {
                let next = self.answers[idx].resubmit(response, time_spent, now);
                self.answers[idx] = next;
                Ok(&self.answers[idx])
            }
            None => {
                self.answers
                    .push(StudentAnswer::first(question_id, response, time_spent, now));
                let last = self.answers.len() - 1;
                Ok(&self.answers[last])
            }
        }
    }

    /// Move forward one question. Unbounded; returns the new index.
    pub fn next_question(&mut self) -> usize {
        self.current_question_index = self.current_question_index.saturating_add(1);
        self.current_question_index
    }

    /// Move forward one question without passing the last of `total`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::QuestionOutOfRange` when already on the last question.
    pub fn next_question_within(&mut self, total: usize) -> Result<usize, SessionStateError> {
        let index = self.current_question_index.saturating_add(1);
        self.go_to_question_within(index, total)
    }

    /// Move back one question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AtFirstQuestion` at index 0.
    pub fn previous_question(&mut self) -> Result<usize, SessionStateError> {
        if self.current_question_index == 0 {
            return Err(SessionStateError::AtFirstQuestion);
        }
        self.current_question_index -= 1;
        Ok(self.current_question_index)
    }

    /// Jump to `index`. Unbounded.
    pub fn go_to_question(&mut self, index: usize) {
        self.current_question_index = index;
    }

    /// Jump to `index` if it addresses one of `total` questions.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::QuestionOutOfRange` when `index >= total`.
    pub fn go_to_question_within(
        &mut self,
        index: usize,
        total: usize,
    ) -> Result<usize, SessionStateError> {
        if index >= total {
            return Err(SessionStateError::QuestionOutOfRange { index, total });
        }
        self.current_question_index = index;
        Ok(index)
    }

    /// Set the countdown, flooring negative input at zero.
    pub fn set_time_remaining(&mut self, seconds: i64) {
        self.time_remaining = u32::try_from(seconds.max(0)).unwrap_or(u32::MAX);
    }

    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<&StudentAnswer> {
        self.answers
            .iter()
            .find(|answer| &answer.question_id == question_id)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.time_remaining == 0
    }

    /// `round(100 * answered / total)`; zero when `total` is zero.
    #[must_use]
    pub fn progress_percentage(&self, total_questions: usize) -> u32 {
        if total_questions == 0 {
            return 0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.answers.len() as f64 / total_questions as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (ratio * 100.0).round() as u32;
        pct
    }

    /// Seconds between start and end, once completed.
    #[must_use]
    pub fn completion_secs(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds().max(0))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn build_session(minutes: u32) -> TestSession {
        TestSession::new(
            SessionId::from_parts(1, "abc"),
            StudentId::new("s1"),
            AssessmentId::new("starters-practice-001"),
            minutes,
            SessionMetadata::default(),
            fixed_now(),
        )
    }

    #[test]
    fn new_session_is_not_started_with_full_clock() {
        let session = build_session(30);
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert_eq!(session.time_remaining(), 1800);
        assert_eq!(session.current_question_index(), 0);
        assert!(session.answers().is_empty());
        assert!(session.end_time().is_none());
    }

    #[test]
    fn start_resets_start_time() {
        let mut session = build_session(30);
        let later = fixed_now() + Duration::minutes(2);
        session.start(later).unwrap();
        assert_eq!(session.status(), SessionStatus::InProgress);
        assert_eq!(session.start_time(), later);
    }

    #[test]
    fn resume_requires_paused() {
        let mut session = build_session(30);
        let err = session.resume().unwrap_err();
        assert_eq!(
            err,
            SessionStateError::InvalidTransition {
                from: SessionStatus::NotStarted,
                action: SessionAction::Resume,
            }
        );
        assert_eq!(session.status(), SessionStatus::NotStarted);
    }

    #[test]
    fn pause_resume_cycle() {
        let mut session = build_session(30);
        session.start(fixed_now()).unwrap();
        assert!(session.start(fixed_now()).is_err());
        session.pause().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        session.resume().unwrap();
        assert_eq!(session.status(), SessionStatus::InProgress);
    }

    #[test]
    fn completed_is_terminal() {
        let mut session = build_session(30);
        assert!(session.complete(fixed_now()).is_err());

        session.start(fixed_now()).unwrap();
        let end = fixed_now() + Duration::minutes(12);
        session.complete(end).unwrap();
        assert_eq!(session.end_time(), Some(end));
        assert_eq!(session.completion_secs(), Some(720));

        for action in [
            SessionAction::Start,
            SessionAction::Pause,
            SessionAction::Resume,
            SessionAction::Complete,
        ] {
            assert_eq!(SessionStatus::Completed.after(action), None);
        }
        assert!(session.complete(end + Duration::minutes(1)).is_err());
        assert_eq!(session.end_time(), Some(end));
    }

    #[test]
    fn paused_session_can_complete() {
        let mut session = build_session(30);
        session.start(fixed_now()).unwrap();
        session.pause().unwrap();
        session.complete(fixed_now()).unwrap();
        assert!(session.status().is_terminal());
    }

    #[test]
    fn answers_are_unique_per_question() {
        let mut session = build_session(30);
        let q1 = QuestionId::new("q1");
        let q2 = QuestionId::new("q2");
        session
            .record_answer(q1.clone(), AnswerResponse::text("a"), 1, fixed_now())
            .unwrap();
        session
            .record_answer(q2.clone(), AnswerResponse::text("b"), 2, fixed_now())
            .unwrap();
        session
            .record_answer(q1.clone(), AnswerResponse::text("c"), 3, fixed_now())
            .unwrap();
        session
            .record_answer(q1.clone(), AnswerResponse::text("d"), 4, fixed_now())
            .unwrap();

        assert_eq!(session.answers().len(), 2);
        let first = session.answer_for(&q1).unwrap();
        assert_eq!(first.attempts, 3);
        assert_eq!(first.response, AnswerResponse::text("d"));
        assert_eq!(first.time_spent, 4);
        assert_eq!(session.answers()[0].question_id, q1);
        assert_eq!(session.answer_for(&q2).unwrap().attempts, 1);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let mut session = build_session(30);
        let q1 = QuestionId::new("q1");
        session
            .record_answer(q1.clone(), AnswerResponse::Number(4.0), 1, fixed_now())
            .unwrap();
        let before = session.clone();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = session
                .record_answer(q1.clone(), AnswerResponse::Number(bad), 2, fixed_now())
                .unwrap_err();
            assert_eq!(err, SessionStateError::NonFiniteAnswer { question: q1.clone() });
        }
        assert_eq!(session, before);
        assert_eq!(session.answer_for(&q1).unwrap().attempts, 1);
    }

    #[test]
    fn navigation_bounds() {
        let mut session = build_session(30);
        assert_eq!(
            session.previous_question(),
            Err(SessionStateError::AtFirstQuestion)
        );
        assert_eq!(session.next_question(), 1);
        assert_eq!(session.previous_question(), Ok(0));

        session.go_to_question(40);
        assert_eq!(session.current_question_index(), 40);

        assert_eq!(
            session.go_to_question_within(3, 3),
            Err(SessionStateError::QuestionOutOfRange { index: 3, total: 3 })
        );
        assert_eq!(session.go_to_question_within(2, 3), Ok(2));
        assert!(session.next_question_within(3).is_err());
        assert_eq!(session.current_question_index(), 2);
    }

    #[test]
    fn time_remaining_floors_at_zero() {
        let mut session = build_session(30);
        session.set_time_remaining(-5);
        assert_eq!(session.time_remaining(), 0);
        assert!(session.is_expired());

        session.set_time_remaining(100);
        assert!(!session.is_expired());
        session.set_time_remaining(-1);
        assert_eq!(session.time_remaining(), 0);
    }

    #[test]
    fn progress_rounds_and_handles_zero_total() {
        let mut session = build_session(30);
        assert_eq!(session.progress_percentage(10), 0);
        for i in 0..3 {
            session.record_answer(
                QuestionId::new(format!("q{i}")),
                AnswerResponse::Number(f64::from(i)),
                1,
                fixed_now(),
            )
            .unwrap();
        }
        assert_eq!(session.progress_percentage(10), 30);
        assert_eq!(session.progress_percentage(7), 43);
        assert_eq!(session.progress_percentage(0), 0);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&SessionStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not-started\"");
    }
}
