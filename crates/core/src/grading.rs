//! Simple percentage grading of a session against its assessment.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{
    Assessment, AssessmentId, QuestionId, SessionId, SkillArea, StudentId, TestSession,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradingError {
    #[error("session is for assessment {session}, not {assessment}")]
    AssessmentMismatch {
        session: AssessmentId,
        assessment: AssessmentId,
    },
}

/// Correctness of one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub attempts: u32,
}

/// Score within one skill area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillScore {
    pub skill: SkillArea,
    pub score: u32,
    pub max_score: u32,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentResult {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub assessment_id: AssessmentId,
    pub answers: Vec<GradedAnswer>,
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: u32,
    pub passed: bool,
    pub skill_breakdown: Vec<SkillScore>,
    pub completion_secs: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn percentage(score: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    let pct = (f64::from(score) * 100.0 / f64::from(max)).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = pct as u32;
    pct
}

/// Grade `session` against `assessment` without mutating either.
///
/// Answers for questions the assessment does not contain are ignored.
///
/// # Errors
///
/// Returns `GradingError::AssessmentMismatch` if the session belongs to another assessment.
pub fn grade_session(
    session: &TestSession,
    assessment: &Assessment,
) -> Result<AssessmentResult, GradingError> {
    if session.assessment_id() != assessment.id() {
        return Err(GradingError::AssessmentMismatch {
            session: session.assessment_id().clone(),
            assessment: assessment.id().clone(),
        });
    }

    let mut skills: BTreeMap<SkillArea, SkillScore> = BTreeMap::new();
    for question in assessment.questions() {
        let entry = skills
            .entry(question.skill_area())
            .or_insert_with(|| SkillScore {
                skill: question.skill_area(),
                score: 0,
                max_score: 0,
                questions_answered: 0,
                correct_answers: 0,
                percentage: 0,
            });
        entry.max_score = entry.max_score.saturating_add(question.points());
    }

    let mut answers = Vec::with_capacity(session.answers().len());
    let mut total_score = 0_u32;
    for answer in session.answers() {
        let Some(question) = assessment.question_by_id(&answer.question_id) else {
            continue;
        };
        let is_correct = question.is_correct(&answer.response);
        let points_awarded = if is_correct { question.points() } else { 0 };
        total_score = total_score.saturating_add(points_awarded);

        if let Some(skill) = skills.get_mut(&question.skill_area()) {
            skill.questions_answered += 1;
            if is_correct {
                skill.correct_answers += 1;
                skill.score = skill.score.saturating_add(points_awarded);
            }
        }

        answers.push(GradedAnswer {
            question_id: answer.question_id.clone(),
            is_correct,
            points_awarded,
            attempts: answer.attempts,
        });
    }

    let skill_breakdown = skills
        .into_values()
        .map(|mut skill| {
            skill.percentage = percentage(skill.score, skill.max_score);
            skill
        })
        .collect();

    let max_score = assessment.total_points();
    let pct = percentage(total_score, max_score);

    Ok(AssessmentResult {
        session_id: session.id().clone(),
        student_id: session.student_id().clone(),
        assessment_id: assessment.id().clone(),
        answers,
        total_score,
        max_score,
        percentage: pct,
        passed: pct >= u32::from(assessment.passing_score()),
        skill_breakdown,
        completion_secs: session.completion_secs(),
        completed_at: session.end_time(),
    })
}
