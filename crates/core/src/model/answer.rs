use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

//
// ─── ANSWER RESPONSE ──────────────────────────────────────────────────────────
//

/// What a student submitted for a question.
///
/// Multi-part questions (drag-drop, fill-in-blank with several gaps) use
/// `Parts`; numeric answers use `Number`; everything else is `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AnswerResponse {
    Text(String),
    Parts(Vec<String>),
    Number(f64),
}

impl AnswerResponse {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn parts<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Parts(values.into_iter().map(Into::into).collect())
    }

    /// A numeric response, or `None` for NaN and infinities.
    #[must_use]
    pub fn number(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self::Number(value))
    }

    /// False for non-finite numbers, which JSON cannot carry.
    #[must_use]
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Number(value) => value.is_finite(),
            Self::Text(_) | Self::Parts(_) => true,
        }
    }

    /// Returns true when this response satisfies `expected`.
    ///
    /// Text is compared trimmed and case-insensitively, parts element-wise,
    /// numbers within `f64::EPSILON`. Different variants never match.
    #[must_use]
    pub fn matches(&self, expected: &AnswerResponse) -> bool {
        match (self, expected) {
            (Self::Text(given), Self::Text(want)) => text_matches(given, want),
            (Self::Parts(given), Self::Parts(want)) => {
                given.len() == want.len()
                    && given.iter().zip(want).all(|(g, w)| text_matches(g, w))
            }
            (Self::Number(given), Self::Number(want)) => (given - want).abs() < f64::EPSILON,
            _ => false,
        }
    }

    /// Returns true if nothing meaningful was submitted.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Parts(values) => values.iter().all(|v| v.trim().is_empty()),
            Self::Number(_) => false,
        }
    }
}

fn text_matches(given: &str, want: &str) -> bool {
    given.trim().to_lowercase() == want.trim().to_lowercase()
}

//
// ─── STUDENT ANSWER ───────────────────────────────────────────────────────────
//

/// The latest submission for one question within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswer {
    pub question_id: QuestionId,
    pub response: AnswerResponse,
    /// Cumulative seconds the caller attributes to this question.
    pub time_spent: u32,
    pub timestamp: DateTime<Utc>,
    /// Left unset by the session; filled in by grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub attempts: u32,
}

impl StudentAnswer {
    #[must_use]
    pub fn first(
        question_id: QuestionId,
        response: AnswerResponse,
        time_spent: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id,
            response,
            time_spent,
            timestamp,
            is_correct: None,
            attempts: 1,
        }
    }

    /// Builds the replacement record for a resubmission of the same question.
    #[must_use]
    pub fn resubmit(
        &self,
        response: AnswerResponse,
        time_spent: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id: self.question_id.clone(),
            response,
            time_spent,
            timestamp,
            is_correct: None,
            attempts: self.attempts.saturating_add(1),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn text_match_ignores_case_and_whitespace() {
        let given = AnswerResponse::text("  yellow ");
        assert!(given.matches(&AnswerResponse::text("Yellow")));
        assert!(!given.matches(&AnswerResponse::text("Blue")));
    }

    #[test]
    fn parts_match_element_wise() {
        let want = AnswerResponse::parts(["cat", "dog"]);
        assert!(AnswerResponse::parts(["Cat", "dog"]).matches(&want));
        assert!(!AnswerResponse::parts(["dog", "cat"]).matches(&want));
        assert!(!AnswerResponse::parts(["cat"]).matches(&want));
    }

    #[test]
    fn variants_never_cross_match() {
        assert!(!AnswerResponse::text("5").matches(&AnswerResponse::Number(5.0)));
        assert!(AnswerResponse::Number(5.0).matches(&AnswerResponse::Number(5.0)));
    }

    #[test]
    fn response_serializes_with_explicit_kind() {
        let json = serde_json::to_string(&AnswerResponse::parts(["a", "b"])).unwrap();
        assert_eq!(json, r#"{"kind":"parts","value":["a","b"]}"#);
    }

    #[test]
    fn resubmit_bumps_attempts() {
        let first = StudentAnswer::first(
            QuestionId::new("q1"),
            AnswerResponse::text("Blue"),
            4,
            fixed_now(),
        );
        let second = first.resubmit(AnswerResponse::text("Yellow"), 9, fixed_now());
        assert_eq!(second.attempts, 2);
        assert_eq!(second.time_spent, 9);
        assert_eq!(second.question_id, first.question_id);
    }

    #[test]
    fn blank_detection() {
        assert!(AnswerResponse::text("  ").is_blank());
        assert!(AnswerResponse::parts(["", " "]).is_blank());
        assert!(!AnswerResponse::Number(0.0).is_blank());
    }

    #[test]
    fn non_finite_numbers_are_not_storable() {
        assert_eq!(AnswerResponse::number(2.5), Some(AnswerResponse::Number(2.5)));
        assert!(AnswerResponse::number(f64::NAN).is_none());
        assert!(AnswerResponse::number(f64::INFINITY).is_none());
        assert!(!AnswerResponse::Number(f64::NEG_INFINITY).is_storable());
        assert!(AnswerResponse::text("NaN").is_storable());
    }
}
