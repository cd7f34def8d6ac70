use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::model::answer::AnswerResponse;
use crate::model::ids::{AssessmentId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question must be worth at least one point")]
    ZeroPoints,

    #[error("difficulty must be between 1 and 5, got {0}")]
    InvalidDifficulty(u8),

    #[error("{kind} questions need at least two options")]
    MissingOptions { kind: QuestionType },

    #[error("listening questions need an audio reference")]
    MissingAudio,

    #[error("correct answer is not one of the options")]
    AnswerNotInOptions,

    #[error("invalid media reference: {0}")]
    InvalidMedia(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment title cannot be empty")]
    EmptyTitle,

    #[error("time limit must be > 0 minutes")]
    InvalidTimeLimit,

    #[error("passing score must be between 0 and 100, got {0}")]
    InvalidPassingScore(u8),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("question {question} is for {found}, assessment is {expected}")]
    LevelMismatch {
        question: QuestionId,
        expected: YleLevel,
        found: YleLevel,
    },
}

//
// ─── ENUMS ─────────────────────────────────────────────────────────────────────
//

/// Cambridge Young Learners English proficiency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YleLevel {
    Starters,
    Movers,
    Flyers,
}

impl YleLevel {
    pub const ALL: [YleLevel; 3] = [YleLevel::Starters, YleLevel::Movers, YleLevel::Flyers];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            YleLevel::Starters => "starters",
            YleLevel::Movers => "movers",
            YleLevel::Flyers => "flyers",
        }
    }
}

impl fmt::Display for YleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    DragDrop,
    Listening,
    Reading,
    FillInBlank,
}

impl QuestionType {
    fn requires_options(self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::Listening)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::DragDrop => "drag-drop",
            QuestionType::Listening => "listening",
            QuestionType::Reading => "reading",
            QuestionType::FillInBlank => "fill-in-blank",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillArea {
    Listening,
    Reading,
    Vocabulary,
    Grammar,
}

/// Difficulty rating from 1 (easiest) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidDifficulty` outside 1..=5.
    pub fn new(value: u8) -> Result<Self, QuestionError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(QuestionError::InvalidDifficulty(value))
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = QuestionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Content payload shown to the student.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContent {
    pub text: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_text: Option<String>,
}

impl QuestionContent {
    #[must_use]
    pub fn new(text: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_alternative_text(mut self, text: impl Into<String>) -> Self {
        self.alternative_text = Some(text.into());
        self
    }
}

/// Authoring metadata carried with each question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMetadata {
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QuestionMetadata {
    #[must_use]
    pub fn system(at: DateTime<Utc>) -> Self {
        Self {
            created_by: "system".to_owned(),
            created_at: at,
            last_modified: at,
            version: 1,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Fields needed to build a [`Question`]; validated by [`QuestionDraft::validate`].
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub kind: QuestionType,
    pub level: YleLevel,
    pub skill_area: SkillArea,
    pub difficulty: u8,
    pub content: QuestionContent,
    pub correct_answer: AnswerResponse,
    pub points: u32,
    pub time_limit_secs: Option<u32>,
    pub metadata: QuestionMetadata,
}

impl QuestionDraft {
    /// # Errors
    ///
    /// Returns `QuestionError` when the content, scoring, or media references are invalid.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let difficulty = Difficulty::new(self.difficulty)?;

        if self.content.text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if self.points == 0 {
            return Err(QuestionError::ZeroPoints);
        }
        if self.kind.requires_options() && self.content.options.len() < 2 {
            return Err(QuestionError::MissingOptions { kind: self.kind });
        }
        if self.kind == QuestionType::Listening && self.content.audio_url.is_none() {
            return Err(QuestionError::MissingAudio);
        }
        if let Some(audio) = self.content.audio_url.as_deref() {
            validate_media(audio)?;
        }
        if let Some(image) = self.content.image_url.as_deref() {
            validate_media(image)?;
        }
        if !self.content.options.is_empty() {
            if let AnswerResponse::Text(_) = &self.correct_answer {
                let known = self
                    .content
                    .options
                    .iter()
                    .any(|opt| AnswerResponse::text(opt.as_str()).matches(&self.correct_answer));
                if !known {
                    return Err(QuestionError::AnswerNotInOptions);
                }
            }
        }

        Ok(Question {
            id: self.id,
            kind: self.kind,
            level: self.level,
            skill_area: self.skill_area,
            difficulty,
            content: self.content,
            correct_answer: self.correct_answer,
            points: self.points,
            time_limit_secs: self.time_limit_secs,
            metadata: self.metadata,
        })
    }
}

/// Media must be an absolute URL or a root-relative path such as `/audio/x.mp3`.
fn validate_media(raw: &str) -> Result<(), QuestionError> {
    let parsed = if raw.starts_with('/') {
        Url::parse("http://localhost/").and_then(|base| base.join(raw))
    } else {
        Url::parse(raw)
    };
    parsed
        .map(|_| ())
        .map_err(|_| QuestionError::InvalidMedia(raw.to_owned()))
}

/// A single gradable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    id: QuestionId,
    #[serde(rename = "type")]
    kind: QuestionType,
    level: YleLevel,
    skill_area: SkillArea,
    difficulty: Difficulty,
    content: QuestionContent,
    correct_answer: AnswerResponse,
    points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_limit_secs: Option<u32>,
    metadata: QuestionMetadata,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionType {
        self.kind
    }

    #[must_use]
    pub fn level(&self) -> YleLevel {
        self.level
    }

    #[must_use]
    pub fn skill_area(&self) -> SkillArea {
        self.skill_area
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn content(&self) -> &QuestionContent {
        &self.content
    }

    #[must_use]
    pub fn correct_answer(&self) -> &AnswerResponse {
        &self.correct_answer
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn metadata(&self) -> &QuestionMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn is_correct(&self, response: &AnswerResponse) -> bool {
        response.matches(&self.correct_answer)
    }
}

//
// ─── ASSESSMENT ────────────────────────────────────────────────────────────────
//

/// A named, timed collection of questions for one YLE level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    id: AssessmentId,
    title: String,
    description: String,
    level: YleLevel,
    questions: Vec<Question>,
    /// Minutes.
    time_limit: u32,
    /// Percentage needed to pass.
    passing_score: u8,
    instructions: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Assessment {
    /// Create a validated assessment.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError` for an empty title, a zero time limit, a passing
    /// score above 100, duplicate question ids, or questions from another level.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AssessmentId,
        title: impl Into<String>,
        description: impl Into<String>,
        level: YleLevel,
        questions: Vec<Question>,
        time_limit_minutes: u32,
        passing_score: u8,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AssessmentError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(AssessmentError::EmptyTitle);
        }
        if time_limit_minutes == 0 {
            return Err(AssessmentError::InvalidTimeLimit);
        }
        if passing_score > 100 {
            return Err(AssessmentError::InvalidPassingScore(passing_score));
        }

        let mut seen = HashSet::new();
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(AssessmentError::DuplicateQuestion(question.id().clone()));
            }
            if question.level() != level {
                return Err(AssessmentError::LevelMismatch {
                    question: question.id().clone(),
                    expected: level,
                    found: question.level(),
                });
            }
        }

        let instructions = format!(
            "You have {time_limit_minutes} minutes to complete this assessment.\nPassing score: {passing_score}%"
        );

        Ok(Self {
            id,
            title,
            description: description.into(),
            level,
            questions,
            time_limit: time_limit_minutes,
            passing_score,
            instructions,
            created_at,
            updated_at: created_at,
        })
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn level(&self) -> YleLevel {
        self.level
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn question_by_id(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit.saturating_mul(60)
    }

    #[must_use]
    pub fn passing_score(&self) -> u8 {
        self.passing_score
    }

    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(Question::points).sum()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
