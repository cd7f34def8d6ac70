mod answer;
mod assessment;
mod ids;
mod session;

pub use answer::{AnswerResponse, StudentAnswer};
pub use assessment::{
    Assessment, AssessmentError, Difficulty, Question, QuestionContent, QuestionDraft,
    QuestionError, QuestionMetadata, QuestionType, SkillArea, YleLevel,
};
pub use ids::{AssessmentId, ParseIdError, QuestionId, SessionId, StudentId};
pub use session::{
    AccessibilityFeature, BrowserKind, DeviceClass, SessionAction, SessionMetadata,
    SessionStateError, SessionStatus, TestSession,
};
