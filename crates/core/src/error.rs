use thiserror::Error;

use crate::grading::GradingError;
use crate::model::{AssessmentError, QuestionError, SessionStateError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Grading(#[from] GradingError),
}
