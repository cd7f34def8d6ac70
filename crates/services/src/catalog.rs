//! Source of assessments for the session layer.

use std::collections::HashSet;

use yle_core::model::{Assessment, AssessmentId, YleLevel};

use crate::error::CatalogError;

/// Read access to the assessments a student can take.
pub trait AssessmentProvider: Send + Sync {
    fn assessment(&self, id: &AssessmentId) -> Option<&Assessment>;

    /// All assessments in catalog order.
    fn assessments(&self) -> Vec<&Assessment>;

    fn by_level(&self, level: YleLevel) -> Vec<&Assessment> {
        self.assessments()
            .into_iter()
            .filter(|assessment| assessment.level() == level)
            .collect()
    }
}

/// Fixed list of assessments held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    assessments: Vec<Assessment>,
}

impl InMemoryCatalog {
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateAssessment` if two assessments share an id.
    pub fn new(assessments: Vec<Assessment>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for assessment in &assessments {
            if !seen.insert(assessment.id()) {
                return Err(CatalogError::DuplicateAssessment(assessment.id().clone()));
            }
        }
        Ok(Self { assessments })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }
}

impl AssessmentProvider for InMemoryCatalog {
    fn assessment(&self, id: &AssessmentId) -> Option<&Assessment> {
        self.assessments.iter().find(|assessment| assessment.id() == id)
    }

    fn assessments(&self) -> Vec<&Assessment> {
        self.assessments.iter().collect()
    }
}
