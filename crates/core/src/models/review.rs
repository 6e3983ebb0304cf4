//! Review and feedback models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SectionKind;
use crate::error::{Error, Result};

/// A section the student has completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummaryUser {
    pub section_id: i64,
    pub section_title: String,
    pub section_type: SectionKind,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A section with submissions awaiting review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummaryAdmin {
    pub section_id: i64,
    pub section_title: String,
    pub section_type: SectionKind,
    pub student_count: u32,
}

/// Score and comments an admin attaches to a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminFeedbackPayload {
    pub score: Option<f64>,
    pub feedback: String,
}

impl AdminFeedbackPayload {
    /// Highest score an admin may award for a section kind
    pub fn max_score(kind: SectionKind) -> f64 {
        match kind {
            SectionKind::Speaking | SectionKind::Writing => 5.0,
            SectionKind::Reading | SectionKind::Listening => 1.0,
        }
    }

    pub fn validate(&self, kind: SectionKind) -> Result<()> {
        if self.feedback.trim().is_empty() {
            return Err(Error::InvalidInput("Feedback text is required".into()));
        }
        if let Some(score) = self.score {
            let max = Self::max_score(kind);
            if !score.is_finite() || !(0.0..=max).contains(&score) {
                return Err(Error::InvalidInput(format!(
                    "Score must be between 0 and {}",
                    max
                )));
            }
        }
        Ok(())
    }
}

/// Generic acknowledgement body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}
