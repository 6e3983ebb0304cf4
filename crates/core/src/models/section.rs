//! Test section model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The four parts of the exam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Reading,
    Listening,
    Speaking,
    Writing,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Reading,
        SectionKind::Listening,
        SectionKind::Speaking,
        SectionKind::Writing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Reading => "reading",
            SectionKind::Listening => "listening",
            SectionKind::Speaking => "speaking",
            SectionKind::Writing => "writing",
        }
    }

    /// Endpoint listing every section of this kind (`/readings`, ...)
    pub fn collection_path(self) -> String {
        format!("/{}s", self.as_str())
    }

    /// Endpoint for a single section (`/reading/3`, ...)
    pub fn item_path(self, id: i64) -> String {
        format!("/{}/{}", self.as_str(), id)
    }

    /// Human-readable title used in headings
    pub fn title(self) -> &'static str {
        match self {
            SectionKind::Reading => "Reading",
            SectionKind::Listening => "Listening",
            SectionKind::Speaking => "Speaking",
            SectionKind::Writing => "Writing",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" => Ok(SectionKind::Reading),
            "listening" => Ok(SectionKind::Listening),
            "speaking" => Ok(SectionKind::Speaking),
            "writing" => Ok(SectionKind::Writing),
            other => Err(Error::InvalidInput(format!("Unknown section type: {}", other))),
        }
    }
}

/// A section as shown in selection lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub id: i64,
    pub title: String,
}

/// Response of the section listing endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionList {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    pub sections: Vec<SectionSummary>,
}

impl SectionList {
    pub fn new(sections: Vec<SectionSummary>) -> Self {
        Self {
            total: Some(sections.len()),
            sections,
        }
    }

    /// Count reported by the backend, falling back to the list length
    pub fn total(&self) -> usize {
        self.total.unwrap_or(self.sections.len())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
