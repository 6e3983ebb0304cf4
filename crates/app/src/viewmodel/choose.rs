//! Section type chooser for authors

use std::sync::Arc;

use toefl_core::SectionKind;

use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionOption {
    pub kind: SectionKind,
    pub title: &'static str,
    pub description: &'static str,
}

impl SectionOption {
    pub fn route(&self) -> Route {
        Route::AddSection(self.kind)
    }
}

const OPTIONS: [SectionOption; 4] = [
    SectionOption {
        kind: SectionKind::Reading,
        title: "Reading Section",
        description: "Create passages with multiple choice, insert text, or prose summary questions.",
    },
    SectionOption {
        kind: SectionKind::Listening,
        title: "Listening Section",
        description: "Create sections with audio clips and various question types (MCQ, Table, etc.).",
    },
    SectionOption {
        kind: SectionKind::Speaking,
        title: "Speaking Section",
        description: "Create prompts for integrated or independent speaking tasks.",
    },
    SectionOption {
        kind: SectionKind::Writing,
        title: "Writing Section",
        description: "Create prompts for integrated or independent writing tasks.",
    },
];

pub struct ChooseSectionTypePage {
    session: Arc<SessionHolder>,
}

impl ChooseSectionTypePage {
    pub fn new(session: Arc<SessionHolder>) -> Self {
        Self { session }
    }

    pub fn open(&self) -> Gate {
        gate(&self.session)
    }

    pub fn options(&self) -> &'static [SectionOption] {
        &OPTIONS
    }

    pub fn select(&self, kind: SectionKind) -> Route {
        Route::AddSection(kind)
    }
}
