//! Section list page

use std::sync::Arc;

use tracing::error;

use toefl_core::{SectionKind, SectionSummary};
use toefl_net::SectionApi;

use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate, Route};

pub struct SectionListPage {
    kind: SectionKind,
    session: Arc<SessionHolder>,
    api: Arc<dyn SectionApi>,
    sections: Vec<SectionSummary>,
    error: Option<String>,
}

impl SectionListPage {
    pub fn new(kind: SectionKind, session: Arc<SessionHolder>, api: Arc<dyn SectionApi>) -> Self {
        Self {
            kind,
            session,
            api,
            sections: Vec::new(),
            error: None,
        }
    }

    /// Gate, then fetch. A failed fetch leaves an empty list and a message.
    pub async fn load(&mut self) -> Gate {
        let decision = gate(&self.session);
        if decision != Gate::Allow {
            return decision;
        }

        let token = self.session.token();
        match self.api.fetch_sections(self.kind, token.as_deref()).await {
            Ok(list) => {
                self.sections = list.sections;
                self.error = None;
            }
            Err(e) => {
                error!(kind = %self.kind, error = %e, "Failed to load sections");
                self.sections.clear();
                self.error = Some(format!(
                    "Failed to load {} sections. Please try again later.",
                    self.kind
                ));
            }
        }
        Gate::Allow
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn sections(&self) -> &[SectionSummary] {
        &self.sections
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn start(&self, section_id: i64) -> Route {
        Route::Intro(self.kind, section_id)
    }
}
