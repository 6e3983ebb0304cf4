//! Dashboard page

use std::sync::Arc;

use tracing::{error, warn};

use toefl_core::{SectionKind, SectionList};
use toefl_net::SectionApi;

use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate, Route};

const LOAD_FAILED: &str = "Failed to load test sections. Please try again later.";
const PROGRESS_UNAVAILABLE: &str = "Progress report view is not available yet.";

/// Outcome of the progress button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressAction {
    Navigate(Route),
    Notice(&'static str),
}

pub struct DashboardPage {
    session: Arc<SessionHolder>,
    api: Arc<dyn SectionApi>,
    sections: Vec<(SectionKind, SectionList)>,
    error: Option<String>,
}

impl DashboardPage {
    pub fn new(session: Arc<SessionHolder>, api: Arc<dyn SectionApi>) -> Self {
        Self {
            session,
            api,
            sections: Vec::new(),
            error: None,
        }
    }

    /// Fetch every kind at once. Kinds that fail are left out and reported
    /// with a single message.
    pub async fn load(&mut self) -> Gate {
        let decision = gate(&self.session);
        if decision != Gate::Allow {
            return decision;
        }

        let token = self.session.token();
        let token = token.as_deref();
        let api = &self.api;
        let (reading, listening, speaking, writing) = tokio::join!(
            api.fetch_sections(SectionKind::Reading, token),
            api.fetch_sections(SectionKind::Listening, token),
            api.fetch_sections(SectionKind::Speaking, token),
            api.fetch_sections(SectionKind::Writing, token),
        );

        self.sections.clear();
        let mut failed = 0;
        for (kind, result) in SectionKind::ALL
            .into_iter()
            .zip([reading, listening, speaking, writing])
        {
            match result {
                Ok(list) => self.sections.push((kind, list)),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Section fetch failed");
                    failed += 1;
                }
            }
        }

        self.error = if failed > 0 {
            error!(failed, "Dashboard loaded partially");
            Some(LOAD_FAILED.to_string())
        } else {
            None
        };
        Gate::Allow
    }

    pub fn sections(&self, kind: SectionKind) -> Option<&SectionList> {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, list)| list)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn start(&self, kind: SectionKind, section_id: i64) -> Route {
        Route::Section(kind, section_id)
    }

    /// Admins go to authoring; students get a notice for now
    pub fn progress_action(&self) -> ProgressAction {
        match self.session.user() {
            Some(user) if user.is_admin() => ProgressAction::Navigate(Route::CreateSection),
            _ => ProgressAction::Notice(PROGRESS_UNAVAILABLE),
        }
    }
}
