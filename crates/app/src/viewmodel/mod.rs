//! Page controllers
//!
//! Each page consults the session before doing anything, then talks to the
//! backend through the collaborator traits and reports where to go next as a
//! [`Route`].

mod auth;
mod authoring;
mod choose;
mod dashboard;
mod review;
mod sections;
mod test_page;

pub use auth::{LoginForm, RegisterForm};
pub use authoring::{AddSectionPage, SectionDraft};
pub use choose::{ChooseSectionTypePage, SectionOption};
pub use dashboard::{DashboardPage, ProgressAction};
pub use review::{AdminReviewPage, ReviewPage};
pub use sections::SectionListPage;
pub use test_page::{TestPage, WordProgress};

#[cfg(test)]
pub(crate) use sections::tests::MockSections;

use std::fmt;

use toefl_core::SectionKind;

use crate::session::SessionHolder;

/// Access decision for a page that needs a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Session still loading; decide later
    Defer,
    RedirectToLogin,
    Allow,
}

pub fn gate(session: &SessionHolder) -> Gate {
    if session.is_loading() {
        Gate::Defer
    } else if session.is_authenticated() {
        Gate::Allow
    } else {
        Gate::RedirectToLogin
    }
}

/// Navigation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    SectionList(SectionKind),
    Intro(SectionKind, i64),
    Section(SectionKind, i64),
    Review,
    AdminReview,
    CreateSection,
    AddSection(SectionKind),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::SectionList(kind) => format!("/{}", kind),
            Route::Intro(kind, id) => format!("/{}-intro/{}", kind, id),
            Route::Section(kind, id) => format!("/{}/{}", kind, id),
            Route::Review => "/review".to_string(),
            Route::AdminReview => "/admin/review".to_string(),
            Route::CreateSection => "/create-section".to_string(),
            Route::AddSection(kind) => format!("/add-{}-section", kind),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
