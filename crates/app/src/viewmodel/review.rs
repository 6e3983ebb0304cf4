//! Review pages: a student's completed sections and the admin grading queue

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use toefl_core::{AdminFeedbackPayload, SectionKind, SectionSummaryAdmin, SectionSummaryUser};
use toefl_net::ReviewApi;

use crate::error::{AppError, Result};
use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate};

const LOAD_FAILED: &str = "Failed to load completed tests.";
const ACCESS_DENIED: &str = "Access Denied.";

pub struct ReviewPage {
    session: Arc<SessionHolder>,
    api: Arc<dyn ReviewApi>,
    summaries: Vec<SectionSummaryUser>,
    error: Option<String>,
}

impl ReviewPage {
    pub fn new(session: Arc<SessionHolder>, api: Arc<dyn ReviewApi>) -> Self {
        Self {
            session,
            api,
            summaries: Vec::new(),
            error: None,
        }
    }

    pub async fn load(&mut self) -> Gate {
        let decision = gate(&self.session);
        if decision != Gate::Allow {
            return decision;
        }
        let Some(token) = self.session.token() else {
            return Gate::RedirectToLogin;
        };

        match self.api.fetch_user_review_summaries(&token).await {
            Ok(summaries) => {
                self.summaries = summaries;
                self.error = None;
            }
            Err(e) => {
                warn!(error = %e, "Review summaries fetch failed");
                self.summaries.clear();
                self.error = Some(LOAD_FAILED.to_string());
            }
        }
        Gate::Allow
    }

    pub fn summaries(&self) -> &[SectionSummaryUser] {
        &self.summaries
    }

    pub fn completed(&self, kind: SectionKind) -> impl Iterator<Item = &SectionSummaryUser> {
        self.summaries.iter().filter(move |s| s.section_type == kind)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Sections of one kind with submissions waiting for an admin
pub struct AdminReviewPage {
    kind: SectionKind,
    session: Arc<SessionHolder>,
    api: Arc<dyn ReviewApi>,
    summaries: Vec<SectionSummaryAdmin>,
    error: Option<String>,
}

impl AdminReviewPage {
    pub fn new(kind: SectionKind, session: Arc<SessionHolder>, api: Arc<dyn ReviewApi>) -> Self {
        Self {
            kind,
            session,
            api,
            summaries: Vec::new(),
            error: None,
        }
    }

    /// Signed-in students stay on the page with an access error
    pub async fn load(&mut self) -> Gate {
        let decision = gate(&self.session);
        if decision != Gate::Allow {
            return decision;
        }
        let token = match self.admin_token() {
            Ok(token) => token,
            Err(e) => {
                self.error = Some(e.to_string());
                return Gate::Allow;
            }
        };

        match self.api.fetch_admin_section_summaries(self.kind, &token).await {
            Ok(summaries) => {
                self.summaries = summaries;
                self.error = None;
            }
            Err(e) => {
                error!(kind = %self.kind, error = %e, "Admin summaries fetch failed");
                self.summaries.clear();
                self.error = Some(e.user_message());
            }
        }
        Gate::Allow
    }

    pub fn summaries(&self) -> &[SectionSummaryAdmin] {
        &self.summaries
    }

    /// Submissions across all listed sections
    pub fn pending(&self) -> u32 {
        self.summaries.iter().map(|s| s.student_count).sum()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Grade one response. Input is checked before anything is sent.
    #[instrument(skip(self, feedback), fields(kind = %self.kind))]
    pub async fn submit_feedback(
        &self,
        response_id: i64,
        score: Option<f64>,
        feedback: &str,
    ) -> Result<String> {
        let token = self.admin_token()?;
        let payload = AdminFeedbackPayload {
            score,
            feedback: feedback.to_string(),
        };
        payload.validate(self.kind).map_err(|e| match e {
            toefl_core::Error::InvalidInput(msg) => AppError::Validation(msg),
            other => other.into(),
        })?;

        let reply = self
            .api
            .submit_admin_feedback(self.kind, response_id, &payload, &token)
            .await?;
        info!(response_id, "Feedback submitted");
        Ok(reply.message)
    }

    fn admin_token(&self) -> Result<String> {
        match (self.session.user(), self.session.token()) {
            (Some(user), Some(token)) if user.is_admin() => Ok(token),
            (Some(_), Some(_)) => Err(AppError::Auth(ACCESS_DENIED.to_string())),
            _ => Err(AppError::login_required()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use toefl_core::MessageResponse;
    use toefl_net::{Error as NetError, Result as NetResult};

    use crate::session::tests::{holder_with, signed_in_holder, MockAuth, SharedStore};

    #[derive(Default)]
    struct MockReview {
        broken: bool,
        feedback: Mutex<Vec<(SectionKind, i64, AdminFeedbackPayload)>>,
    }

    #[async_trait]
    impl ReviewApi for MockReview {
        async fn fetch_user_review_summaries(
            &self,
            _token: &str,
        ) -> NetResult<Vec<SectionSummaryUser>> {
            if self.broken {
                return Err(NetError::Api {
                    status: 500,
                    message: "database unavailable".into(),
                });
            }
            Ok(vec![
                SectionSummaryUser {
                    section_id: 1,
                    section_title: "Reading set A".into(),
                    section_type: SectionKind::Reading,
                    completed_at: None,
                },
                SectionSummaryUser {
                    section_id: 7,
                    section_title: "Writing set A".into(),
                    section_type: SectionKind::Writing,
                    completed_at: None,
                },
            ])
        }

        async fn fetch_admin_section_summaries(
            &self,
            kind: SectionKind,
            _token: &str,
        ) -> NetResult<Vec<SectionSummaryAdmin>> {
            Ok(vec![
                SectionSummaryAdmin {
                    section_id: 2,
                    section_title: format!("{} set A", kind.title()),
                    section_type: kind,
                    student_count: 3,
                },
                SectionSummaryAdmin {
                    section_id: 5,
                    section_title: format!("{} set B", kind.title()),
                    section_type: kind,
                    student_count: 1,
                },
            ])
        }

        async fn submit_admin_feedback(
            &self,
            kind: SectionKind,
            response_id: i64,
            payload: &AdminFeedbackPayload,
            _token: &str,
        ) -> NetResult<MessageResponse> {
            self.feedback
                .lock()
                .unwrap()
                .push((kind, response_id, payload.clone()));
            Ok(MessageResponse {
                message: "Feedback saved".into(),
            })
        }
    }

    #[tokio::test]
    async fn student_sees_completed_sections() {
        let session = Arc::new(signed_in_holder("li@example.com").await);
        let mut page = ReviewPage::new(session, Arc::new(MockReview::default()));

        assert_eq!(page.load().await, Gate::Allow);
        assert_eq!(page.summaries().len(), 2);
        assert_eq!(page.completed(SectionKind::Writing).count(), 1);
        assert!(page.error().is_none());
    }

    #[tokio::test]
    async fn review_failure_becomes_message() {
        let session = Arc::new(signed_in_holder("li@example.com").await);
        let api = MockReview {
            broken: true,
            ..Default::default()
        };
        let mut page = ReviewPage::new(session, Arc::new(api));

        assert_eq!(page.load().await, Gate::Allow);
        assert!(page.summaries().is_empty());
        assert_eq!(page.error(), Some(LOAD_FAILED));
    }

    #[tokio::test]
    async fn review_redirects_when_signed_out() {
        let (holder, _) = holder_with(MockAuth::default(), SharedStore::default());
        holder.restore().unwrap();
        let mut page = ReviewPage::new(Arc::new(holder), Arc::new(MockReview::default()));
        assert_eq!(page.load().await, Gate::RedirectToLogin);
    }

    #[tokio::test]
    async fn admin_queue_lists_pending_work() {
        let session = Arc::new(signed_in_holder("admin@example.com").await);
        let mut page =
            AdminReviewPage::new(SectionKind::Speaking, session, Arc::new(MockReview::default()));

        assert_eq!(page.load().await, Gate::Allow);
        assert_eq!(page.summaries().len(), 2);
        assert_eq!(page.pending(), 4);
        assert!(page.error().is_none());
    }

    #[tokio::test]
    async fn students_are_denied_the_admin_queue() {
        let session = Arc::new(signed_in_holder("li@example.com").await);
        let api = Arc::new(MockReview::default());
        let mut page = AdminReviewPage::new(SectionKind::Writing, session, api.clone());

        assert_eq!(page.load().await, Gate::Allow);
        assert!(page.summaries().is_empty());
        assert_eq!(page.error(), Some(ACCESS_DENIED));

        let err = page.submit_feedback(9, Some(4.0), "Good").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert!(api.feedback.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn feedback_is_validated_then_sent() {
        let session = Arc::new(signed_in_holder("admin@example.com").await);
        let api = Arc::new(MockReview::default());
        let page = AdminReviewPage::new(SectionKind::Writing, session, api.clone());

        let err = page.submit_feedback(9, Some(7.0), "Good").await.unwrap_err();
        assert_eq!(err.to_string(), "Score must be between 0 and 5");
        let err = page.submit_feedback(9, None, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(api.feedback.lock().unwrap().is_empty());

        let message = page
            .submit_feedback(9, Some(4.5), "Clear structure")
            .await
            .unwrap();
        assert_eq!(message, "Feedback saved");

        let sent = api.feedback.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SectionKind::Writing);
        assert_eq!(sent[0].1, 9);
        assert_eq!(sent[0].2.score, Some(4.5));
    }
}
