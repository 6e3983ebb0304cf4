//! Collaborator traits over the backend
//!
//! The session holder and page controllers depend on these rather than on
//! [`ApiClient`] so tests can substitute in-memory backends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use toefl_core::{
    AdminFeedbackPayload, ListeningSectionDraft, MessageResponse, ReadingSectionDraft,
    SectionKind, SectionList, SectionSummaryAdmin, SectionSummaryUser, SpeakingSectionDraft,
    WritingSectionDraft,
};

use crate::client::{ApiClient, ListeningUploads};
use crate::error::Result;
use crate::protocol::{AuthResponse, CreatedSection, SubmissionResult, UploadFile};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login_user(&self, email: &str, password: &str) -> Result<AuthResponse>;

    async fn register_user(&self, username: &str, email: &str, password: &str)
        -> Result<AuthResponse>;

    /// Invalidate a token server-side. An empty token is a no-op.
    async fn logout_user(&self, token: &str) -> Result<()>;
}

#[async_trait]
pub trait SectionApi: Send + Sync {
    async fn fetch_sections(&self, kind: SectionKind, token: Option<&str>) -> Result<SectionList>;

    async fn fetch_section(&self, kind: SectionKind, id: i64, token: Option<&str>) -> Result<Value>;

    async fn submit_answers(
        &self,
        kind: SectionKind,
        id: i64,
        answers: &Value,
        token: &str,
    ) -> Result<SubmissionResult>;

    /// Speaking answers, one recording per `task{n}Recording` field
    async fn submit_recordings(
        &self,
        id: i64,
        recordings: BTreeMap<String, UploadFile>,
        token: &str,
    ) -> Result<SubmissionResult>;
}

#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn fetch_user_review_summaries(&self, token: &str) -> Result<Vec<SectionSummaryUser>>;

    async fn fetch_admin_section_summaries(
        &self,
        kind: SectionKind,
        token: &str,
    ) -> Result<Vec<SectionSummaryAdmin>>;

    async fn submit_admin_feedback(
        &self,
        kind: SectionKind,
        response_id: i64,
        payload: &AdminFeedbackPayload,
        token: &str,
    ) -> Result<MessageResponse>;
}

#[async_trait]
pub trait AuthoringApi: Send + Sync {
    async fn create_reading_section(
        &self,
        draft: &ReadingSectionDraft,
        token: &str,
    ) -> Result<CreatedSection>;

    async fn create_listening_section(
        &self,
        draft: &ListeningSectionDraft,
        files: ListeningUploads,
        token: &str,
    ) -> Result<CreatedSection>;

    async fn create_speaking_section(
        &self,
        draft: &SpeakingSectionDraft,
        task_audio: BTreeMap<u32, UploadFile>,
        token: &str,
    ) -> Result<CreatedSection>;

    async fn create_writing_section(
        &self,
        draft: &WritingSectionDraft,
        task1_audio: Option<UploadFile>,
        token: &str,
    ) -> Result<CreatedSection>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login_user(&self, email: &str, password: &str) -> Result<AuthResponse> {
        ApiClient::login_user(self, email, password).await
    }

    async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        ApiClient::register_user(self, username, email, password).await
    }

    async fn logout_user(&self, token: &str) -> Result<()> {
        ApiClient::logout_user(self, token).await
    }
}

#[async_trait]
impl SectionApi for ApiClient {
    async fn fetch_sections(&self, kind: SectionKind, token: Option<&str>) -> Result<SectionList> {
        ApiClient::fetch_sections(self, kind, token).await
    }

    async fn fetch_section(&self, kind: SectionKind, id: i64, token: Option<&str>) -> Result<Value> {
        ApiClient::fetch_section(self, kind, id, token).await
    }

    async fn submit_answers(
        &self,
        kind: SectionKind,
        id: i64,
        answers: &Value,
        token: &str,
    ) -> Result<SubmissionResult> {
        ApiClient::submit_answers(self, kind, id, answers, token).await
    }

    async fn submit_recordings(
        &self,
        id: i64,
        recordings: BTreeMap<String, UploadFile>,
        token: &str,
    ) -> Result<SubmissionResult> {
        ApiClient::submit_recordings(self, id, recordings, token).await
    }
}

#[async_trait]
impl ReviewApi for ApiClient {
    async fn fetch_user_review_summaries(&self, token: &str) -> Result<Vec<SectionSummaryUser>> {
        ApiClient::fetch_user_review_summaries(self, token).await
    }

    async fn fetch_admin_section_summaries(
        &self,
        kind: SectionKind,
        token: &str,
    ) -> Result<Vec<SectionSummaryAdmin>> {
        ApiClient::fetch_admin_section_summaries(self, kind, token).await
    }

    async fn submit_admin_feedback(
        &self,
        kind: SectionKind,
        response_id: i64,
        payload: &AdminFeedbackPayload,
        token: &str,
    ) -> Result<MessageResponse> {
        ApiClient::submit_admin_feedback(self, kind, response_id, payload, token).await
    }
}

#[async_trait]
impl AuthoringApi for ApiClient {
    async fn create_reading_section(
        &self,
        draft: &ReadingSectionDraft,
        token: &str,
    ) -> Result<CreatedSection> {
        ApiClient::create_reading_section(self, draft, token).await
    }

    async fn create_listening_section(
        &self,
        draft: &ListeningSectionDraft,
        files: ListeningUploads,
        token: &str,
    ) -> Result<CreatedSection> {
        ApiClient::create_listening_section(self, draft, files, token).await
    }

    async fn create_speaking_section(
        &self,
        draft: &SpeakingSectionDraft,
        task_audio: BTreeMap<u32, UploadFile>,
        token: &str,
    ) -> Result<CreatedSection> {
        ApiClient::create_speaking_section(self, draft, task_audio, token).await
    }

    async fn create_writing_section(
        &self,
        draft: &WritingSectionDraft,
        task1_audio: Option<UploadFile>,
        token: &str,
    ) -> Result<CreatedSection> {
        ApiClient::create_writing_section(self, draft, task1_audio, token).await
    }
}
