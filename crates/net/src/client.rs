//! HTTP client for the TOEFL backend

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use toefl_core::{
    AdminFeedbackPayload, ListeningSectionDraft, MessageResponse, ReadingSectionDraft,
    SectionKind, SectionList, SectionSummaryAdmin, SectionSummaryUser, SpeakingSectionDraft,
    WritingSectionDraft,
};

use crate::error::{Error, Result};
use crate::protocol::{
    AuthResponse, CreatedSection, LoginRequest, RegisterRequest, SubmissionResult, SubmitAnswers,
    UploadFile,
};
use crate::response::decode;

/// Files attached to a new listening section
#[derive(Debug, Clone, Default)]
pub struct ListeningUploads {
    /// Main recording per audio item id
    pub audio: BTreeMap<String, UploadFile>,
    /// Optional picture per audio item id
    pub images: BTreeMap<String, UploadFile>,
    /// Replay snippet per question id
    pub snippets: BTreeMap<String, UploadFile>,
}

/// Client handle for the backend HTTP API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a file served by the backend. Empty input yields an
    /// empty string.
    pub fn file_url(&self, relative: &str) -> String {
        if relative.is_empty() {
            return String::new();
        }
        format!("{}/files/{}", self.base_url, relative.trim_start_matches('/'))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ---- Auth ----

    #[instrument(skip(self, password))]
    pub async fn login_user(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.url("/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let auth: AuthResponse = decode(response).await?;
        info!(user_id = auth.user.id, "Logged in");
        Ok(auth)
    }

    #[instrument(skip(self, password))]
    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.url("/register"))
            .json(&RegisterRequest {
                username,
                email,
                password,
            })
            .send()
            .await?;
        let auth: AuthResponse = decode(response).await?;
        info!(user_id = auth.user.id, "Registered");
        Ok(auth)
    }

    /// Tell the backend the token is no longer in use. Does nothing without a
    /// token.
    #[instrument(skip_all)]
    pub async fn logout_user(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            debug!("No token, skipping logout request");
            return Ok(());
        }
        let response = bearer(self.http.post(self.url("/logout")), Some(token))
            .send()
            .await?;
        let _: Value = decode(response).await?;
        Ok(())
    }

    // ---- Sections ----

    #[instrument(skip(self, token))]
    pub async fn fetch_sections(
        &self,
        kind: SectionKind,
        token: Option<&str>,
    ) -> Result<SectionList> {
        let response = bearer(self.http.get(self.url(&kind.collection_path())), token)
            .send()
            .await?;
        let list: SectionList = decode(response).await?;
        debug!(count = list.sections.len(), total = list.total(), "Fetched sections");
        Ok(list)
    }

    /// Full section content; its shape differs per kind
    #[instrument(skip(self, token))]
    pub async fn fetch_section(
        &self,
        kind: SectionKind,
        id: i64,
        token: Option<&str>,
    ) -> Result<Value> {
        let response = bearer(self.http.get(self.url(&kind.item_path(id))), token)
            .send()
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, answers, token))]
    pub async fn submit_answers<T: Serialize + ?Sized>(
        &self,
        kind: SectionKind,
        id: i64,
        answers: &T,
        token: &str,
    ) -> Result<SubmissionResult> {
        let token = require(token)?;
        let path = format!("{}/submit", kind.item_path(id));
        let response = bearer(self.http.post(self.url(&path)), Some(token))
            .json(&SubmitAnswers { answers })
            .send()
            .await?;
        decode(response).await
    }

    /// Upload speaking recordings keyed by form field name
    #[instrument(skip(self, recordings, token), fields(count = recordings.len()))]
    pub async fn submit_recordings(
        &self,
        id: i64,
        recordings: BTreeMap<String, UploadFile>,
        token: &str,
    ) -> Result<SubmissionResult> {
        let token = require(token)?;
        let mut form = Form::new();
        for (key, file) in recordings {
            form = form.part(key, file_part(file));
        }
        let path = format!("{}/submit", SectionKind::Speaking.item_path(id));
        let response = bearer(self.http.post(self.url(&path)), Some(token))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    // ---- Authoring ----

    #[instrument(skip_all, fields(title = %draft.title))]
    pub async fn create_reading_section(
        &self,
        draft: &ReadingSectionDraft,
        token: &str,
    ) -> Result<CreatedSection> {
        let token = require(token)?;
        let response = bearer(self.http.post(self.url("/reading")), Some(token))
            .json(draft)
            .send()
            .await?;
        created(decode(response).await?)
    }

    #[instrument(skip_all, fields(title = %draft.title))]
    pub async fn create_listening_section(
        &self,
        draft: &ListeningSectionDraft,
        files: ListeningUploads,
        token: &str,
    ) -> Result<CreatedSection> {
        let token = require(token)?;
        let mut form = section_form(draft)?;
        for (item_id, file) in files.audio {
            form = form.part(format!("audioItem_{}_audioFile", item_id), file_part(file));
        }
        for (item_id, file) in files.images {
            form = form.part(format!("audioItem_{}_imageFile", item_id), file_part(file));
        }
        for (question_id, file) in files.snippets {
            form = form.part(format!("question_{}_snippetFile", question_id), file_part(file));
        }

        let response = bearer(self.http.post(self.url("/listening")), Some(token))
            .multipart(form)
            .send()
            .await?;
        created(decode(response).await?)
    }

    /// Audio is only attached for the tasks that play a recording
    #[instrument(skip_all, fields(title = %draft.title))]
    pub async fn create_speaking_section(
        &self,
        draft: &SpeakingSectionDraft,
        task_audio: BTreeMap<u32, UploadFile>,
        token: &str,
    ) -> Result<CreatedSection> {
        let token = require(token)?;
        let mut form = section_form(draft)?;
        for (task_number, file) in task_audio {
            if SpeakingSectionDraft::audio_task_numbers().contains(&task_number) {
                form = form.part(format!("audio_task_{}", task_number), file_part(file));
            } else {
                debug!(task_number, "Ignoring audio for a task without a recording");
            }
        }

        let response = bearer(self.http.post(self.url("/speaking")), Some(token))
            .multipart(form)
            .send()
            .await?;
        created(decode(response).await?)
    }

    #[instrument(skip_all, fields(title = %draft.title))]
    pub async fn create_writing_section(
        &self,
        draft: &WritingSectionDraft,
        task1_audio: Option<UploadFile>,
        token: &str,
    ) -> Result<CreatedSection> {
        let token = require(token)?;
        let mut form = section_form(draft)?;
        if let Some(file) = task1_audio {
            form = form.part("audio_task_1", file_part(file));
        }

        let response = bearer(self.http.post(self.url("/writing")), Some(token))
            .multipart(form)
            .send()
            .await?;
        created(decode(response).await?)
    }

    // ---- Review ----

    #[instrument(skip_all)]
    pub async fn fetch_user_review_summaries(
        &self,
        token: &str,
    ) -> Result<Vec<SectionSummaryUser>> {
        let token = require(token)?;
        let response = bearer(self.http.get(self.url("/review/summaries")), Some(token))
            .send()
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, token))]
    pub async fn fetch_admin_section_summaries(
        &self,
        kind: SectionKind,
        token: &str,
    ) -> Result<Vec<SectionSummaryAdmin>> {
        let token = require(token)?;
        let response = bearer(self.http.get(self.url("/admin/review/summaries")), Some(token))
            .query(&[("type", kind.as_str())])
            .send()
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, payload, token))]
    pub async fn submit_admin_feedback(
        &self,
        kind: SectionKind,
        response_id: i64,
        payload: &AdminFeedbackPayload,
        token: &str,
    ) -> Result<MessageResponse> {
        let token = require(token)?;
        let path = format!("/admin/feedback/{}/{}", kind.as_str(), response_id);
        let response = bearer(self.http.post(self.url(&path)), Some(token))
            .json(payload)
            .send()
            .await?;
        decode(response).await
    }
}

fn bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) if !token.is_empty() => builder.bearer_auth(token),
        _ => builder,
    }
}

fn require(token: &str) -> Result<&str> {
    if token.is_empty() {
        Err(Error::NotAuthenticated)
    } else {
        Ok(token)
    }
}

fn section_form<T: Serialize>(draft: &T) -> Result<Form> {
    let json = serde_json::to_string(draft)
        .map_err(|e| Error::Protocol(format!("Serialization failed: {}", e)))?;
    Ok(Form::new().text("sectionData", json))
}

fn file_part(file: UploadFile) -> Part {
    Part::bytes(file.bytes).file_name(file.file_name)
}

fn created(section: CreatedSection) -> Result<CreatedSection> {
    info!(section_id = section.id, title = %section.title, "Section created");
    Ok(section)
}
