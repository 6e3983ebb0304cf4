//! Section authoring for admins
//!
//! A draft is read from JSON plus named files, checked locally and then
//! uploaded through the endpoint of its kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use toefl_core::{
    ListeningSectionDraft, ReadingSectionDraft, SectionKind, SpeakingSectionDraft,
    WritingSectionDraft,
};
use toefl_net::{AuthoringApi, CreatedSection, ListeningUploads, UploadFile};

use crate::error::{AppError, Result};
use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate};

/// A new section ready to upload, with the files its kind accepts
#[derive(Debug, Clone)]
pub enum SectionDraft {
    Reading(ReadingSectionDraft),
    Listening {
        draft: ListeningSectionDraft,
        files: ListeningUploads,
    },
    Speaking {
        draft: SpeakingSectionDraft,
        task_audio: BTreeMap<u32, UploadFile>,
    },
    Writing {
        draft: WritingSectionDraft,
        task1_audio: Option<UploadFile>,
    },
}

impl SectionDraft {
    /// Build a draft from its JSON form and `(field, file)` pairs.
    ///
    /// Listening fields are `audio:<item>`, `image:<item>` and
    /// `snippet:<question>`. Speaking takes `task<n>`, writing only `task1`.
    pub fn from_parts(
        kind: SectionKind,
        json: &str,
        files: Vec<(String, UploadFile)>,
    ) -> Result<Self> {
        let bad_json = |e: serde_json::Error| {
            AppError::Validation(format!("Invalid {} section draft: {}", kind, e))
        };
        let unexpected =
            |field: &str| AppError::Validation(format!("Unexpected file field '{}'", field));

        match kind {
            SectionKind::Reading => {
                if let Some((field, _)) = files.first() {
                    return Err(unexpected(field.as_str()));
                }
                Ok(SectionDraft::Reading(
                    serde_json::from_str(json).map_err(bad_json)?,
                ))
            }
            SectionKind::Listening => {
                let draft = serde_json::from_str(json).map_err(bad_json)?;
                let mut uploads = ListeningUploads::default();
                for (field, file) in files {
                    let (slot, id) = match field.split_once(':') {
                        Some(("audio", id)) => (&mut uploads.audio, id),
                        Some(("image", id)) => (&mut uploads.images, id),
                        Some(("snippet", id)) => (&mut uploads.snippets, id),
                        _ => return Err(unexpected(field.as_str())),
                    };
                    slot.insert(id.to_string(), file);
                }
                Ok(SectionDraft::Listening {
                    draft,
                    files: uploads,
                })
            }
            SectionKind::Speaking => {
                let draft = serde_json::from_str(json).map_err(bad_json)?;
                let mut task_audio = BTreeMap::new();
                for (field, file) in files {
                    let number = field
                        .strip_prefix("task")
                        .and_then(|n| n.parse::<u32>().ok())
                        .ok_or_else(|| unexpected(field.as_str()))?;
                    task_audio.insert(number, file);
                }
                Ok(SectionDraft::Speaking { draft, task_audio })
            }
            SectionKind::Writing => {
                let draft = serde_json::from_str(json).map_err(bad_json)?;
                let mut task1_audio = None;
                for (field, file) in files {
                    if field != "task1" {
                        return Err(unexpected(field.as_str()));
                    }
                    task1_audio = Some(file);
                }
                Ok(SectionDraft::Writing { draft, task1_audio })
            }
        }
    }

    pub fn kind(&self) -> SectionKind {
        match self {
            SectionDraft::Reading(_) => SectionKind::Reading,
            SectionDraft::Listening { .. } => SectionKind::Listening,
            SectionDraft::Speaking { .. } => SectionKind::Speaking,
            SectionDraft::Writing { .. } => SectionKind::Writing,
        }
    }

    fn validate(&self) -> Result<()> {
        let checked = match self {
            SectionDraft::Reading(draft) => draft.validate(),
            SectionDraft::Listening { draft, .. } => draft.validate(),
            SectionDraft::Speaking { draft, .. } => draft.validate(),
            SectionDraft::Writing { draft, .. } => draft.validate(),
        };
        checked.map_err(|e| match e {
            toefl_core::Error::InvalidInput(msg) => AppError::Validation(msg),
            other => other.into(),
        })?;

        if let SectionDraft::Listening { draft, files } = self {
            if let Some(item) = draft
                .audio_items
                .iter()
                .find(|item| !files.audio.contains_key(&item.id))
            {
                return Err(AppError::Validation(format!(
                    "Audio file is required for '{}'",
                    item.title
                )));
            }
        }
        Ok(())
    }
}

/// Form page for one section kind
pub struct AddSectionPage {
    kind: SectionKind,
    session: Arc<SessionHolder>,
    api: Arc<dyn AuthoringApi>,
}

impl AddSectionPage {
    pub fn new(kind: SectionKind, session: Arc<SessionHolder>, api: Arc<dyn AuthoringApi>) -> Self {
        Self { kind, session, api }
    }

    pub fn open(&self) -> Gate {
        gate(&self.session)
    }

    #[instrument(skip(self, draft), fields(kind = %self.kind))]
    pub async fn submit(&self, draft: SectionDraft) -> Result<CreatedSection> {
        let token = match (self.session.user(), self.session.token()) {
            (Some(user), Some(token)) if user.is_admin() => token,
            (Some(_), Some(_)) => {
                return Err(AppError::Auth("Only admins can create sections.".into()))
            }
            _ => return Err(AppError::login_required()),
        };
        if draft.kind() != self.kind {
            return Err(AppError::Validation(format!(
                "Expected a {} section draft",
                self.kind
            )));
        }
        draft.validate()?;

        let created = match draft {
            SectionDraft::Reading(draft) => self.api.create_reading_section(&draft, &token).await?,
            SectionDraft::Listening { draft, files } => {
                self.api
                    .create_listening_section(&draft, files, &token)
                    .await?
            }
            SectionDraft::Speaking { draft, task_audio } => {
                self.api
                    .create_speaking_section(&draft, task_audio, &token)
                    .await?
            }
            SectionDraft::Writing { draft, task1_audio } => {
                self.api
                    .create_writing_section(&draft, task1_audio, &token)
                    .await?
            }
        };
        info!(section_id = created.id, title = %created.title, "Section created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use toefl_net::Result as NetResult;

    use crate::session::tests::signed_in_holder;

    /// Records which endpoint received what
    #[derive(Default)]
    struct MockAuthoring {
        created: Mutex<Vec<(SectionKind, String, Vec<String>)>>,
    }

    impl MockAuthoring {
        fn record(&self, kind: SectionKind, title: &str, files: Vec<String>) -> CreatedSection {
            let mut created = self.created.lock().unwrap();
            created.push((kind, title.to_string(), files));
            CreatedSection {
                id: created.len() as i64,
                title: title.to_string(),
            }
        }
    }

    #[async_trait]
    impl AuthoringApi for MockAuthoring {
        async fn create_reading_section(
            &self,
            draft: &ReadingSectionDraft,
            _token: &str,
        ) -> NetResult<CreatedSection> {
            Ok(self.record(SectionKind::Reading, &draft.title, Vec::new()))
        }

        async fn create_listening_section(
            &self,
            draft: &ListeningSectionDraft,
            files: ListeningUploads,
            _token: &str,
        ) -> NetResult<CreatedSection> {
            let names = files
                .audio
                .keys()
                .map(|id| format!("audio:{}", id))
                .chain(files.images.keys().map(|id| format!("image:{}", id)))
                .chain(files.snippets.keys().map(|id| format!("snippet:{}", id)))
                .collect();
            Ok(self.record(SectionKind::Listening, &draft.title, names))
        }

        async fn create_speaking_section(
            &self,
            draft: &SpeakingSectionDraft,
            task_audio: BTreeMap<u32, UploadFile>,
            _token: &str,
        ) -> NetResult<CreatedSection> {
            let names = task_audio.keys().map(|n| format!("task{}", n)).collect();
            Ok(self.record(SectionKind::Speaking, &draft.title, names))
        }

        async fn create_writing_section(
            &self,
            draft: &WritingSectionDraft,
            task1_audio: Option<UploadFile>,
            _token: &str,
        ) -> NetResult<CreatedSection> {
            let names = task1_audio.map(|_| "task1".to_string()).into_iter().collect();
            Ok(self.record(SectionKind::Writing, &draft.title, names))
        }
    }

    const LISTENING: &str = r#"{
        "title": "Campus life",
        "audioItems": [{"id": "a1", "title": "Library tour", "questions": []}]
    }"#;

    const SPEAKING: &str = r#"{
        "title": "Speaking set C",
        "tasks": [
            {"task_number": 1, "prompt": "Describe a place"},
            {"task_number": 2, "passage": "Notice", "prompt": "Summarize"}
        ]
    }"#;

    fn file(name: &str) -> UploadFile {
        UploadFile::new(name, vec![0, 1, 2])
    }

    #[test]
    fn listening_files_are_sorted_by_field() {
        let draft = SectionDraft::from_parts(
            SectionKind::Listening,
            LISTENING,
            vec![
                ("audio:a1".into(), file("tour.mp3")),
                ("image:a1".into(), file("map.png")),
                ("snippet:q3".into(), file("clip.mp3")),
            ],
        )
        .unwrap();

        let SectionDraft::Listening { files, .. } = draft else {
            panic!("expected a listening draft");
        };
        assert!(files.audio.contains_key("a1"));
        assert!(files.images.contains_key("a1"));
        assert!(files.snippets.contains_key("q3"));
    }

    #[test]
    fn unknown_file_fields_are_rejected() {
        let err = SectionDraft::from_parts(
            SectionKind::Writing,
            r#"{"title": "W", "tasks": []}"#,
            vec![("task2".into(), file("x.mp3"))],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unexpected file field 'task2'");

        let err = SectionDraft::from_parts(SectionKind::Reading, "{", Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn admin_creates_speaking_section() {
        let session = Arc::new(signed_in_holder("admin@example.com").await);
        let api = Arc::new(MockAuthoring::default());
        let page = AddSectionPage::new(SectionKind::Speaking, session, api.clone());
        assert_eq!(page.open(), Gate::Allow);

        let draft = SectionDraft::from_parts(
            SectionKind::Speaking,
            SPEAKING,
            vec![("task2".into(), file("notice.mp3"))],
        )
        .unwrap();
        let created = page.submit(draft).await.unwrap();
        assert_eq!(created.title, "Speaking set C");

        let calls = api.created.lock().unwrap();
        assert_eq!(
            calls[0],
            (SectionKind::Speaking, "Speaking set C".to_string(), vec!["task2".to_string()])
        );
    }

    #[tokio::test]
    async fn listening_needs_audio_for_every_item() {
        let session = Arc::new(signed_in_holder("admin@example.com").await);
        let api = Arc::new(MockAuthoring::default());
        let page = AddSectionPage::new(SectionKind::Listening, session, api.clone());

        let draft = SectionDraft::from_parts(SectionKind::Listening, LISTENING, Vec::new()).unwrap();
        let err = page.submit(draft).await.unwrap_err();
        assert_eq!(err.to_string(), "Audio file is required for 'Library tour'");
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drafts_are_checked_before_upload() {
        let session = Arc::new(signed_in_holder("admin@example.com").await);
        let api = Arc::new(MockAuthoring::default());
        let page = AddSectionPage::new(SectionKind::Writing, session, api.clone());

        let empty = SectionDraft::from_parts(
            SectionKind::Writing,
            r#"{"title": "Writing set D", "tasks": []}"#,
            Vec::new(),
        )
        .unwrap();
        assert!(matches!(page.submit(empty).await, Err(AppError::Validation(_))));

        let speaking = SectionDraft::from_parts(SectionKind::Speaking, SPEAKING, Vec::new()).unwrap();
        assert!(matches!(page.submit(speaking).await, Err(AppError::Validation(_))));
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn students_cannot_create_sections() {
        let session = Arc::new(signed_in_holder("li@example.com").await);
        let api = Arc::new(MockAuthoring::default());
        let page = AddSectionPage::new(SectionKind::Reading, session, api.clone());

        let draft = SectionDraft::from_parts(
            SectionKind::Reading,
            r#"{"title": "R", "passages": [{"title": "P", "text": "T"}]}"#,
            Vec::new(),
        )
        .unwrap();
        assert!(matches!(page.submit(draft).await, Err(AppError::Auth(_))));
        assert!(api.created.lock().unwrap().is_empty());
    }
}
