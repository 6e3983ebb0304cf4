//! Test-taking page
//!
//! Holds the section content, the answers given so far, the countdown and one
//! audio widget per recording. Reading and listening run one countdown for
//! the whole section. Writing runs one per task and moves on when it expires.
//! Speaking walks each task through its phases, timing the ones that have a
//! limit, and collects one recording per task.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, Notify};
use tracing::{info, instrument};

use toefl_core::exam::{
    recommended_word_count, section_time_limit, section_tasks, word_count, writing_time_limit,
    PhaseLimit, SectionTask, SpeakingPhase, SpeakingTaskFlow,
};
use toefl_core::{AudioPlayer, MediaElement, MediaEvent, SectionKind};
use toefl_net::{SectionApi, SubmissionResult, UploadFile};

use crate::error::{AppError, Result};
use crate::session::SessionHolder;
use crate::viewmodel::{gate, Gate};
use crate::widgets::{MediaWidget, TimerSnapshot, TimerWidget};

/// Length of a writing response against the task's recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordProgress {
    pub words: usize,
    pub recommended: usize,
}

impl WordProgress {
    pub fn is_short(&self) -> bool {
        self.words < self.recommended
    }
}

pub struct TestPage<E: MediaElement> {
    kind: SectionKind,
    section_id: i64,
    session: Arc<SessionHolder>,
    api: Arc<dyn SectionApi>,
    content: Option<Value>,
    tasks: Vec<SectionTask>,
    task_index: usize,
    speaking: Option<SpeakingTaskFlow>,
    answers: Map<String, Value>,
    recordings: BTreeMap<String, UploadFile>,
    timer: Option<TimerWidget>,
    /// Fired by the current timer only
    expired: Arc<Notify>,
    players: Vec<MediaWidget<E>>,
    submitted: bool,
}

impl<E: MediaElement + Send + 'static> TestPage<E> {
    /// Open a section for a signed-in student and start its countdown when
    /// the section is timed as a whole.
    pub fn start(
        kind: SectionKind,
        section_id: i64,
        session: Arc<SessionHolder>,
        api: Arc<dyn SectionApi>,
    ) -> Result<Self> {
        if gate(&session) != Gate::Allow {
            return Err(AppError::login_required());
        }

        let mut page = Self {
            kind,
            section_id,
            session,
            api,
            content: None,
            tasks: Vec::new(),
            task_index: 0,
            speaking: None,
            answers: Map::new(),
            recordings: BTreeMap::new(),
            timer: None,
            expired: Arc::new(Notify::new()),
            players: Vec::new(),
            submitted: false,
        };
        if let Some(limit) = section_time_limit(kind) {
            page.set_time_limit(limit);
        }
        Ok(page)
    }

    /// Replace the countdown. An expiry of the previous one no longer counts.
    pub fn set_time_limit(&mut self, seconds: u64) {
        let expired = Arc::new(Notify::new());
        self.expired = expired.clone();
        let initial = i64::try_from(seconds).unwrap_or(i64::MAX);
        // Dropping the previous widget stops its task
        self.timer = Some(TimerWidget::spawn(initial, true, move || {
            expired.notify_one()
        }));
    }

    #[instrument(skip(self), fields(kind = %self.kind, section_id = self.section_id))]
    pub async fn load(&mut self) -> Result<&Value> {
        let token = self.session.token();
        let content = self
            .api
            .fetch_section(self.kind, self.section_id, token.as_deref())
            .await?;

        if matches!(self.kind, SectionKind::Writing | SectionKind::Speaking) {
            self.tasks = section_tasks(&content);
            if !self.tasks.is_empty() {
                self.begin_task(0);
            }
        }
        let content: &Value = self.content.insert(content);
        Ok(content)
    }

    pub fn tasks(&self) -> &[SectionTask] {
        &self.tasks
    }

    pub fn current_task(&self) -> Option<&SectionTask> {
        self.tasks.get(self.task_index)
    }

    /// Move to the following task. Returns false on the last one.
    pub fn next_task(&mut self) -> bool {
        if self.task_index + 1 >= self.tasks.len() {
            return false;
        }
        self.begin_task(self.task_index + 1);
        true
    }

    fn begin_task(&mut self, index: usize) {
        self.task_index = index;
        let Some(task) = self.tasks.get(index) else {
            return;
        };
        let (number, has_audio) = (task.task_number, task.has_audio());
        match self.kind {
            SectionKind::Writing => self.set_time_limit(writing_time_limit(number)),
            SectionKind::Speaking => {
                self.speaking = Some(SpeakingTaskFlow::new(number, has_audio));
                self.apply_phase_limit();
            }
            SectionKind::Reading | SectionKind::Listening => {}
        }
        info!(task_number = number, "Task started");
    }

    /// Store the response to a writing task
    pub fn write_response(
        &mut self,
        task_number: u32,
        text: impl Into<String>,
    ) -> Result<WordProgress> {
        if self.kind != SectionKind::Writing {
            return Err(AppError::Validation("Only writing tasks take a typed response".into()));
        }
        let key = self
            .tasks
            .iter()
            .find(|t| t.task_number == task_number)
            .map(SectionTask::answer_key)
            .ok_or_else(|| AppError::Validation(format!("No writing task {}", task_number)))?;

        let text = text.into();
        let progress = WordProgress {
            words: word_count(&text),
            recommended: recommended_word_count(task_number),
        };
        self.answers.insert(key, Value::String(text));
        Ok(progress)
    }

    pub fn speaking_phase(&self) -> Option<SpeakingPhase> {
        self.speaking.as_ref().map(SpeakingTaskFlow::phase)
    }

    /// Step the current speaking task forward, e.g. when its audio ends
    pub fn advance_phase(&mut self) -> Option<SpeakingPhase> {
        let phase = self.speaking.as_mut().map(SpeakingTaskFlow::advance);
        self.apply_phase_limit();
        phase
    }

    fn apply_phase_limit(&mut self) {
        match self.speaking.as_ref().map(SpeakingTaskFlow::limit) {
            Some(PhaseLimit::Timed(seconds)) => self.set_time_limit(seconds),
            _ => self.timer = None,
        }
    }

    /// Let timed speaking phases run out one after another. Returns the
    /// first phase that waits on something other than the clock.
    pub async fn run_timed_phases(&mut self) -> Result<SpeakingPhase> {
        loop {
            let flow = self
                .speaking
                .as_ref()
                .ok_or_else(|| AppError::Validation("No speaking task is open".into()))?;
            if !matches!(flow.limit(), PhaseLimit::Timed(_)) {
                return Ok(flow.phase());
            }
            let expired = self.expired.clone();
            expired.notified().await;
            self.advance_phase();
        }
    }

    /// Keep the recording of the current speaking task
    pub fn record(&mut self, file: UploadFile) -> Result<()> {
        if self.kind != SectionKind::Speaking {
            return Err(AppError::Validation("Only speaking tasks take a recording".into()));
        }
        let key = self
            .current_task()
            .map(SectionTask::recording_key)
            .ok_or_else(|| AppError::Validation("No speaking task is open".into()))?;
        self.recordings.insert(key, file);
        Ok(())
    }

    /// Attach a recording. Returns its index for [`TestPage::player`].
    pub fn attach_audio(
        &mut self,
        player: AudioPlayer<E>,
        events: mpsc::Receiver<MediaEvent>,
    ) -> usize {
        self.players.push(MediaWidget::attach(player, events));
        self.players.len() - 1
    }

    pub fn player(&self, index: usize) -> Option<&MediaWidget<E>> {
        self.players.get(index)
    }

    pub fn answer(&mut self, question: impl Into<String>, value: Value) {
        self.answers.insert(question.into(), value);
    }

    pub fn remaining(&self) -> Option<TimerSnapshot> {
        self.timer.as_ref().map(TimerWidget::snapshot)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Wait for the countdown to run out, then submit. A writing task that
    /// runs out moves on to the next task and only the last one submits.
    pub async fn run_until_expired(&mut self) -> Result<SubmissionResult> {
        if self.kind == SectionKind::Speaking {
            return Err(AppError::Validation(
                "Speaking tasks advance phase by phase".into(),
            ));
        }
        loop {
            if self.timer.is_none() {
                return Err(AppError::Validation("This section has no time limit".into()));
            }
            let expired = self.expired.clone();
            expired.notified().await;
            if self.kind == SectionKind::Writing && self.next_task() {
                info!(section_id = self.section_id, "Time is up, moving to the next task");
                continue;
            }
            break;
        }
        info!(kind = %self.kind, section_id = self.section_id, "Time is up, submitting answers");
        self.submit().await
    }

    /// Stop the clock and audio and send the answers once
    #[instrument(skip(self), fields(kind = %self.kind, section_id = self.section_id))]
    pub async fn submit(&mut self) -> Result<SubmissionResult> {
        if self.submitted {
            return Err(AppError::Validation("Answers already submitted".into()));
        }
        let token = self.session.token().ok_or_else(AppError::login_required)?;
        if self.kind == SectionKind::Speaking {
            let expected = self.tasks.len().max(1);
            if self.recordings.len() < expected {
                return Err(AppError::Validation(format!(
                    "Please complete all {} tasks before submitting.",
                    expected
                )));
            }
        }

        self.timer = None;
        for widget in &self.players {
            widget.with_player(|p| p.pause());
        }

        let result = match self.kind {
            SectionKind::Speaking => {
                self.api
                    .submit_recordings(self.section_id, self.recordings.clone(), &token)
                    .await?
            }
            kind => {
                let mut answers = self.answers.clone();
                if kind == SectionKind::Writing {
                    for task in &self.tasks {
                        answers
                            .entry(task.answer_key())
                            .or_insert_with(|| Value::String(String::new()));
                    }
                }
                self.api
                    .submit_answers(kind, self.section_id, &Value::Object(answers), &token)
                    .await?
            }
        };
        self.submitted = true;
        info!(score = ?result.score, "Answers submitted");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;
    use toefl_core::CountdownPhase;

    use crate::session::tests::{holder_with, signed_in_holder, MockAuth, SharedStore};
    use crate::viewmodel::sections::tests::MockSections;
    use crate::widgets::media::HeadlessElement;

    type Page = TestPage<HeadlessElement>;

    async fn open(kind: SectionKind, id: i64, api: Arc<MockSections>) -> Page {
        let session = Arc::new(signed_in_holder("li@example.com").await);
        Page::start(kind, id, session, api).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn section_limit_starts_running() {
        let page = open(SectionKind::Listening, 4, Arc::new(MockSections::default())).await;

        let snap = page.remaining().unwrap();
        assert_eq!(snap.remaining, 1800);
        assert_eq!(snap.display, "30:00");
        assert_eq!(snap.phase, CountdownPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_forces_submission() {
        let api = Arc::new(MockSections::default());
        let mut page = open(SectionKind::Reading, 3, api.clone()).await;
        page.set_time_limit(3);
        page.answer("12", json!(1));

        let result = page.run_until_expired().await.unwrap();
        assert_eq!(result.section_id, Some(3));
        assert!(page.is_submitted());
        assert!(page.remaining().is_none());

        let submissions = api.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0], (SectionKind::Reading, 3, json!({"12": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_limit_ignores_earlier_expiry() {
        let api = Arc::new(MockSections::default());
        let mut page = open(SectionKind::Reading, 3, api.clone()).await;

        page.set_time_limit(1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        page.set_time_limit(5);

        let started = Instant::now();
        page.run_until_expired().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(api.submissions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_pauses_audio_and_only_once() {
        let mut page = open(SectionKind::Listening, 4, Arc::new(MockSections::default())).await;

        let (_tx, rx) = mpsc::channel(4);
        let index = page.attach_audio(AudioPlayer::new("talk.mp3", HeadlessElement::default()), rx);
        let widget = page.player(index).unwrap();
        widget.with_player(|p| p.toggle_play_pause()).unwrap();
        assert!(widget.state().playing);

        page.submit().await.unwrap();
        assert!(!page.player(index).unwrap().state().playing);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(page.submit().await, Err(AppError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn writing_times_each_task() {
        let api = Arc::new(MockSections::default());
        let mut page = open(SectionKind::Writing, 8, api.clone()).await;
        assert!(page.remaining().is_none());

        page.load().await.unwrap();
        assert_eq!(page.tasks().len(), 2);
        assert_eq!(page.current_task().unwrap().task_number, 1);
        assert_eq!(page.remaining().unwrap().remaining, 1200);

        let progress = page.write_response(1, "Bees pollinate most crops").unwrap();
        assert_eq!(progress, WordProgress { words: 4, recommended: 150 });
        assert!(progress.is_short());
        assert!(page.write_response(3, "extra").is_err());

        let started = Instant::now();
        page.run_until_expired().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1800));
        assert_eq!(page.current_task().unwrap().task_number, 2);

        let submissions = api.submissions.lock().unwrap();
        assert_eq!(
            submissions[0],
            (
                SectionKind::Writing,
                8,
                json!({"task1": "Bees pollinate most crops", "task2": ""})
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_walks_phases_and_uploads_recordings() {
        let api = Arc::new(MockSections::default());
        let mut page = open(SectionKind::Speaking, 5, api.clone()).await;
        assert!(page.run_until_expired().await.is_err());

        page.load().await.unwrap();
        assert_eq!(page.speaking_phase(), Some(SpeakingPhase::Intro));
        assert_eq!(page.remaining().unwrap().remaining, 5);

        assert_eq!(page.run_timed_phases().await.unwrap(), SpeakingPhase::Completed);
        assert!(page.remaining().is_none());
        page.record(UploadFile::new("t1.webm", vec![1])).unwrap();

        assert!(page.next_task());
        assert_eq!(page.run_timed_phases().await.unwrap(), SpeakingPhase::Listening);
        assert_eq!(page.advance_phase(), Some(SpeakingPhase::Question));

        let err = page.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Please complete all 2 tasks before submitting.");

        assert_eq!(page.run_timed_phases().await.unwrap(), SpeakingPhase::Completed);
        page.record(UploadFile::new("t2.webm", vec![2])).unwrap();
        assert!(!page.next_task());

        page.submit().await.unwrap();
        let uploads = api.recordings.lock().unwrap();
        assert_eq!(
            uploads[0],
            (5, vec!["task1Recording".to_string(), "task2Recording".to_string()])
        );
        assert!(api.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn typed_response_needs_writing_task() {
        let mut page = open(SectionKind::Reading, 1, Arc::new(MockSections::default())).await;
        assert!(page.write_response(1, "text").is_err());
        assert!(page.record(UploadFile::new("a.webm", vec![])).is_err());

        let content = page.load().await.unwrap();
        assert_eq!(content["id"], 1);
        assert!(page.tasks().is_empty());
    }

    #[test]
    fn requires_signed_in_student() {
        let (holder, _) = holder_with(MockAuth::default(), SharedStore::default());
        holder.restore().unwrap();
        let result = Page::start(
            SectionKind::Reading,
            1,
            Arc::new(holder),
            Arc::new(MockSections::default()),
        );
        assert!(matches!(result, Err(AppError::Auth(_))));
    }
}
