//! Exam timing rules
//!
//! Time limits per section and the phase sequence a speaking task walks
//! through (intro, reading, listening, question, preparation, recording).

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::models::SectionKind;

pub const READING_SECTION_SECONDS: u64 = 1200;
pub const LISTENING_SECTION_SECONDS: u64 = 1800;

const WRITING_TASK1_SECONDS: u64 = 1200;
const WRITING_TASK2_SECONDS: u64 = 600;
const WRITING_FALLBACK_SECONDS: u64 = 600;

/// Whole-section limit, when the section is timed as one block
pub fn section_time_limit(kind: SectionKind) -> Option<u64> {
    match kind {
        SectionKind::Reading => Some(READING_SECTION_SECONDS),
        SectionKind::Listening => Some(LISTENING_SECTION_SECONDS),
        SectionKind::Speaking | SectionKind::Writing => None,
    }
}

pub fn writing_time_limit(task_number: u32) -> u64 {
    match task_number {
        1 => WRITING_TASK1_SECONDS,
        2 => WRITING_TASK2_SECONDS,
        _ => WRITING_FALLBACK_SECONDS,
    }
}

pub fn recommended_word_count(task_number: u32) -> usize {
    if task_number == 1 {
        150
    } else {
        100
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// A speaking or writing task as served inside section content
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionTask {
    #[serde(default)]
    pub id: Option<i64>,
    pub task_number: u32,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub passage: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl SectionTask {
    pub fn has_audio(&self) -> bool {
        self.audio_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Answer key the backend expects for this task
    pub fn answer_key(&self) -> String {
        format!("task{}", self.task_number)
    }

    pub fn recording_key(&self) -> String {
        format!("task{}Recording", self.task_number)
    }
}

/// Tasks stored under `task1`, `task2`, ... keys, ordered by task number.
/// Entries that do not look like a task are skipped.
pub fn section_tasks(content: &Value) -> Vec<SectionTask> {
    let Some(fields) = content.as_object() else {
        return Vec::new();
    };

    let mut tasks: Vec<SectionTask> = fields
        .iter()
        .filter(|(key, value)| key.starts_with("task") && value.is_object())
        .filter_map(|(key, value)| match SectionTask::deserialize(value) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping malformed task");
                None
            }
        })
        .collect();
    tasks.sort_by_key(|t| t.task_number);
    tasks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingPhase {
    Intro,
    Reading,
    Listening,
    /// Combined material step for tasks beyond the standard four
    ReadingListening,
    Question,
    Preparation,
    Recording,
    Completed,
}

/// How a phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseLimit {
    /// Countdown of this many seconds
    Timed(u64),
    /// When the task recording finishes playing
    UntilAudioEnds,
    /// Ends when the student moves on
    Manual,
    /// Task finished
    Terminal,
}

/// Phase sequence for one speaking task
#[derive(Debug, Clone)]
pub struct SpeakingTaskFlow {
    task_number: u32,
    steps: Vec<(SpeakingPhase, PhaseLimit)>,
    index: usize,
}

impl SpeakingTaskFlow {
    pub fn new(task_number: u32, has_audio: bool) -> Self {
        use PhaseLimit::*;
        use SpeakingPhase::*;

        let mut steps = match task_number {
            1 => vec![(Intro, Timed(5)), (Question, Timed(5))],
            2 | 3 => {
                let mut s = vec![(Intro, Timed(5)), (Reading, Timed(45))];
                if has_audio {
                    s.push((Listening, UntilAudioEnds));
                }
                s.push((Question, Timed(5)));
                s
            }
            4 => {
                let mut s = vec![(Intro, Timed(5))];
                if has_audio {
                    s.push((Listening, UntilAudioEnds));
                }
                s.push((Question, Timed(5)));
                s
            }
            _ => vec![(
                ReadingListening,
                if has_audio { UntilAudioEnds } else { Manual },
            )],
        };

        let (prep, response) = match task_number {
            1 => (15, 45),
            2 | 3 => (30, 60),
            4 => (20, 60),
            _ => (30, 60),
        };
        steps.push((Preparation, Timed(prep)));
        steps.push((Recording, Timed(response)));
        steps.push((Completed, Terminal));

        Self {
            task_number,
            steps,
            index: 0,
        }
    }

    pub fn task_number(&self) -> u32 {
        self.task_number
    }

    pub fn phase(&self) -> SpeakingPhase {
        self.steps[self.index].0
    }

    pub fn limit(&self) -> PhaseLimit {
        self.steps[self.index].1
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == SpeakingPhase::Completed
    }

    /// Move to the next phase; stays put once completed
    pub fn advance(&mut self) -> SpeakingPhase {
        if self.index + 1 < self.steps.len() {
            self.index += 1;
        }
        self.phase()
    }

    /// Preparation seconds for this task
    pub fn preparation_seconds(&self) -> u64 {
        self.timed(SpeakingPhase::Preparation)
    }

    /// Response seconds for this task
    pub fn response_seconds(&self) -> u64 {
        self.timed(SpeakingPhase::Recording)
    }

    fn timed(&self, phase: SpeakingPhase) -> u64 {
        self.steps
            .iter()
            .find_map(|(p, limit)| match (p, limit) {
                (p, PhaseLimit::Timed(s)) if *p == phase => Some(*s),
                _ => None,
            })
            .unwrap_or(0)
    }
}
