//! Section authoring drafts
//!
//! Payloads test authors build before uploading a new section. Media files
//! travel separately as multipart parts; drafts carry only the JSON half.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A row/column pair selected in a table question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSelection {
    pub row: String,
    pub column: String,
}

/// Question variants supported by reading and listening sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    MultipleToSingle {
        prompt: String,
        options: Vec<String>,
        correct_answer: String,
    },
    MultipleToMultiple {
        prompt: String,
        options: Vec<String>,
        correct_answers: Vec<String>,
    },
    InsertText {
        prompt: String,
        correct_answer: String,
    },
    ProseSummary {
        prompt: String,
        options: Vec<String>,
        correct_answers: Vec<String>,
    },
    Table {
        prompt: String,
        rows: Vec<String>,
        columns: Vec<String>,
        correct_selections: Vec<TableSelection>,
    },
    Audio {
        prompt: String,
        options: Vec<String>,
        correct_answer: String,
    },
}

impl Question {
    pub fn prompt(&self) -> &str {
        match self {
            Question::MultipleToSingle { prompt, .. }
            | Question::MultipleToMultiple { prompt, .. }
            | Question::InsertText { prompt, .. }
            | Question::ProseSummary { prompt, .. }
            | Question::Table { prompt, .. }
            | Question::Audio { prompt, .. } => prompt,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt().trim().is_empty() {
            return Err(invalid("Question prompt is required"));
        }

        match self {
            Question::MultipleToSingle {
                options,
                correct_answer,
                ..
            }
            | Question::Audio {
                options,
                correct_answer,
                ..
            } => check_answers(options, std::slice::from_ref(correct_answer)),
            Question::MultipleToMultiple {
                options,
                correct_answers,
                ..
            }
            | Question::ProseSummary {
                options,
                correct_answers,
                ..
            } => {
                if correct_answers.is_empty() {
                    return Err(invalid("Select at least one correct answer"));
                }
                check_answers(options, correct_answers)
            }
            Question::InsertText { correct_answer, .. } => {
                if correct_answer.trim().is_empty() {
                    return Err(invalid("Insert-text question needs a correct position"));
                }
                Ok(())
            }
            Question::Table {
                rows,
                columns,
                correct_selections,
                ..
            } => {
                for sel in correct_selections {
                    if !rows.contains(&sel.row) || !columns.contains(&sel.column) {
                        return Err(invalid(format!(
                            "Table selection ({}, {}) is not in the table",
                            sel.row, sel.column
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_answers(options: &[String], answers: &[String]) -> Result<()> {
    if options.iter().all(|o| o.trim().is_empty()) {
        return Err(invalid("Question needs at least one option"));
    }
    for answer in answers {
        if !options.contains(answer) {
            return Err(invalid(format!("Correct answer '{}' is not an option", answer)));
        }
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidInput(msg.into())
}

fn require_title(title: &str, what: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(invalid(format!("{} title is required", what)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageDraft {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSectionDraft {
    pub title: String,
    pub passages: Vec<PassageDraft>,
}

impl ReadingSectionDraft {
    pub fn validate(&self) -> Result<()> {
        require_title(&self.title, "Section")?;
        if self.passages.is_empty() {
            return Err(invalid("No passages provided"));
        }
        for passage in &self.passages {
            if passage.title.trim().is_empty() || passage.text.trim().is_empty() {
                return Err(invalid("Missing title or content in passage"));
            }
            passage.questions.iter().try_for_each(Question::validate)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioItemDraft {
    /// Client-side identifier that names this item's file parts
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningSectionDraft {
    pub title: String,
    pub audio_items: Vec<AudioItemDraft>,
}

impl ListeningSectionDraft {
    pub fn validate(&self) -> Result<()> {
        require_title(&self.title, "Section")?;
        if self.audio_items.is_empty() {
            return Err(invalid("No audio items provided"));
        }
        for item in &self.audio_items {
            require_title(&item.title, "Audio")?;
            item.questions.iter().try_for_each(Question::validate)?;
        }
        Ok(())
    }
}

/// One speaking or writing task prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub task_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    pub prompt: String,
}

impl TaskDraft {
    fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(invalid(format!("Task {} prompt is required", self.task_number)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakingSectionDraft {
    pub title: String,
    pub tasks: Vec<TaskDraft>,
}

impl SpeakingSectionDraft {
    /// Tasks that carry a lecture or conversation recording
    pub fn audio_task_numbers() -> std::ops::RangeInclusive<u32> {
        2..=4
    }

    pub fn validate(&self) -> Result<()> {
        require_title(&self.title, "Section")?;
        if self.tasks.is_empty() {
            return Err(invalid("No tasks provided"));
        }
        self.tasks.iter().try_for_each(TaskDraft::validate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingSectionDraft {
    pub title: String,
    pub tasks: Vec<TaskDraft>,
}

impl WritingSectionDraft {
    pub fn validate(&self) -> Result<()> {
        require_title(&self.title, "Section")?;
        if self.tasks.is_empty() {
            return Err(invalid("No tasks provided"));
        }
        self.tasks.iter().try_for_each(TaskDraft::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq(answer: &str) -> Question {
        Question::MultipleToSingle {
            prompt: "Main idea?".into(),
            options: vec!["A".into(), "B".into()],
            correct_answer: answer.into(),
        }
    }

    #[test]
    fn question_tagged_by_type() {
        let json = serde_json::to_value(mcq("A")).unwrap();
        assert_eq!(json["type"], "multiple_to_single");
        assert_eq!(json["correct_answer"], "A");
    }

    #[test]
    fn answer_must_be_an_option() {
        assert!(mcq("A").validate().is_ok());
        assert!(mcq("C").validate().is_err());
    }

    #[test]
    fn table_selection_must_exist() {
        let q = Question::Table {
            prompt: "Classify".into(),
            rows: vec!["r1".into()],
            columns: vec!["yes".into(), "no".into()],
            correct_selections: vec![TableSelection {
                row: "r2".into(),
                column: "yes".into(),
            }],
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn reading_draft_requires_passages() {
        let draft = ReadingSectionDraft {
            title: "Practice 1".into(),
            passages: vec![],
        };
        assert!(draft.validate().is_err());

        let draft = ReadingSectionDraft {
            title: "Practice 1".into(),
            passages: vec![PassageDraft {
                title: "Volcanoes".into(),
                text: "Magma rises...".into(),
                questions: vec![mcq("B")],
            }],
        };
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn listening_draft_uses_camel_case() {
        let draft = ListeningSectionDraft {
            title: "L1".into(),
            audio_items: vec![AudioItemDraft {
                id: "a1".into(),
                title: "Lecture".into(),
                questions: vec![],
            }],
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("audioItems").is_some());
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn blank_task_prompt_rejected() {
        let draft = WritingSectionDraft {
            title: "W1".into(),
            tasks: vec![TaskDraft {
                task_number: 1,
                passage: None,
                prompt: "  ".into(),
            }],
        };
        assert!(draft.validate().is_err());
    }
}
