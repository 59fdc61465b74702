//! TOML exam files.
//!
//! ```toml
//! [exam]
//! pass_mark = 80
//! duration_secs = 300
//! navigation = "forward-only"
//!
//! [[questions]]
//! id = 1
//! prompt = "Which colour mixes red and blue?"
//! options = ["Green", "Purple", "Orange"]
//! answer = 1
//! ```
//!
//! Every `[exam]` key is optional and falls back to the base settings. A file
//! without questions uses the built-in bank.

use std::path::Path;

use serde::Deserialize;

use exam_core::model::{
    ExamSettings, Navigation, Question, QuestionBank, QuestionError, QuestionId,
};

use crate::error::ExamFileError;

/// Settings and questions loaded from an exam file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamFile {
    pub settings: ExamSettings,
    pub bank: QuestionBank,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExamDocument {
    #[serde(default)]
    exam: ExamTable,
    #[serde(default)]
    questions: Vec<QuestionEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExamTable {
    pass_mark: Option<f64>,
    duration_secs: Option<u32>,
    navigation: Option<NavigationValue>,
    require_answer: Option<bool>,
    require_candidate_id: Option<bool>,
    shuffle: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum NavigationValue {
    Free,
    ForwardOnly,
}

impl From<NavigationValue> for Navigation {
    fn from(value: NavigationValue) -> Self {
        match value {
            NavigationValue::Free => Navigation::Free,
            NavigationValue::ForwardOnly => Navigation::ForwardOnly,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuestionEntry {
    id: u64,
    prompt: String,
    options: Vec<String>,
    answer: usize,
}

impl ExamTable {
    fn apply(self, base: &ExamSettings) -> Result<ExamSettings, ExamFileError> {
        let mut draft = base.to_draft();
        if let Some(pass_mark) = self.pass_mark {
            draft.pass_mark_percent = pass_mark;
        }
        if let Some(duration) = self.duration_secs {
            draft.duration_seconds = duration;
        }
        if let Some(navigation) = self.navigation {
            draft.navigation = navigation.into();
        }
        if let Some(require) = self.require_answer {
            draft.require_answer_to_advance = require;
        }
        if let Some(require) = self.require_candidate_id {
            draft.require_candidate_id = require;
        }
        if let Some(shuffle) = self.shuffle {
            draft.shuffle_questions = shuffle;
        }
        Ok(draft.validate()?)
    }
}

fn build_bank(entries: Vec<QuestionEntry>) -> Result<QuestionBank, QuestionError> {
    if entries.is_empty() {
        return Ok(QuestionBank::builtin());
    }
    let questions = entries
        .into_iter()
        .map(|entry| {
            Question::new(
                QuestionId::new(entry.id),
                entry.prompt,
                entry.options,
                entry.answer,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    QuestionBank::new(questions)
}

/// Parse exam file contents, overriding `base` with any `[exam]` keys.
///
/// # Errors
///
/// Returns `ExamFileError` for malformed TOML, invalid questions, or settings
/// that fail validation.
pub fn parse_exam_file(contents: &str, base: &ExamSettings) -> Result<ExamFile, ExamFileError> {
    let document: ExamDocument = toml::from_str(contents)?;
    let settings = document.exam.apply(base)?;
    let bank = build_bank(document.questions)?;
    Ok(ExamFile { settings, bank })
}

/// Read and parse an exam file from disk.
///
/// # Errors
///
/// Returns `ExamFileError::Read` if the file cannot be read, or any error
/// from [`parse_exam_file`].
pub async fn load_exam_file(path: &Path, base: &ExamSettings) -> Result<ExamFile, ExamFileError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ExamFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let file = parse_exam_file(&contents, base)?;
    tracing::info!(
        path = %path.display(),
        questions = file.bank.len(),
        "exam file loaded"
    );
    Ok(file)
}
