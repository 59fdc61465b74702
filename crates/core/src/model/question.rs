use std::collections::HashSet;

use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {id} has an empty prompt")]
    EmptyPrompt { id: QuestionId },

    #[error("question {id} needs at least two options, got {count}")]
    TooFewOptions { id: QuestionId, count: usize },

    #[error("question {id} has an empty option at position {index}")]
    EmptyOption { id: QuestionId, index: usize },

    #[error("question {id} repeats option {option:?}")]
    DuplicateOption { id: QuestionId, option: String },

    #[error("question {id} marks option {index} as correct but has only {count} options")]
    CorrectOptionOutOfRange {
        id: QuestionId,
        index: usize,
        count: usize,
    },

    #[error("question id {id} appears more than once in the bank")]
    DuplicateId { id: QuestionId },
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
///
/// Options are kept in presentation order; `correct_option` indexes into them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
}

impl Question {
    /// Build a validated question.
    ///
    /// Prompt and options are trimmed before validation.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is empty, there are fewer than two
    /// options, an option is empty or repeated, or `correct_option` is out of range.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into().trim().to_owned();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt { id });
        }

        let options: Vec<String> = options.into_iter().map(|o| o.trim().to_owned()).collect();
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                id,
                count: options.len(),
            });
        }

        let mut seen = HashSet::with_capacity(options.len());
        for (index, option) in options.iter().enumerate() {
            if option.is_empty() {
                return Err(QuestionError::EmptyOption { id, index });
            }
            if !seen.insert(option.as_str()) {
                return Err(QuestionError::DuplicateOption {
                    id,
                    option: option.clone(),
                });
            }
        }

        if correct_option >= options.len() {
            return Err(QuestionError::CorrectOptionOutOfRange {
                id,
                index: correct_option,
                count: options.len(),
            });
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct_option,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

//
// ─── QUESTION BANK ────────────────────────────────────────────────────────────
//

/// Immutable, ordered table of questions for one exam.
///
/// Shared between sessions behind an `Arc`; never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Build a bank from already validated questions.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::DuplicateId` if two questions share an id.
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionError> {
        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(QuestionError::DuplicateId { id: question.id() });
            }
        }
        Ok(Self { questions })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    /// The purple-team demo set used when no exam file is supplied.
    #[must_use]
    pub fn builtin() -> Self {
        let raw: [(&str, [&str; 4], usize); 4] = [
            (
                "What is the main goal of a Purple Team?",
                [
                    "To detect phishing emails",
                    "To align Red and Blue team efforts for better security",
                    "To conduct only penetration testing",
                    "To only monitor SIEM alerts",
                ],
                1,
            ),
            (
                "Which color is often associated with Purple Teaming?",
                ["Blue", "Red", "Purple", "Green"],
                2,
            ),
            (
                "What is the primary goal of Purple Team exercises?",
                [
                    "Improve Red Team tactics",
                    "Improve Blue Team defenses",
                    "Foster collaboration between Red and Blue Teams",
                    "Practice physical security protocols",
                ],
                2,
            ),
            (
                "Which phase involves simulating attacker techniques?",
                [
                    "Blue Team Analysis",
                    "Red Team Engagement",
                    "Purple Team Review",
                    "Post-Incident Response",
                ],
                1,
            ),
        ];

        let questions = raw
            .into_iter()
            .zip(1_u64..)
            .filter_map(|((prompt, options, answer), id)| {
                Question::new(
                    QuestionId::new(id),
                    prompt,
                    options.iter().map(|o| (*o).to_owned()).collect(),
                    answer,
                )
                .ok()
            })
            .collect();

        Self { questions }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
