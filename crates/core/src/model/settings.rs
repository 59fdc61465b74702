use thiserror::Error;

use crate::model::result::Percentage;

pub const DEFAULT_PASS_MARK_PERCENT: f64 = 75.0;
pub const DEFAULT_DURATION_SECONDS: u32 = 10 * 60;

/// How a candidate may move between questions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Navigation {
    /// Forward and backward; answered questions can be revisited.
    #[default]
    Free,
    /// Forward only; `retreat` is rejected.
    ForwardOnly,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("pass mark must be between 0 and 100, got {0}")]
    InvalidPassMark(f64),
    #[error("exam duration must be at least one second")]
    ZeroDuration,
}

/// Editable exam settings prior to validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ExamSettingsDraft {
    pub pass_mark_percent: f64,
    pub duration_seconds: u32,
    pub navigation: Navigation,
    pub require_answer_to_advance: bool,
    pub require_candidate_id: bool,
    pub shuffle_questions: bool,
}

impl Default for ExamSettingsDraft {
    fn default() -> Self {
        Self {
            pass_mark_percent: DEFAULT_PASS_MARK_PERCENT,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            navigation: Navigation::Free,
            require_answer_to_advance: true,
            require_candidate_id: false,
            shuffle_questions: false,
        }
    }
}

impl ExamSettingsDraft {
    /// Validate the draft into immutable settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the pass mark is outside `0..=100` or the
    /// duration is zero.
    pub fn validate(self) -> Result<ExamSettings, SettingsError> {
        let pass_mark = Percentage::from_percent(self.pass_mark_percent)
            .ok_or(SettingsError::InvalidPassMark(self.pass_mark_percent))?;
        if self.duration_seconds == 0 {
            return Err(SettingsError::ZeroDuration);
        }

        Ok(ExamSettings {
            pass_mark,
            duration_seconds: self.duration_seconds,
            navigation: self.navigation,
            require_answer_to_advance: self.require_answer_to_advance,
            require_candidate_id: self.require_candidate_id,
            shuffle_questions: self.shuffle_questions,
        })
    }
}

/// Static configuration for an exam: pass mark, countdown and navigation policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExamSettings {
    pass_mark: Percentage,
    duration_seconds: u32,
    navigation: Navigation,
    require_answer_to_advance: bool,
    require_candidate_id: bool,
    shuffle_questions: bool,
}

impl ExamSettings {
    #[must_use]
    pub fn pass_mark(&self) -> Percentage {
        self.pass_mark
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn navigation(&self) -> Navigation {
        self.navigation
    }

    #[must_use]
    pub fn require_answer_to_advance(&self) -> bool {
        self.require_answer_to_advance
    }

    #[must_use]
    pub fn require_candidate_id(&self) -> bool {
        self.require_candidate_id
    }

    #[must_use]
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    /// Back to an editable draft, e.g. to layer overrides on top.
    #[must_use]
    pub fn to_draft(&self) -> ExamSettingsDraft {
        ExamSettingsDraft {
            pass_mark_percent: self.pass_mark.as_f64(),
            duration_seconds: self.duration_seconds,
            navigation: self.navigation,
            require_answer_to_advance: self.require_answer_to_advance,
            require_candidate_id: self.require_candidate_id,
            shuffle_questions: self.shuffle_questions,
        }
    }
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            pass_mark: Percentage::from_hundredths(7_500).unwrap_or(Percentage::ZERO),
            duration_seconds: DEFAULT_DURATION_SECONDS,
            navigation: Navigation::Free,
            require_answer_to_advance: true,
            require_candidate_id: false,
            shuffle_questions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_draft_matches_default_settings() {
        let validated = ExamSettingsDraft::default().validate().unwrap();
        assert_eq!(validated, ExamSettings::default());
        assert_eq!(validated.pass_mark().to_string(), "75.00");
    }

    #[test]
    fn invalid_pass_mark_is_rejected() {
        let draft = ExamSettingsDraft {
            pass_mark_percent: 120.0,
            ..ExamSettingsDraft::default()
        };
        assert_eq!(
            draft.validate().unwrap_err(),
            SettingsError::InvalidPassMark(120.0)
        );
    }

    #[test]
    fn zero_duration_is_rejected() {
        let draft = ExamSettingsDraft {
            duration_seconds: 0,
            ..ExamSettingsDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), SettingsError::ZeroDuration);
    }
}
