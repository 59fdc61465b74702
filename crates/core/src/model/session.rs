use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::model::identity::{CandidateIdentity, IdentityError};
use crate::model::ids::AttemptId;
use crate::model::question::{Question, QuestionBank};
use crate::model::result::{CompletionReason, ResultSummary};
use crate::model::settings::{ExamSettings, Navigation};

//
// ─── PHASE ────────────────────────────────────────────────────────────────────
//

/// Lifecycle phase of an exam attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting candidate identity; no session exists yet.
    Identity,
    /// Countdown running, answers accepted.
    InProgress,
    /// Score computed; terminal for the attempt.
    Graded,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Identity => "identity",
            Phase::InProgress => "in progress",
            Phase::Graded => "graded",
        };
        f.write_str(label)
    }
}

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("identity incomplete: {0}")]
    IdentityIncomplete(#[from] IdentityError),

    #[error("option {index} is out of range for a question with {count} options")]
    OptionOutOfRange { index: usize, count: usize },

    #[error("no question at the current position")]
    NoQuestion,

    #[error("question {position} must be answered before moving on")]
    AnswerRequired { position: usize },

    #[error("already at the first question")]
    AtFirstQuestion,

    #[error("moving back to a previous question is disabled")]
    BackwardNavigationDisabled,

    #[error("session already graded")]
    AlreadyGraded,

    #[error("question order must visit every question exactly once")]
    InvalidOrder,
}

//
// ─── OUTCOMES ─────────────────────────────────────────────────────────────────
//

/// Result of `Session::advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Now showing the question at `position`.
    Moved { position: usize },
    /// Advanced past the final question; the attempt should be graded.
    Finished,
}

/// Result of `Session::tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    /// Countdown reached zero; the attempt should be graded.
    Expired,
    /// Already graded; the tick had no effect.
    Idle,
}

/// Snapshot of where the candidate is, for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub remaining_seconds: u32,
    pub duration_seconds: u32,
    pub is_graded: bool,
}

impl SessionProgress {
    /// Share of the countdown already used, `0.0..=100.0`.
    #[must_use]
    pub fn elapsed_percent(&self) -> f64 {
        if self.duration_seconds == 0 {
            return 100.0;
        }
        let used = self.duration_seconds.saturating_sub(self.remaining_seconds);
        f64::from(used) / f64::from(self.duration_seconds) * 100.0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.position + 1 >= self.total
    }
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// One candidate's attempt at the exam.
///
/// Holds one response slot per question, the countdown and, once graded, the
/// result. Grading is idempotent: the first call fixes the summary.
#[derive(Clone)]
pub struct Session {
    attempt_id: AttemptId,
    bank: Arc<QuestionBank>,
    identity: CandidateIdentity,
    settings: ExamSettings,
    order: Vec<usize>,
    current: usize,
    responses: Vec<Option<usize>>,
    remaining_seconds: u32,
    started_at: DateTime<Utc>,
    result: Option<ResultSummary>,
    exported: bool,
}

impl Session {
    /// Start an attempt presenting questions in bank order.
    #[must_use]
    pub fn start(
        bank: Arc<QuestionBank>,
        identity: CandidateIdentity,
        settings: &ExamSettings,
        started_at: DateTime<Utc>,
    ) -> Self {
        let order = (0..bank.len()).collect();
        Self::build(bank, identity, settings, order, started_at)
    }

    /// Start an attempt with an explicit presentation order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidOrder` unless `order` is a permutation of
    /// the bank's indices.
    pub fn start_with_order(
        bank: Arc<QuestionBank>,
        identity: CandidateIdentity,
        settings: &ExamSettings,
        order: Vec<usize>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let mut seen = vec![false; bank.len()];
        if order.len() != bank.len() {
            return Err(SessionError::InvalidOrder);
        }
        for &index in &order {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(SessionError::InvalidOrder),
            }
        }
        Ok(Self::build(bank, identity, settings, order, started_at))
    }

    fn build(
        bank: Arc<QuestionBank>,
        identity: CandidateIdentity,
        settings: &ExamSettings,
        order: Vec<usize>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let responses = vec![None; order.len()];
        Self {
            attempt_id: AttemptId::generate(),
            bank,
            identity,
            settings: settings.clone(),
            order,
            current: 0,
            responses,
            remaining_seconds: settings.duration_seconds(),
            started_at,
            result: None,
            exported: false,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn identity(&self) -> &CandidateIdentity {
        &self.identity
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Question shown at the current position, if the bank is non-empty.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.question_at(self.current)
    }

    #[must_use]
    pub fn question_at(&self, position: usize) -> Option<&Question> {
        self.order
            .get(position)
            .and_then(|&index| self.bank.get(index))
    }

    /// Selected option at `position`, or `None` when unanswered.
    #[must_use]
    pub fn response(&self, position: usize) -> Option<usize> {
        self.responses.get(position).copied().flatten()
    }

    #[must_use]
    pub fn responses(&self) -> &[Option<usize>] {
        &self.responses
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_some()).count()
    }

    #[must_use]
    pub fn is_graded(&self) -> bool {
        self.result.is_some()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ResultSummary> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            position: self.current,
            total: self.total_questions(),
            answered: self.answered_count(),
            remaining_seconds: self.remaining_seconds,
            duration_seconds: self.settings.duration_seconds(),
            is_graded: self.is_graded(),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_graded() {
            return Err(SessionError::AlreadyGraded);
        }
        Ok(())
    }

    /// Record (or overwrite) the answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OptionOutOfRange` without touching responses when
    /// `option` does not exist, and `SessionError::AlreadyGraded` after grading.
    pub fn select_option(&mut self, option: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        let count = self
            .current_question()
            .map(Question::option_count)
            .ok_or(SessionError::NoQuestion)?;
        if option >= count {
            return Err(SessionError::OptionOutOfRange {
                index: option,
                count,
            });
        }
        if let Some(slot) = self.responses.get_mut(self.current) {
            *slot = Some(option);
        }
        Ok(())
    }

    /// Move to the next question, or report that the last one was passed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AnswerRequired` when the settings demand an answer
    /// first, and `SessionError::AlreadyGraded` after grading.
    pub fn advance(&mut self) -> Result<Step, SessionError> {
        self.ensure_open()?;
        if self.order.is_empty() {
            return Ok(Step::Finished);
        }
        if self.settings.require_answer_to_advance() && self.response(self.current).is_none() {
            return Err(SessionError::AnswerRequired {
                position: self.current,
            });
        }
        if self.current + 1 < self.order.len() {
            self.current += 1;
            Ok(Step::Moved {
                position: self.current,
            })
        } else {
            Ok(Step::Finished)
        }
    }

    /// Move back one question. Recorded answers are kept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::BackwardNavigationDisabled` under forward-only
    /// navigation and `SessionError::AtFirstQuestion` at position 0.
    pub fn retreat(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if self.settings.navigation() == Navigation::ForwardOnly {
            return Err(SessionError::BackwardNavigationDisabled);
        }
        if self.current == 0 {
            return Err(SessionError::AtFirstQuestion);
        }
        self.current -= 1;
        Ok(self.current)
    }

    /// Count down one second, clamped at zero.
    pub fn tick(&mut self) -> TickOutcome {
        if self.is_graded() {
            return TickOutcome::Idle;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining_seconds: self.remaining_seconds,
            }
        }
    }

    /// Number of positions whose response matches the question's correct option.
    #[must_use]
    pub fn correct_count(&self) -> u32 {
        let correct = self
            .order
            .iter()
            .zip(&self.responses)
            .filter(|&(&index, response)| match (self.bank.get(index), response) {
                (Some(question), Some(option)) => question.is_correct(*option),
                _ => false,
            })
            .count();
        u32::try_from(correct).unwrap_or(u32::MAX)
    }

    /// Grade the attempt. Only the first call computes; later calls return the
    /// same summary regardless of arguments.
    pub fn grade(&mut self, reason: CompletionReason, at: DateTime<Utc>) -> &ResultSummary {
        let summary = match self.result.take() {
            Some(existing) => existing,
            None => ResultSummary::new(
                self.attempt_id,
                self.identity.clone(),
                self.correct_count(),
                u32::try_from(self.order.len()).unwrap_or(u32::MAX),
                self.settings.pass_mark(),
                reason,
                at,
            ),
        };
        self.result.insert(summary)
    }

    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    /// Flag the result as handed to the exporters.
    ///
    /// Returns `true` only for the call that flipped the flag.
    pub fn mark_exported(&mut self) -> bool {
        !std::mem::replace(&mut self.exported, true)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("attempt_id", &self.attempt_id)
            .field("candidate", &self.identity.name())
            .field("questions", &self.order.len())
            .field("current", &self.current)
            .field("answered", &self.answered_count())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("graded", &self.is_graded())
            .field("exported", &self.exported)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
