use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::identity::CandidateIdentity;
use crate::model::ids::AttemptId;

//
// ─── PERCENTAGE ───────────────────────────────────────────────────────────────
//

/// Fixed-point percentage stored in hundredths (`7525` is `75.25%`).
///
/// Scores and pass marks share this representation so the pass/fail
/// comparison is always integer-on-integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percentage(u32);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(10_000);

    /// `correct / total * 100`, rounded half-up to two decimals.
    ///
    /// An empty total yields `0.00`. `correct` is clamped to `total`.
    #[must_use]
    pub fn from_ratio(correct: u32, total: u32) -> Self {
        if total == 0 {
            return Self::ZERO;
        }
        let correct = u64::from(correct.min(total));
        let total = u64::from(total);
        let hundredths = (correct * 20_000 + total) / (2 * total);
        Self(u32::try_from(hundredths).unwrap_or(10_000))
    }

    /// Parse a human percentage such as `75` or `62.5`.
    ///
    /// Returns `None` when the value is not finite or outside `0..=100`.
    #[must_use]
    pub fn from_percent(value: f64) -> Option<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hundredths = (value * 100.0).round() as u32;
        Some(Self(hundredths.min(10_000)))
    }

    #[must_use]
    pub fn from_hundredths(hundredths: u32) -> Option<Self> {
        (hundredths <= 10_000).then_some(Self(hundredths))
    }

    #[must_use]
    pub fn hundredths(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

//
// ─── RESULT SUMMARY ───────────────────────────────────────────────────────────
//

/// Why an attempt left the in-progress phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// Advanced past the final question.
    Completed,
    /// Explicit submission before the end.
    Submitted,
    /// The countdown reached zero.
    TimeExpired,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompletionReason::Completed => "completed",
            CompletionReason::Submitted => "submitted",
            CompletionReason::TimeExpired => "time expired",
        };
        f.write_str(label)
    }
}

/// Graded outcome of one attempt. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    attempt_id: AttemptId,
    identity: CandidateIdentity,
    correct_count: u32,
    total_count: u32,
    percentage: Percentage,
    pass_mark: Percentage,
    reason: CompletionReason,
    completed_at: DateTime<Utc>,
}

impl ResultSummary {
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        identity: CandidateIdentity,
        correct_count: u32,
        total_count: u32,
        pass_mark: Percentage,
        reason: CompletionReason,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let correct_count = correct_count.min(total_count);
        Self {
            attempt_id,
            identity,
            correct_count,
            total_count,
            percentage: Percentage::from_ratio(correct_count, total_count),
            pass_mark,
            reason,
            completed_at,
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
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    #[must_use]
    pub fn percentage(&self) -> Percentage {
        self.percentage
    }

    #[must_use]
    pub fn pass_mark(&self) -> Percentage {
        self.pass_mark
    }

    /// An empty exam never passes, whatever the pass mark.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.total_count > 0 && self.percentage >= self.pass_mark
    }

    #[must_use]
    pub fn reason(&self) -> CompletionReason {
        self.reason
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn verdict(&self) -> &'static str {
        if self.passed() { "PASS" } else { "FAIL" }
    }
}

//
// ─── RESULT RECORD ────────────────────────────────────────────────────────────
//

/// History entry appended to the result store after grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub id: Option<String>,
    pub score: f64,
    pub passed: bool,
    pub date: DateTime<Utc>,
}

impl ResultRecord {
    #[must_use]
    pub fn from_summary(summary: &ResultSummary) -> Self {
        Self {
            name: summary.identity().name().to_owned(),
            id: summary.identity().candidate_id().map(str::to_owned),
            score: summary.percentage().as_f64(),
            passed: summary.passed(),
            date: summary.completed_at(),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
