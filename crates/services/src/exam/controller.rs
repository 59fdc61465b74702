use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{info, warn};

use exam_core::model::{
    CompletionReason, ExamSettings, IdentityDraft, Phase, QuestionBank, ResultRecord,
    ResultSummary, Session, SessionError, SessionProgress, Step, TickOutcome,
};
use storage::repository::{ResultRecordId, ResultRecordRepository};

use super::ticks::{TickHandle, TickSource};
use crate::Clock;
use crate::error::ExamError;
use crate::report::{ReportArtifact, ReportWriter};

//
// ─── EXPORT STATUS ─────────────────────────────────────────────────────────────
//

/// What has been exported for a graded attempt so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReceipt {
    /// Set once the report writer has succeeded, even if it produced nothing.
    pub reports_written: bool,
    pub artifacts: Vec<ReportArtifact>,
    pub record_id: Option<ResultRecordId>,
}

/// Outcome of the one-shot export that runs when an attempt is graded.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Pending,
    Complete(ExportReceipt),
    /// Some exporter failed. The result itself is still valid.
    Failed {
        receipt: ExportReceipt,
        notices: Vec<String>,
    },
}

impl ExportStatus {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, ExportStatus::Complete(_))
    }

    #[must_use]
    pub fn notices(&self) -> &[String] {
        match self {
            ExportStatus::Failed { notices, .. } => notices,
            _ => &[],
        }
    }
}

//
// ─── STATE ────────────────────────────────────────────────────────────────────
//

enum ExamState {
    Identity,
    InProgress { session: Session, ticks: TickHandle },
    Graded { session: Session, export: ExportStatus },
}

impl ExamState {
    fn phase(&self) -> Phase {
        match self {
            ExamState::Identity => Phase::Identity,
            ExamState::InProgress { .. } => Phase::InProgress,
            ExamState::Graded { .. } => Phase::Graded,
        }
    }
}

//
// ─── CONTROLLER ───────────────────────────────────────────────────────────────
//

/// Drives one candidate at a time through identity, exam and result.
///
/// The tick handle lives inside the in-progress state, so leaving that state
/// by any route releases the countdown. Export runs once, on entering the
/// graded state.
pub struct ExamController {
    clock: Clock,
    bank: Arc<QuestionBank>,
    settings: ExamSettings,
    ticks: Arc<dyn TickSource>,
    reports: Arc<dyn ReportWriter>,
    results: Option<Arc<dyn ResultRecordRepository>>,
    state: ExamState,
}

impl ExamController {
    #[must_use]
    pub fn new(
        clock: Clock,
        bank: Arc<QuestionBank>,
        settings: ExamSettings,
        ticks: Arc<dyn TickSource>,
        reports: Arc<dyn ReportWriter>,
    ) -> Self {
        Self {
            clock,
            bank,
            settings,
            ticks,
            reports,
            results: None,
            state: ExamState::Identity,
        }
    }

    /// Also append each graded attempt to a result store.
    #[must_use]
    pub fn with_result_store(mut self, results: Arc<dyn ResultRecordRepository>) -> Self {
        self.results = Some(results);
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[must_use]
    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    /// The running or graded session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            ExamState::Identity => None,
            ExamState::InProgress { session, .. } | ExamState::Graded { session, .. } => {
                Some(session)
            }
        }
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.session().map(Session::progress)
    }

    #[must_use]
    pub fn result(&self) -> Option<&ResultSummary> {
        self.session().and_then(Session::result)
    }

    #[must_use]
    pub fn export_status(&self) -> Option<&ExportStatus> {
        match &self.state {
            ExamState::Graded { export, .. } => Some(export),
            _ => None,
        }
    }

    /// Whether `draft` would be accepted by `start_session`.
    #[must_use]
    pub fn can_start(&self, draft: &IdentityDraft) -> bool {
        matches!(self.state, ExamState::Identity)
            && draft.is_complete(self.settings.require_candidate_id())
    }

    fn wrong_phase(&self, expected: Phase) -> ExamError {
        ExamError::WrongPhase {
            expected,
            actual: self.phase(),
        }
    }

    fn running_mut(&mut self) -> Result<&mut Session, ExamError> {
        let actual = self.phase();
        match &mut self.state {
            ExamState::InProgress { session, .. } => Ok(session),
            _ => Err(ExamError::WrongPhase {
                expected: Phase::InProgress,
                actual,
            }),
        }
    }

    /// Validate identity and begin a fresh attempt with a full countdown.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` outside the identity phase and
    /// `SessionError::IdentityIncomplete` when a required field is blank; the
    /// controller stays in the identity phase in both cases.
    pub fn start_session(&mut self, draft: IdentityDraft) -> Result<&Session, ExamError> {
        if !matches!(self.state, ExamState::Identity) {
            return Err(self.wrong_phase(Phase::Identity));
        }
        let identity = draft
            .validate(self.settings.require_candidate_id())
            .map_err(SessionError::from)?;

        let started_at = self.clock.now();
        let session = if self.settings.shuffle_questions() {
            let mut order: Vec<usize> = (0..self.bank.len()).collect();
            order.shuffle(&mut rand::rng());
            Session::start_with_order(
                Arc::clone(&self.bank),
                identity,
                &self.settings,
                order,
                started_at,
            )?
        } else {
            Session::start(Arc::clone(&self.bank), identity, &self.settings, started_at)
        };

        info!(
            attempt = %session.attempt_id(),
            candidate = session.identity().name(),
            questions = session.total_questions(),
            duration_secs = session.remaining_seconds(),
            "exam started"
        );

        let ticks = self.ticks.acquire();
        self.state = ExamState::InProgress { session, ticks };
        self.session().ok_or(ExamError::WrongPhase {
            expected: Phase::InProgress,
            actual: Phase::Identity,
        })
    }

    /// Record an answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` outside an attempt and
    /// `SessionError::OptionOutOfRange` for an unknown option.
    pub fn select_option(&mut self, option: usize) -> Result<(), ExamError> {
        self.running_mut()?.select_option(option)?;
        Ok(())
    }

    /// Go to the next question, grading the attempt after the last one.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` outside an attempt and
    /// `SessionError::AnswerRequired` when an answer must be given first.
    pub async fn advance(&mut self) -> Result<Step, ExamError> {
        let step = self.running_mut()?.advance()?;
        if step == Step::Finished {
            self.finish(CompletionReason::Completed).await?;
        }
        Ok(step)
    }

    /// Go back one question.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` outside an attempt, or the session's
    /// navigation error.
    pub fn retreat(&mut self) -> Result<usize, ExamError> {
        Ok(self.running_mut()?.retreat()?)
    }

    /// Hand in the attempt now. Unanswered questions count as incorrect.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` outside an attempt.
    pub async fn submit(&mut self) -> Result<&ResultSummary, ExamError> {
        self.finish(CompletionReason::Submitted).await
    }

    /// Apply one elapsed second. Grades the attempt when time runs out.
    ///
    /// Ticks that arrive after grading are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` before an attempt has started.
    pub async fn tick(&mut self) -> Result<TickOutcome, ExamError> {
        let outcome = match self.phase() {
            Phase::Identity => return Err(self.wrong_phase(Phase::InProgress)),
            Phase::Graded => return Ok(TickOutcome::Idle),
            Phase::InProgress => self.running_mut()?.tick(),
        };
        if outcome == TickOutcome::Expired {
            self.finish(CompletionReason::TimeExpired).await?;
        }
        Ok(outcome)
    }

    /// Resolves on the next countdown tick of the running attempt.
    ///
    /// Never resolves outside the in-progress phase, which makes it safe to
    /// poll unconditionally from a `select!` loop.
    pub async fn next_tick(&mut self) {
        if let ExamState::InProgress { ticks, .. } = &mut self.state {
            if ticks.next().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    /// Discard the graded attempt and return to identity entry.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` unless the attempt is graded.
    pub fn retake(&mut self) -> Result<(), ExamError> {
        if !matches!(self.state, ExamState::Graded { .. }) {
            return Err(self.wrong_phase(Phase::Graded));
        }
        self.state = ExamState::Identity;
        info!("exam reset for a new candidate");
        Ok(())
    }

    /// Re-run the exporters that failed on grading. Completed exports are
    /// never repeated.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::WrongPhase` unless the attempt is graded.
    pub async fn retry_export(&mut self) -> Result<&ExportStatus, ExamError> {
        if !matches!(self.state, ExamState::Graded { .. }) {
            return Err(self.wrong_phase(Phase::Graded));
        }
        self.run_export().await;
        self.export_status()
            .ok_or(ExamError::WrongPhase {
                expected: Phase::Graded,
                actual: Phase::Identity,
            })
    }

    async fn finish(&mut self, reason: CompletionReason) -> Result<&ResultSummary, ExamError> {
        let (mut session, ticks) = match std::mem::replace(&mut self.state, ExamState::Identity) {
            ExamState::InProgress { session, ticks } => (session, ticks),
            other => {
                self.state = other;
                return Err(self.wrong_phase(Phase::InProgress));
            }
        };
        ticks.cancel();

        let summary = session.grade(reason, self.clock.now());
        info!(
            attempt = %summary.attempt_id(),
            reason = %reason,
            correct = summary.correct_count(),
            total = summary.total_count(),
            percentage = %summary.percentage(),
            passed = summary.passed(),
            "exam graded"
        );

        self.state = ExamState::Graded {
            session,
            export: ExportStatus::Pending,
        };
        self.run_export().await;

        self.result().ok_or(ExamError::WrongPhase {
            expected: Phase::Graded,
            actual: Phase::Identity,
        })
    }

    /// Export on first entry to the graded state, or retry what failed.
    async fn run_export(&mut self) {
        let ExamState::Graded { session, export } = &mut self.state else {
            return;
        };
        let first_entry = session.mark_exported();
        let receipt = match export {
            ExportStatus::Pending if first_entry => ExportReceipt::default(),
            ExportStatus::Failed { receipt, .. } => receipt.clone(),
            _ => return,
        };
        let Some(summary) = session.result().cloned() else {
            return;
        };

        let status = self.export_summary(&summary, receipt).await;
        if let ExamState::Graded { export, .. } = &mut self.state {
            *export = status;
        }
    }

    async fn export_summary(
        &self,
        summary: &ResultSummary,
        mut receipt: ExportReceipt,
    ) -> ExportStatus {
        let mut notices = Vec::new();

        if !receipt.reports_written {
            match self.reports.write(summary).await {
                Ok(artifacts) => {
                    info!(count = artifacts.len(), "result reports written");
                    receipt.artifacts = artifacts;
                    receipt.reports_written = true;
                }
                Err(err) => {
                    warn!(error = %err, "result reports could not be written");
                    notices.push(format!("report not saved: {err}"));
                }
            }
        }

        if let Some(results) = &self.results {
            if receipt.record_id.is_none() {
                match results.append_record(&ResultRecord::from_summary(summary)).await {
                    Ok(id) => {
                        info!(record_id = id, "result recorded");
                        receipt.record_id = Some(id);
                    }
                    Err(err) => {
                        warn!(error = %err, "result could not be recorded");
                        notices.push(format!("history not saved: {err}"));
                    }
                }
            }
        }

        if notices.is_empty() {
            ExportStatus::Complete(receipt)
        } else {
            ExportStatus::Failed { receipt, notices }
        }
    }
}

impl fmt::Debug for ExamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamController")
            .field("phase", &self.phase())
            .field("questions", &self.bank.len())
            .field("settings", &self.settings)
            .field("session", &self.session())
            .field("has_result_store", &self.results.is_some())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::ManualTicks;
    use crate::error::ReportError;
    use async_trait::async_trait;
    use exam_core::model::{ExamSettingsDraft, Question, QuestionId};
    use exam_core::time::fixed_clock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWriter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReportWriter for CountingWriter {
        async fn write(
            &self,
            _summary: &ResultSummary,
        ) -> Result<Vec<ReportArtifact>, ReportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReportError::Io {
                    path: "blocked".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            Ok(vec![ReportArtifact {
                format: crate::report::ReportFormat::Text,
                path: "memory.txt".into(),
                bytes: 1,
            }])
        }
    }

    fn bank(answers: &[usize]) -> Arc<QuestionBank> {
        let questions = answers
            .iter()
            .zip(1_u64..)
            .map(|(&answer, id)| {
                Question::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    answer,
                )
                .unwrap()
            })
            .collect();
        Arc::new(QuestionBank::new(questions).unwrap())
    }

    fn controller(
        answers: &[usize],
        draft: ExamSettingsDraft,
        writer: Arc<CountingWriter>,
    ) -> (ExamController, ManualTicks) {
        let ticks = ManualTicks::new();
        let controller = ExamController::new(
            fixed_clock(),
            bank(answers),
            draft.validate().unwrap(),
            Arc::new(ticks.clone()),
            writer,
        );
        (controller, ticks)
    }

    #[tokio::test]
    async fn blank_identity_keeps_identity_phase() {
        let (mut exam, ticks) =
            controller(&[1], ExamSettingsDraft::default(), Arc::default());
        assert!(!exam.can_start(&IdentityDraft::new("  ")));

        let err = exam.start_session(IdentityDraft::new("  ")).unwrap_err();
        assert!(matches!(
            err,
            ExamError::Session(SessionError::IdentityIncomplete(_))
        ));
        assert_eq!(exam.phase(), Phase::Identity);
        assert_eq!(ticks.acquired(), 0);
    }

    #[tokio::test]
    async fn operations_outside_attempt_are_rejected() {
        let (mut exam, _ticks) =
            controller(&[1], ExamSettingsDraft::default(), Arc::default());
        assert!(matches!(
            exam.select_option(0).unwrap_err(),
            ExamError::WrongPhase {
                expected: Phase::InProgress,
                actual: Phase::Identity
            }
        ));
        assert!(exam.tick().await.is_err());
        assert!(exam.retake().is_err());
    }

    #[tokio::test]
    async fn grading_releases_ticks_and_exports_once() {
        let writer = Arc::new(CountingWriter::default());
        let (mut exam, ticks) =
            controller(&[1, 2], ExamSettingsDraft::default(), Arc::clone(&writer));

        exam.start_session(IdentityDraft::new("Ada")).unwrap();
        assert_eq!(ticks.live_handles(), 1);

        exam.select_option(1).unwrap();
        assert_eq!(exam.advance().await.unwrap(), Step::Moved { position: 1 });
        exam.select_option(2).unwrap();
        assert_eq!(exam.advance().await.unwrap(), Step::Finished);

        assert_eq!(exam.phase(), Phase::Graded);
        assert_eq!(ticks.live_handles(), 0);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);

        let result = exam.result().unwrap();
        assert_eq!(result.correct_count(), 2);
        assert!(result.passed());

        // Nothing after grading may export again.
        assert!(exam.submit().await.is_err());
        assert_eq!(exam.tick().await.unwrap(), TickOutcome::Idle);
        assert!(exam.retry_export().await.unwrap().is_complete());
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn countdown_expiry_grades_with_unanswered_as_wrong() {
        let (mut exam, ticks) = controller(
            &[1, 2],
            ExamSettingsDraft {
                duration_seconds: 2,
                ..ExamSettingsDraft::default()
            },
            Arc::default(),
        );
        exam.start_session(IdentityDraft::new("Ada")).unwrap();
        exam.select_option(1).unwrap();

        assert!(ticks.push());
        exam.next_tick().await;
        assert_eq!(
            exam.tick().await.unwrap(),
            TickOutcome::Running { remaining_seconds: 1 }
        );
        assert_eq!(exam.tick().await.unwrap(), TickOutcome::Expired);

        let result = exam.result().unwrap();
        assert_eq!(result.reason(), CompletionReason::TimeExpired);
        assert_eq!(result.correct_count(), 1);
        assert_eq!(result.percentage().to_string(), "50.00");
        assert_eq!(ticks.live_handles(), 0);
    }

    #[tokio::test]
    async fn export_failure_is_a_notice_and_can_be_retried() {
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (mut exam, _ticks) =
            controller(&[1], ExamSettingsDraft::default(), Arc::clone(&writer));
        exam.start_session(IdentityDraft::new("Ada")).unwrap();
        exam.select_option(1).unwrap();

        let summary = exam.submit().await.unwrap();
        assert!(summary.passed());

        let status = exam.export_status().unwrap();
        assert_eq!(status.notices().len(), 1);
        assert!(status.notices()[0].contains("disk full"));

        exam.retry_export().await.unwrap();
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
        assert!(exam.result().unwrap().passed());
    }

    #[tokio::test]
    async fn retake_starts_from_scratch() {
        let (mut exam, ticks) =
            controller(&[1, 2], ExamSettingsDraft::default(), Arc::default());
        exam.start_session(IdentityDraft::new("Ada")).unwrap();
        exam.select_option(3).unwrap();
        exam.submit().await.unwrap();
        let first_attempt = exam.result().unwrap().attempt_id();

        exam.retake().unwrap();
        assert_eq!(exam.phase(), Phase::Identity);
        assert!(exam.session().is_none());

        let session = exam.start_session(IdentityDraft::new("Bea")).unwrap();
        assert_ne!(session.attempt_id(), first_attempt);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.responses(), &[None, None]);
        assert_eq!(session.remaining_seconds(), 600);
        assert_eq!(ticks.acquired(), 2);
        assert_eq!(ticks.live_handles(), 1);
    }

    #[tokio::test]
    async fn shuffled_exam_still_scores_by_question() {
        let (mut exam, _ticks) = controller(
            &[0, 1, 2, 3],
            ExamSettingsDraft {
                shuffle_questions: true,
                ..ExamSettingsDraft::default()
            },
            Arc::default(),
        );
        exam.start_session(IdentityDraft::new("Ada")).unwrap();
        loop {
            let correct = exam
                .session()
                .and_then(Session::current_question)
                .map(Question::correct_option)
                .unwrap();
            exam.select_option(correct).unwrap();
            if exam.advance().await.unwrap() == Step::Finished {
                break;
            }
        }
        assert_eq!(exam.result().unwrap().correct_count(), 4);
    }
}
