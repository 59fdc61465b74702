use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{
    CompletionReason, ExamSettingsDraft, IdentityDraft, Phase, Question, QuestionBank,
    QuestionId, ResultRecord, ResultSummary, SessionError, Step, TickOutcome,
};
use exam_core::time::fixed_now;
use services::{
    Clock, ExamController, ExamError, FileReportWriter, HistoryService, IntervalTicks,
    ManualTicks, ReportArtifact, ReportError, ReportFormat, ReportWriter,
};
use storage::repository::{
    InMemoryRepository, ResultRecordId, ResultRecordRepository, ResultRecordRow, StorageError,
};

/// Keeps every summary it is asked to write.
#[derive(Default)]
struct RecordingWriter {
    written: Mutex<Vec<ResultSummary>>,
}

impl RecordingWriter {
    fn count(&self) -> usize {
        self.written.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportWriter for RecordingWriter {
    async fn write(&self, summary: &ResultSummary) -> Result<Vec<ReportArtifact>, ReportError> {
        self.written.lock().unwrap().push(summary.clone());
        Ok(Vec::new())
    }
}

/// A result store that is always unreachable.
struct OfflineStore;

#[async_trait]
impl ResultRecordRepository for OfflineStore {
    async fn append_record(
        &self,
        _record: &ResultRecord,
    ) -> Result<ResultRecordId, StorageError> {
        Err(StorageError::Connection("database is locked".into()))
    }

    async fn get_record(
        &self,
        _id: ResultRecordId,
    ) -> Result<ResultRecord, StorageError> {
        Err(StorageError::NotFound)
    }

    async fn list_records(&self, _limit: u32) -> Result<Vec<ResultRecordRow>, StorageError> {
        Ok(Vec::new())
    }
}

fn two_question_bank() -> Arc<QuestionBank> {
    let options = || vec!["a".to_string(), "b".into(), "c".into(), "d".into()];
    Arc::new(
        QuestionBank::new(vec![
            Question::new(QuestionId::new(1), "First", options(), 1).unwrap(),
            Question::new(QuestionId::new(2), "Second", options(), 2).unwrap(),
        ])
        .unwrap(),
    )
}

fn exam_with(
    bank: Arc<QuestionBank>,
    draft: ExamSettingsDraft,
    writer: Arc<dyn ReportWriter>,
) -> (ExamController, ManualTicks) {
    let ticks = ManualTicks::new();
    let exam = ExamController::new(
        Clock::fixed(fixed_now()),
        bank,
        draft.validate().unwrap(),
        Arc::new(ticks.clone()),
        writer,
    );
    (exam, ticks)
}

async fn answer_all(exam: &mut ExamController, answers: &[usize]) {
    for &answer in answers {
        exam.select_option(answer).unwrap();
        exam.advance().await.unwrap();
    }
}

#[tokio::test]
async fn all_correct_answers_pass() {
    let writer = Arc::new(RecordingWriter::default());
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        writer.clone(),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    answer_all(&mut exam, &[1, 2]).await;

    let result = exam.result().unwrap();
    assert_eq!(result.correct_count(), 2);
    assert_eq!(result.percentage().to_string(), "100.00");
    assert!(result.passed());
    assert_eq!(result.reason(), CompletionReason::Completed);
    assert_eq!(writer.count(), 1);
}

#[tokio::test]
async fn half_correct_fails_default_pass_mark() {
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        Arc::new(RecordingWriter::default()),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    answer_all(&mut exam, &[1, 0]).await;

    let result = exam.result().unwrap();
    assert_eq!(result.correct_count(), 1);
    assert_eq!(result.percentage().to_string(), "50.00");
    assert!(!result.passed());
    assert_eq!(result.verdict(), "FAIL");
}

#[tokio::test]
async fn timeout_counts_unanswered_last_question_as_wrong() {
    let (mut exam, ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft {
            duration_seconds: 3,
            ..ExamSettingsDraft::default()
        },
        Arc::new(RecordingWriter::default()),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    answer_all(&mut exam, &[1]).await;

    let mut outcome = TickOutcome::Idle;
    for _ in 0..3 {
        assert!(ticks.push());
        exam.next_tick().await;
        outcome = exam.tick().await.unwrap();
    }
    assert_eq!(outcome, TickOutcome::Expired);
    assert_eq!(exam.phase(), Phase::Graded);
    assert_eq!(exam.progress().unwrap().remaining_seconds, 0);

    let result = exam.result().unwrap();
    assert_eq!(result.reason(), CompletionReason::TimeExpired);
    assert_eq!(result.correct_count(), 1);
    assert_eq!(result.total_count(), 2);

    // The producer is gone and late ticks change nothing.
    assert_eq!(ticks.live_handles(), 0);
    assert!(!ticks.push());
    assert_eq!(exam.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(exam.progress().unwrap().remaining_seconds, 0);
}

#[tokio::test]
async fn out_of_range_selection_leaves_responses_untouched() {
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        Arc::new(RecordingWriter::default()),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    exam.select_option(2).unwrap();

    let err = exam.select_option(99).unwrap_err();
    assert!(matches!(
        err,
        ExamError::Session(SessionError::OptionOutOfRange { index: 99, count: 4 })
    ));
    assert_eq!(exam.session().unwrap().responses(), &[Some(2), None]);
}

#[tokio::test]
async fn retake_resets_position_answers_and_countdown() {
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft {
            duration_seconds: 90,
            ..ExamSettingsDraft::default()
        },
        Arc::new(RecordingWriter::default()),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    exam.tick().await.unwrap();
    answer_all(&mut exam, &[1, 2]).await;
    assert_eq!(exam.phase(), Phase::Graded);

    exam.retake().unwrap();
    let session = exam.start_session(IdentityDraft::new("Ada")).unwrap();
    assert_eq!(session.current_index(), 0);
    assert!(session.responses().iter().all(Option::is_none));
    assert_eq!(session.remaining_seconds(), 90);
}

#[tokio::test]
async fn grading_twice_writes_reports_once() {
    let writer = Arc::new(RecordingWriter::default());
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        writer.clone(),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    exam.select_option(1).unwrap();

    exam.submit().await.unwrap();
    assert!(matches!(
        exam.submit().await.unwrap_err(),
        ExamError::WrongPhase {
            expected: Phase::InProgress,
            actual: Phase::Graded
        }
    ));
    exam.retry_export().await.unwrap();

    assert_eq!(writer.count(), 1);
    assert_eq!(exam.result().unwrap().reason(), CompletionReason::Submitted);
}

#[tokio::test]
async fn empty_bank_grades_to_zero_and_fails() {
    let (mut exam, _ticks) = exam_with(
        Arc::new(QuestionBank::empty()),
        ExamSettingsDraft::default(),
        Arc::new(RecordingWriter::default()),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    assert_eq!(exam.advance().await.unwrap(), Step::Finished);

    let result = exam.result().unwrap();
    assert_eq!(result.total_count(), 0);
    assert_eq!(result.percentage().hundredths(), 0);
    assert!(!result.passed());
}

#[tokio::test]
async fn required_candidate_id_blocks_start() {
    let (mut exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft {
            require_candidate_id: true,
            ..ExamSettingsDraft::default()
        },
        Arc::new(RecordingWriter::default()),
    );
    let draft = IdentityDraft::new("Ada");
    assert!(!exam.can_start(&draft));
    assert!(exam.start_session(draft).is_err());
    assert_eq!(exam.phase(), Phase::Identity);

    let draft = IdentityDraft::new("Ada").with_candidate_id("S-17");
    assert!(exam.can_start(&draft));
    exam.start_session(draft).unwrap();
    assert_eq!(exam.phase(), Phase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn interval_ticks_expire_a_short_exam() {
    let writer = Arc::new(RecordingWriter::default());
    let mut exam = ExamController::new(
        Clock::fixed(fixed_now()),
        two_question_bank(),
        ExamSettingsDraft {
            duration_seconds: 3,
            ..ExamSettingsDraft::default()
        }
        .validate()
        .unwrap(),
        Arc::new(IntervalTicks::every_second()),
        writer.clone(),
    );
    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    let started = tokio::time::Instant::now();

    loop {
        exam.next_tick().await;
        if exam.tick().await.unwrap() == TickOutcome::Expired {
            break;
        }
    }

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(exam.phase(), Phase::Graded);
    assert_eq!(writer.count(), 1);
}

#[tokio::test]
async fn graded_attempt_lands_in_files_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let (exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        Arc::new(FileReportWriter::new(dir.path())),
    );
    let mut exam = exam.with_result_store(repo.clone());

    exam.start_session(IdentityDraft::new("Ada Lovelace").with_candidate_id("A1"))
        .unwrap();
    answer_all(&mut exam, &[1, 2]).await;

    let status = exam.export_status().unwrap();
    assert!(status.is_complete());

    let text = std::fs::read_to_string(dir.path().join("Ada Lovelace_A1_result.txt")).unwrap();
    assert_eq!(
        text,
        "Name: Ada Lovelace\nID: A1\nScore: 2 / 2\nPercentage: 100.00%\nResult: PASS\n"
    );
    let identity = exam.result().unwrap().identity().clone();
    assert!(dir.path().join(ReportFormat::Pdf.file_name(&identity)).exists());

    let history = HistoryService::new(repo);
    let items = history.list_recent(5).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Ada Lovelace");
    assert_eq!(items[0].candidate_id.as_deref(), Some("A1"));
    assert_eq!(items[0].score.to_string(), "100.00");
    assert!(items[0].passed);
}

#[tokio::test]
async fn retry_after_store_failure_keeps_reports_that_produced_no_files() {
    let writer = Arc::new(RecordingWriter::default());
    let (exam, _ticks) = exam_with(
        two_question_bank(),
        ExamSettingsDraft::default(),
        writer.clone(),
    );
    let mut exam = exam.with_result_store(Arc::new(OfflineStore));

    exam.start_session(IdentityDraft::new("Ada")).unwrap();
    exam.select_option(1).unwrap();
    exam.submit().await.unwrap();

    for _ in 0..2 {
        let status = exam.retry_export().await.unwrap();
        assert_eq!(status.notices().len(), 1);
        assert!(status.notices()[0].starts_with("history not saved"));
    }
    assert_eq!(writer.count(), 1);
}
