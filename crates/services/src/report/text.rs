use std::fmt::Write as _;

use exam_core::model::ResultSummary;

/// Plain-text rendering of a graded attempt.
///
/// ```text
/// Name: Ada
/// Score: 1 / 2
/// Percentage: 50.00%
/// Result: FAIL
/// ```
#[must_use]
pub fn render_text(summary: &ResultSummary) -> String {
    let identity = summary.identity();
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", identity.name());
    if let Some(id) = identity.candidate_id() {
        let _ = writeln!(out, "ID: {id}");
    }
    let _ = writeln!(
        out,
        "Score: {} / {}",
        summary.correct_count(),
        summary.total_count()
    );
    let _ = writeln!(out, "Percentage: {}%", summary.percentage());
    let _ = writeln!(out, "Result: {}", summary.verdict());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{
        AttemptId, CompletionReason, IdentityDraft, Percentage, ResultSummary,
    };
    use exam_core::time::fixed_now;

    fn summary(draft: IdentityDraft, correct: u32, total: u32) -> ResultSummary {
        ResultSummary::new(
            AttemptId::generate(),
            draft.validate(false).unwrap(),
            correct,
            total,
            Percentage::from_percent(75.0).unwrap(),
            CompletionReason::Completed,
            fixed_now(),
        )
    }

    #[test]
    fn renders_the_four_result_lines() {
        let text = render_text(&summary(IdentityDraft::new("Ada"), 1, 2));
        assert_eq!(
            text,
            "Name: Ada\nScore: 1 / 2\nPercentage: 50.00%\nResult: FAIL\n"
        );
    }

    #[test]
    fn includes_candidate_id_when_present() {
        let text = render_text(&summary(
            IdentityDraft::new("Ada").with_candidate_id("S-7"),
            2,
            2,
        ));
        assert!(text.starts_with("Name: Ada\nID: S-7\n"));
        assert!(text.ends_with("Result: PASS\n"));
    }
}
