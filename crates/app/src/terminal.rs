//! Line-oriented exam loop over stdin/stdout.

use exam_core::model::{IdentityDraft, Phase, Step, TickOutcome};
use exam_core::time::format_countdown;
use services::report::render_text;
use services::{ExamController, ExamError, ExportStatus};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

/// What the candidate typed while a question is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Select(usize),
    Next,
    Previous,
    Submit,
    Quit,
}

fn parse_action(line: &str) -> Option<Action> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "n" | "next" => Some(Action::Next),
        "p" | "prev" | "previous" => Some(Action::Previous),
        "s" | "submit" => Some(Action::Submit),
        "q" | "quit" => Some(Action::Quit),
        other => other
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(Action::Select),
    }
}

enum Event {
    Input(Option<String>),
    Tick,
}

/// Run candidates through the exam until stdin closes or someone quits.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub async fn run(exam: &mut ExamController) -> std::io::Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let keep_going = match exam.phase() {
            Phase::Identity => identity_step(exam, &mut input).await?,
            Phase::InProgress => question_step(exam, &mut input).await?,
            Phase::Graded => result_step(exam, &mut input).await?,
        };
        if !keep_going {
            return Ok(());
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> std::io::Result<Option<String>> {
    println!("{label}");
    input.next_line().await
}

fn candidate_id_label(required: bool) -> &'static str {
    if required {
        "Candidate ID:"
    } else {
        "Candidate ID (optional, enter to skip):"
    }
}

/// A blank ID line means the candidate has none.
fn identity_draft(name: String, id_line: &str) -> IdentityDraft {
    let draft = IdentityDraft::new(name);
    match id_line.trim() {
        "" => draft,
        id => draft.with_candidate_id(id),
    }
}

async fn identity_step(exam: &mut ExamController, input: &mut Input) -> std::io::Result<bool> {
    println!();
    println!("=== Online Exam ===");
    let Some(name) = prompt(input, "Name:").await? else {
        return Ok(false);
    };
    let label = candidate_id_label(exam.settings().require_candidate_id());
    let Some(id) = prompt(input, label).await? else {
        return Ok(false);
    };
    let draft = identity_draft(name, &id);

    if !exam.can_start(&draft) {
        println!("Please fill in all required fields.");
        return Ok(true);
    }
    match exam.start_session(draft) {
        Ok(_) => show_question(exam),
        Err(err) => println!("{err}"),
    }
    Ok(true)
}

fn show_question(exam: &ExamController) {
    let (Some(session), Some(progress)) = (exam.session(), exam.progress()) else {
        return;
    };
    println!();
    println!(
        "Question {} of {}  [{} left]",
        progress.position + 1,
        progress.total,
        format_countdown(progress.remaining_seconds)
    );
    let Some(question) = session.current_question() else {
        println!("No questions in this exam. Press enter to finish.");
        return;
    };
    println!("{}", question.prompt());
    let chosen = session.response(progress.position);
    for (index, option) in question.options().iter().enumerate() {
        let mark = if chosen == Some(index) { '*' } else { ' ' };
        println!(" {mark} {}) {option}", index + 1);
    }
    let hint = if progress.is_last() { "enter=finish" } else { "enter=next" };
    println!("[1-{}] answer, {hint}, p=previous, s=submit, q=quit", question.option_count());
}

async fn question_step(exam: &mut ExamController, input: &mut Input) -> std::io::Result<bool> {
    let event = tokio::select! {
        line = input.next_line() => Event::Input(line?),
        () = exam.next_tick() => Event::Tick,
    };

    match event {
        Event::Tick => on_tick(exam).await,
        // stdin closed mid-exam: hand in what we have.
        Event::Input(None) => {
            report(exam.submit().await.map(|_| ()));
            return Ok(true);
        }
        Event::Input(Some(line)) => match parse_action(&line) {
            None => println!("Unrecognised input: {}", line.trim()),
            Some(Action::Quit) => return Ok(false),
            Some(Action::Select(option)) => {
                if report(exam.select_option(option)) {
                    show_question(exam);
                }
            }
            Some(Action::Next) => match exam.advance().await {
                Ok(Step::Moved { .. }) => show_question(exam),
                Ok(Step::Finished) => {}
                Err(err) => println!("{err}"),
            },
            Some(Action::Previous) => {
                if report(exam.retreat().map(|_| ())) {
                    show_question(exam);
                }
            }
            Some(Action::Submit) => {
                report(exam.submit().await.map(|_| ()));
            }
        },
    }
    Ok(true)
}

async fn on_tick(exam: &mut ExamController) {
    match exam.tick().await {
        Ok(TickOutcome::Running { remaining_seconds }) => {
            if remaining_seconds % 60 == 0 || remaining_seconds <= 10 {
                println!("[{} left]", format_countdown(remaining_seconds));
            }
        }
        Ok(TickOutcome::Expired) => println!("Time is up."),
        Ok(TickOutcome::Idle) => {}
        Err(err) => println!("{err}"),
    }
}

fn report(outcome: Result<(), ExamError>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            println!("{err}");
            false
        }
    }
}

async fn result_step(exam: &mut ExamController, input: &mut Input) -> std::io::Result<bool> {
    if let Some(result) = exam.result() {
        println!();
        println!("=== Exam Results ===");
        print!("{}", render_text(result));
    }
    if let Some(status) = exam.export_status() {
        if let ExportStatus::Complete(receipt) = status {
            for artifact in &receipt.artifacts {
                println!("Saved {}", artifact.path.display());
            }
        }
        for notice in status.notices() {
            println!("Note: {notice}");
        }
    }

    loop {
        let Some(line) = prompt(input, "r=retake, e=retry saving, q=quit").await? else {
            return Ok(false);
        };
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "retake" => {
                report(exam.retake());
                return Ok(true);
            }
            "e" | "retry" => {
                if let Err(err) = exam.retry_export().await {
                    println!("{err}");
                }
                return Ok(true);
            }
            "q" | "quit" => return Ok(false),
            _ => {}
        }
    }
}
