mod terminal;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use exam_core::model::{ExamSettings, QuestionBank};
use services::{
    Clock, ExamController, FileReportWriter, HistoryService, IntervalTicks, load_exam_file,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- run     [--questions <file>] [--db <sqlite_url>] [--out <dir>]"
    );
    eprintln!("                              [--pass-mark <pct>] [--duration <secs>] [--no-store]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--limit <n>] [--json]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:results.sqlite3");
    eprintln!("  --out reports");
    eprintln!("  --limit 20");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_FILE, EXAM_DB_URL, EXAM_OUT_DIR, EXAM_PASS_MARK, EXAM_DURATION_SECS");
    eprintln!("  RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RunArgs {
    questions: Option<PathBuf>,
    db_url: Option<String>,
    out_dir: PathBuf,
    pass_mark: Option<f64>,
    duration_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
struct HistoryArgs {
    db_url: String,
    limit: u32,
    json: bool,
}

const DEFAULT_DB: &str = "sqlite:results.sqlite3";
const DEFAULT_OUT_DIR: &str = "reports";
const DEFAULT_HISTORY_LIMIT: u32 = 20;

fn default_db_url(env: &impl Fn(&str) -> Option<String>) -> String {
    normalize_sqlite_url(env("EXAM_DB_URL").unwrap_or_else(|| DEFAULT_DB.into()))
}

impl RunArgs {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut questions = env("EXAM_FILE").map(PathBuf::from);
        let mut db_url = Some(default_db_url(&env));
        let mut out_dir =
            env("EXAM_OUT_DIR").map_or_else(|| DEFAULT_OUT_DIR.into(), PathBuf::from);
        let mut pass_mark = env("EXAM_PASS_MARK")
            .map(|value| parse_number(value, "EXAM_PASS_MARK"))
            .transpose()?;
        let mut duration_secs = env("EXAM_DURATION_SECS")
            .map(|value| parse_number(value, "EXAM_DURATION_SECS"))
            .transpose()?;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--questions" => questions = Some(require_value(args, "--questions")?.into()),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(normalize_sqlite_url(value));
                }
                "--no-store" => db_url = None,
                "--out" => out_dir = require_value(args, "--out")?.into(),
                "--pass-mark" => {
                    let value = require_value(args, "--pass-mark")?;
                    pass_mark = Some(parse_number(value, "--pass-mark")?);
                }
                "--duration" => {
                    let value = require_value(args, "--duration")?;
                    duration_secs = Some(parse_number(value, "--duration")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            questions,
            db_url,
            out_dir,
            pass_mark,
            duration_secs,
        })
    }
}

impl HistoryArgs {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = default_db_url(&env);
        let mut limit = DEFAULT_HISTORY_LIMIT;
        let mut json = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--limit" => limit = parse_number(require_value(args, "--limit")?, "--limit")?,
                "--json" => json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            limit,
            json,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_storage(db_url: &str) -> Result<Storage, Box<dyn std::error::Error>> {
    // Open + migrate SQLite here so core/services stay storage-agnostic.
    prepare_sqlite_file(db_url)?;
    Ok(Storage::sqlite(db_url).await?)
}

/// Settings precedence: defaults, then the exam file, then env/flags.
async fn resolve_exam(
    args: &RunArgs,
) -> Result<(ExamSettings, QuestionBank), Box<dyn std::error::Error>> {
    let base = ExamSettings::default();
    let (settings, bank) = match &args.questions {
        Some(path) => {
            let file = load_exam_file(path, &base).await?;
            (file.settings, file.bank)
        }
        None => (base, QuestionBank::builtin()),
    };

    let mut draft = settings.to_draft();
    if let Some(pass_mark) = args.pass_mark {
        draft.pass_mark_percent = pass_mark;
    }
    if let Some(duration) = args.duration_secs {
        draft.duration_seconds = duration;
    }
    Ok((draft.validate()?, bank))
}

async fn run_exam(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (settings, bank) = resolve_exam(&args).await?;

    let mut controller = ExamController::new(
        Clock::default_clock(),
        Arc::new(bank),
        settings,
        Arc::new(IntervalTicks::every_second()),
        Arc::new(FileReportWriter::new(args.out_dir.clone())),
    );
    if let Some(db_url) = &args.db_url {
        let storage = open_storage(db_url).await?;
        controller = controller.with_result_store(storage.results);
    }

    tracing::info!(
        questions = controller.bank().len(),
        out_dir = %args.out_dir.display(),
        store = args.db_url.as_deref().unwrap_or("disabled"),
        "exam ready"
    );
    terminal::run(&mut controller).await?;
    Ok(())
}

async fn show_history(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&args.db_url).await?;
    let history = HistoryService::new(storage.results);
    let items = history.list_recent(args.limit).await?;

    if args.json {
        let rows: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "record": item.id,
                    "name": item.name,
                    "id": item.candidate_id,
                    "score": item.score.as_f64(),
                    "passed": item.passed,
                    "date": item.recorded_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No results recorded yet.");
        return Ok(());
    }
    for item in &items {
        let who = match &item.candidate_id {
            Some(id) => format!("{} ({id})", item.name),
            None => item.name.clone(),
        };
        println!(
            "{:>5}  {}  {:>7}%  {}  {who}",
            item.id,
            item.recorded_at.format("%Y-%m-%d %H:%M"),
            item.score.to_string(),
            if item.passed { "PASS" } else { "FAIL" },
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    // Logs go to stderr so prompts on stdout stay readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means taking the exam.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    let mut iter = argv.into_iter();
    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };

    init_tracing();
    match cmd {
        Command::Run => run_exam(RunArgs::parse(&mut iter, env).map_err(report)?).await,
        Command::History => show_history(HistoryArgs::parse(&mut iter, env).map_err(report)?).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn run_defaults_use_store_and_reports_dir() {
        let parsed = RunArgs::parse(&mut args(&[]), no_env).unwrap();
        assert_eq!(parsed.questions, None);
        assert!(parsed.db_url.unwrap().ends_with("results.sqlite3"));
        assert_eq!(parsed.out_dir, PathBuf::from("reports"));
        assert_eq!(parsed.pass_mark, None);
    }

    #[test]
    fn flags_override_environment() {
        let env = |key: &str| match key {
            "EXAM_PASS_MARK" => Some("60".to_string()),
            "EXAM_DURATION_SECS" => Some("300".to_string()),
            _ => None,
        };
        let parsed = RunArgs::parse(&mut args(&["--pass-mark", "80.5", "--no-store"]), env)
            .unwrap();
        assert_eq!(parsed.pass_mark, Some(80.5));
        assert_eq!(parsed.duration_secs, Some(300));
        assert_eq!(parsed.db_url, None);
    }

    #[test]
    fn bad_numbers_and_unknown_flags_are_rejected() {
        let err = RunArgs::parse(&mut args(&["--duration", "soon"]), no_env).unwrap_err();
        assert_eq!(err.to_string(), "invalid --duration value: soon");

        let err = RunArgs::parse(&mut args(&["--duration"]), no_env).unwrap_err();
        assert_eq!(err.to_string(), "--duration requires a value");

        let err = HistoryArgs::parse(&mut args(&["--verbose"]), no_env).unwrap_err();
        assert_eq!(err.to_string(), "unknown argument: --verbose");
    }

    #[test]
    fn bad_environment_numbers_are_reported() {
        let env = |key: &str| match key {
            "EXAM_DURATION_SECS" => Some("soon".to_string()),
            _ => None,
        };
        let err = RunArgs::parse(&mut args(&[]), env).unwrap_err();
        assert_eq!(err.to_string(), "invalid EXAM_DURATION_SECS value: soon");

        let env = |key: &str| match key {
            "EXAM_PASS_MARK" => Some("high".to_string()),
            _ => None,
        };
        let err = RunArgs::parse(&mut args(&["--pass-mark", "80"]), env).unwrap_err();
        assert_eq!(err.to_string(), "invalid EXAM_PASS_MARK value: high");
    }

    #[test]
    fn history_flags() {
        let parsed = HistoryArgs::parse(
            &mut args(&["--db", "sqlite::memory:", "--limit", "5", "--json"]),
            no_env,
        )
        .unwrap();
        assert_eq!(
            parsed,
            HistoryArgs {
                db_url: "sqlite::memory:".into(),
                limit: 5,
                json: true,
            }
        );
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:/tmp/exam.db".into()),
            "sqlite:///tmp/exam.db"
        );
    }

    #[tokio::test]
    async fn flags_apply_on_top_of_exam_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exam.toml");
        std::fs::write(&path, "[exam]\npass_mark = 90\nduration_secs = 120\n").unwrap();

        let parsed = RunArgs {
            questions: Some(path),
            db_url: None,
            out_dir: dir.path().to_path_buf(),
            pass_mark: Some(50.0),
            duration_secs: None,
        };
        let (settings, bank) = resolve_exam(&parsed).await.unwrap();
        assert_eq!(settings.pass_mark().to_string(), "50.00");
        assert_eq!(settings.duration_seconds(), 120);
        assert_eq!(bank.len(), QuestionBank::builtin().len());
    }
}
