use std::fmt;
use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use services::{AppServices, AssessmentProvider, Clock, EnvironmentProbe, HISTORY_LIMIT};
use yle_core::grading::grade_session;
use yle_core::model::{AssessmentId, SessionStatus, StudentId};

mod catalog;
mod take;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidStudentId { raw: String },
    InvalidAssessmentId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStudentId { raw } => write!(f, "invalid --student value: {raw:?}"),
            ArgsError::InvalidAssessmentId { raw } => {
                write!(f, "invalid --assessment value: {raw:?}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug)]
enum RunError {
    UnknownAssessment(AssessmentId),
    OrphanedSession(AssessmentId),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::UnknownAssessment(id) => write!(f, "unknown assessment: {id}"),
            RunError::OrphanedSession(id) => write!(
                f,
                "current session uses assessment {id}, which is not in the catalog; run `clear` first"
            ),
        }
    }
}

impl std::error::Error for RunError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

struct Args {
    db_url: String,
    student_id: StudentId,
    assessment_id: Option<AssessmentId>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [take] [--db <sqlite_url>] [--student <id>] [--assessment <id>]");
    eprintln!("  cargo run -p app -- status  [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--student <id>]");
    eprintln!("  cargo run -p app -- clear   [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://yle.sqlite3");
    eprintln!("  --student student");
    eprintln!("  --assessment {}", catalog::DEFAULT_ASSESSMENT);
    eprintln!();
    eprintln!("While taking a test, type an answer (or an option number), or one of:");
    eprintln!("  :next  :prev  :goto <n>  :pause  :finish  :quit");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  YLE_DB_URL, YLE_STUDENT_ID, YLE_USER_AGENT,");
    eprintln!("  YLE_HIGH_CONTRAST, YLE_REDUCED_MOTION, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Status,
    History,
    Clear,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "status" => Some(Self::Status),
            "history" => Some(Self::History),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("YLE_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("yle.sqlite3".into()), normalize_sqlite_url);
        let mut student_id = std::env::var("YLE_STUDENT_ID")
            .ok()
            .and_then(|value| value.parse::<StudentId>().ok())
            .unwrap_or_else(|| StudentId::new("student"));
        let mut assessment_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--student" => {
                    let value = require_value(args, "--student")?;
                    student_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidStudentId { raw: value.clone() })?;
                }
                "--assessment" => {
                    let value = require_value(args, "--assessment")?;
                    let parsed = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidAssessmentId { raw: value.clone() })?;
                    assessment_id = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            student_id,
            assessment_id,
        })
    }
}

fn environment_probe() -> EnvironmentProbe {
    let user_agent = std::env::var("YLE_USER_AGENT").unwrap_or_else(|_| {
        format!(
            "yle-terminal/{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        )
    });
    EnvironmentProbe::new(user_agent)
        .with_high_contrast(env_flag("YLE_HIGH_CONTRAST"))
        .with_reduced_motion(env_flag("YLE_REDUCED_MOTION"))
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,app=info,services=info,storage=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means take.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    // Open + migrate SQLite in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let clock = Clock::default_clock();
    let catalog: Arc<dyn AssessmentProvider> = Arc::new(catalog::built_in(clock.now())?);
    let services =
        AppServices::new_sqlite(&parsed.db_url, clock, catalog, environment_probe()).await?;
    info!(db = %parsed.db_url, command = ?cmd, "storage ready");

    match cmd {
        Command::Take => take_command(&services, &parsed).await,
        Command::Status => status_command(&services).await,
        Command::History => history_command(&services, &parsed).await,
        Command::Clear => {
            services.session_manager().clear_session().await?;
            println!("Current session cleared. History is kept.");
            Ok(())
        }
    }
}

async fn take_command(
    services: &AppServices,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = services.catalog();
    let mut manager = services.session_manager();

    // Resume an unfinished session for this student unless another test was asked for.
    let resumable = manager
        .current_session()
        .await
        .filter(|session| {
            !session.status().is_terminal()
                && session.student_id() == &args.student_id
                && args
                    .assessment_id
                    .as_ref()
                    .is_none_or(|wanted| wanted == session.assessment_id())
        })
        .map(|session| session.assessment_id().clone());

    let assessment = if let Some(id) = resumable {
        let assessment = catalog
            .assessment(&id)
            .ok_or(RunError::OrphanedSession(id))?;
        println!("Resuming {}.", assessment.title());
        assessment
    } else {
        let id = args
            .assessment_id
            .clone()
            .unwrap_or_else(|| AssessmentId::new(catalog::DEFAULT_ASSESSMENT));
        let assessment = catalog
            .assessment(&id)
            .ok_or(RunError::UnknownAssessment(id))?;
        manager
            .create_for_assessment(args.student_id.clone(), assessment)
            .await?;
        println!("{}\n\n{}", assessment.title(), assessment.instructions());
        assessment
    };

    match manager.session().map(|session| session.status()) {
        Some(SessionStatus::NotStarted) => manager.start_session().await?,
        Some(SessionStatus::Paused) => manager.resume_session().await?,
        _ => {}
    }

    let input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    let outcome = take::take(&mut manager, assessment, input, &mut out).await?;
    info!(outcome = ?outcome, "take finished");
    Ok(())
}

async fn status_command(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = services.catalog();
    let mut manager = services.session_manager();
    let Some(session) = manager.current_session().await.cloned() else {
        println!("No current session.");
        return Ok(());
    };

    println!("Session:    {}", session.id());
    println!("Student:    {}", session.student_id());
    println!("Assessment: {}", session.assessment_id());
    println!("Status:     {}", session.status());
    println!("Started:    {}", session.start_time().to_rfc3339());
    if let Some(assessment) = catalog.assessment(session.assessment_id()) {
        if let Some(progress) = manager.progress(assessment.question_count()) {
            println!(
                "Progress:   {}/{} answered ({}%), on question {}",
                progress.answered,
                progress.total,
                progress.percentage,
                progress.current_index + 1
            );
        }
        if session.status() == SessionStatus::Completed {
            take::print_result(&grade_session(&session, assessment)?, &mut std::io::stdout())?;
            return Ok(());
        }
    } else {
        println!("Answered:   {}", session.answers().len());
    }
    println!(
        "Time left:  {}:{:02}",
        session.time_remaining() / 60,
        session.time_remaining() % 60
    );
    Ok(())
}

async fn history_command(
    services: &AppServices,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let history = services.history();
    let catalog = services.catalog();
    let items = history.for_student(&args.student_id).await?;
    if items.is_empty() {
        println!("No completed sessions for {}.", args.student_id);
        return Ok(());
    }

    let results = history.results(catalog.as_ref()).await?;
    for item in items.iter().take(HISTORY_LIMIT) {
        let completed = item
            .completed_at
            .map_or_else(|| "-".to_owned(), |at| at.to_rfc3339());
        let score = results
            .iter()
            .find(|result| result.session_id == item.session_id)
            .map_or_else(
                || format!("{} answered", item.answered),
                |result| {
                    format!(
                        "{}/{} ({}%){}",
                        result.total_score,
                        result.max_score,
                        result.percentage,
                        if result.passed { " passed" } else { "" }
                    )
                },
            );
        println!("{completed}  {}  {score}", item.assessment_id);
    }
    Ok(())
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

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
