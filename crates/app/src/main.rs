use std::fmt;

use course_core::model::{CourseId, UserId};
use services::{AppServices, Clock, EnrollmentError, EnrollmentStatus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- enroll    --user <id> --course <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- progress  --user <id> --course <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history   --user <id> --course <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- reconcile --user <id> --course <id> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Enroll,
    Progress,
    History,
    Reconcile,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "enroll" => Some(Self::Enroll),
            "progress" => Some(Self::Progress),
            "history" => Some(Self::History),
            "reconcile" => Some(Self::Reconcile),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: UserId,
    course_id: CourseId,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("COURSE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut user_id: Option<UserId> = None;
        let mut course_id: Option<CourseId> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let parsed: u64 = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--user",
                        raw: value.clone(),
                    })?;
                    user_id = Some(UserId::new(parsed));
                }
                "--course" => {
                    let value = require_value(args, "--course")?;
                    let parsed: u64 = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--course",
                        raw: value.clone(),
                    })?;
                    course_id = Some(CourseId::new(parsed));
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
            user_id: user_id.ok_or(ArgsError::MissingFlag { flag: "--user" })?,
            course_id: course_id.ok_or(ArgsError::MissingFlag { flag: "--course" })?,
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock()).await?;

    match cmd {
        Command::Enroll => {
            match services
                .enrollment()
                .enroll(parsed.user_id, parsed.course_id)
                .await
            {
                Ok(status) => print_enrollment(&status, false)?,
                Err(EnrollmentError::AlreadyEnrolled {
                    enrollment,
                    is_expired,
                }) => {
                    let status = EnrollmentStatus {
                        enrollment,
                        is_expired,
                    };
                    print_enrollment(&status, true)?;
                }
                Err(other) => return Err(other.into()),
            }
            Ok(())
        }
        Command::Progress => {
            let view = services
                .progress()
                .get_course_progress(parsed.user_id, parsed.course_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::History => {
            let history = services
                .history()
                .get_history(parsed.user_id, parsed.course_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }
        Command::Reconcile => {
            let progress = services.progress();
            progress.reconcile(parsed.user_id, parsed.course_id).await?;
            let view = progress
                .get_course_progress(parsed.user_id, parsed.course_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
    }
}

fn print_enrollment(
    status: &EnrollmentStatus,
    already_enrolled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = serde_json::json!({
        "user_id": status.enrollment.user_id().value(),
        "course_id": status.enrollment.course_id().value(),
        "enrolled_at": status.enrollment.enrolled_at().to_rfc3339(),
        "expires_at": status.enrollment.expires_at().map(|at| at.to_rfc3339()),
        "is_expired": status.is_expired,
        "already_enrolled": already_enrolled,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
