use std::fmt;

use chrono::{DateTime, Utc};
use course_core::model::{
    Course, CourseId, ExpiryPolicy, Lecture, LectureId, Lesson, LessonId, OptionId, Question,
    QuestionId, QuestionOption, Quiz, QuizId, User, UserId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    user_name: String,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut user_id = std::env::var("COURSE_USER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut user_name = std::env::var("COURSE_USER_NAME").unwrap_or_else(|_| "Dana".into());
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    user_id = UserId::new(parsed);
                }
                "--user-name" => {
                    let value = require_value(&mut args, "--user-name")?;
                    user_name = value;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
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
            user_id,
            user_name,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --user-id <id>            Learner id to upsert (default: 1)");
    eprintln!("  --user-name <name>        Learner name (default: Dana)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_USER_ID, COURSE_USER_NAME");
}

fn question(
    id: u64,
    quiz_id: QuizId,
    text: &str,
    options: &[(&str, bool)],
) -> Result<Question, Box<dyn std::error::Error>> {
    let options = options
        .iter()
        .enumerate()
        .map(|(i, (text, is_correct))| QuestionOption {
            id: OptionId::new(id * 10 + i as u64 + 1),
            text: (*text).to_owned(),
            is_correct: *is_correct,
        })
        .collect();
    Ok(Question::new(QuestionId::new(id), quiz_id, text, options)?)
}

#[allow(clippy::too_many_lines)]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let learner = User::new(args.user_id, args.user_name.clone(), now)?;
    storage.users.upsert_user(&learner).await?;
    let author = User::new(UserId::new(100), "Prof. Ferris", now)?;
    storage.users.upsert_user(&author).await?;

    // One demo course: two lectures, two lessons each, a quiz per lecture.
    let course_id = CourseId::new(1);
    let mut course = Course::new(
        course_id,
        "Rust Fundamentals",
        ExpiryPolicy::after_days(90)?,
        author.id(),
        now,
    )?;

    let mut lecture_basics = Lecture::new(LectureId::new(10), course_id, "Getting Started", now)?;
    let mut lecture_ownership = Lecture::new(LectureId::new(20), course_id, "Ownership", now)?;

    let lesson_install = Lesson::new(
        LessonId::new(11),
        lecture_basics.id(),
        "Installing the toolchain",
        Some("https://videos.example.com/install.mp4"),
        &["https://doc.rust-lang.org/book/ch01-01-installation.html"],
        now,
    )?;
    let mut lesson_cargo = Lesson::new(
        LessonId::new(12),
        lecture_basics.id(),
        "Hello, Cargo",
        None,
        &[],
        now,
    )?;
    let lesson_moves = Lesson::new(
        LessonId::new(21),
        lecture_ownership.id(),
        "Moves and copies",
        None,
        &["https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"],
        now,
    )?;
    let mut lesson_borrows = Lesson::new(
        LessonId::new(22),
        lecture_ownership.id(),
        "Borrowing",
        Some("https://videos.example.com/borrowing.mp4"),
        &[],
        now,
    )?;

    let quiz_cargo = Quiz::new(
        QuizId::new(1),
        lesson_cargo.id(),
        lecture_basics.id(),
        course_id,
        "Toolchain check",
        30,
        3,
        author.id(),
        now,
    )?;
    let quiz_ownership = Quiz::new(
        QuizId::new(2),
        lesson_borrows.id(),
        lecture_ownership.id(),
        course_id,
        "Ownership check",
        45,
        2,
        author.id(),
        now,
    )?;
    lesson_cargo.attach_quiz(quiz_cargo.id())?;
    lesson_borrows.attach_quiz(quiz_ownership.id())?;

    lecture_basics.push_lesson(lesson_install.id());
    lecture_basics.push_lesson(lesson_cargo.id());
    lecture_ownership.push_lesson(lesson_moves.id());
    lecture_ownership.push_lesson(lesson_borrows.id());
    course.push_lecture(lecture_basics.id());
    course.push_lecture(lecture_ownership.id());
    course.publish();

    storage.catalog.upsert_course(&course).await?;
    storage.catalog.upsert_lecture(&lecture_basics).await?;
    storage.catalog.upsert_lecture(&lecture_ownership).await?;
    for lesson in [&lesson_install, &lesson_cargo, &lesson_moves, &lesson_borrows] {
        storage.catalog.upsert_lesson(lesson).await?;
    }
    storage.quizzes.upsert_quiz(&quiz_cargo).await?;
    storage.quizzes.upsert_quiz(&quiz_ownership).await?;

    let questions = [
        question(
            1,
            quiz_cargo.id(),
            "What does `cargo new` scaffold?",
            &[
                ("A project with Cargo.toml and src/main.rs", true),
                ("A compiled release binary", false),
                ("A crates.io account", false),
            ],
        )?,
        question(
            2,
            quiz_cargo.id(),
            "Which file records the exact dependency versions in use?",
            &[
                ("Cargo.lock", true),
                ("Cargo.toml", false),
                ("rust-toolchain.toml", false),
            ],
        )?,
        question(
            3,
            quiz_ownership.id(),
            "Which of these types is Copy?",
            &[("u64", true), ("String", false), ("Vec<u8>", false)],
        )?,
        question(
            4,
            quiz_ownership.id(),
            "What does an &mut T reference guarantee?",
            &[
                ("Exclusive access while it lives", true),
                ("Shared ownership of T", false),
                ("A deep copy of T", false),
            ],
        )?,
        question(
            5,
            quiz_ownership.id(),
            "When is a value dropped?",
            &[
                ("When its owner goes out of scope", true),
                ("At the end of main", false),
                ("After its first borrow", false),
            ],
        )?,
    ];
    for q in &questions {
        storage.quizzes.upsert_question(q).await?;
    }

    println!(
        "Seeded learner {} ({}) and course {} with 2 lectures, 4 lessons, 2 quizzes, {} questions into {}",
        learner.id().value(),
        learner.name(),
        course.id().value(),
        questions.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
