//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{
    AttemptError, CourseError, Enrollment, LectureError, LessonError, QuestionError, QuizError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("user not found")]
    UserNotFound,
    #[error("course not found")]
    CourseNotFound,
    /// The existing record rides along so callers can treat the failure as
    /// already-done.
    #[error("already enrolled in this course")]
    AlreadyEnrolled {
        enrollment: Enrollment,
        is_expired: bool,
    },
    #[error("active enrollment limit of {limit} reached")]
    LimitExceeded { limit: usize },
    #[error("not enrolled in this course")]
    NotEnrolled,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("course not found")]
    CourseNotFound,
    #[error("no progress recorded for this course")]
    ProgressNotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error("quiz not found")]
    QuizNotFound,
    #[error("attempt not found")]
    AttemptNotFound,
    #[error("attempt belongs to another user")]
    Forbidden,
    #[error("maximum of {max} attempts reached")]
    MaxAttemptsReached { max: u32 },
    #[error("quiz has no questions")]
    NoQuestions,
    #[error("corrupted reference: {0}")]
    DataIntegrity(String),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("course not found")]
    CourseNotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course not found")]
    CourseNotFound,
    #[error("lecture not found")]
    LectureNotFound,
    #[error("lesson not found")]
    LessonNotFound,
    #[error("quiz not found")]
    QuizNotFound,
    #[error("lesson already has a quiz")]
    LessonAlreadyHasQuiz,
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Lecture(#[from] LectureError),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
