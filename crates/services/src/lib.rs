#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempt_service;
pub mod catalog_service;
pub mod enrollment_service;
pub mod error;
pub mod history_service;
pub mod progress;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use attempt_service::{AttemptService, AttemptSession, OptionView, QuestionView, ScoredAttempt};
pub use catalog_service::CatalogService;
pub use enrollment_service::{EnrollmentService, EnrollmentStatus, is_enrollment_active};
pub use error::{
    AppServicesError, AttemptServiceError, CatalogError, EnrollmentError, HistoryError,
    ProgressError,
};
pub use history_service::{
    CourseHistory, HistoryService, LectureHistory, LessonHistory, QuizHistory,
};
pub use progress::{
    CourseProgressView, LectureProgressView, LessonProgressView, ProgressService, QuizProgressView,
};
