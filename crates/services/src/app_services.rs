use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::attempt_service::AttemptService;
use crate::catalog_service::CatalogService;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::history_service::HistoryService;
use crate::progress::ProgressService;

/// Assembles the app-facing services over a single storage backend.
#[derive(Clone)]
pub struct AppServices {
    enrollment: Arc<EnrollmentService>,
    progress: Arc<ProgressService>,
    attempts: Arc<AttemptService>,
    history: Arc<HistoryService>,
    catalog: Arc<CatalogService>,
}

impl AppServices {
    /// Builds services over an already constructed storage backend.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let enrollment = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        ));
        // The attempt pipeline holds a clone of this instance, so graded
        // attempts and manual marks serialize on the same per-course locks.
        let progress = ProgressService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        );
        let attempts = Arc::new(AttemptService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            progress.clone(),
        ));
        let history = Arc::new(HistoryService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        ));
        let catalog = Arc::new(CatalogService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
        ));

        Self {
            enrollment,
            progress: Arc::new(progress),
            attempts,
            history,
            catalog,
        }
    }

    /// Builds services over in-memory storage. Useful for tests and demos.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    /// Builds services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    #[must_use]
    pub fn enrollment(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollment)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }
}
