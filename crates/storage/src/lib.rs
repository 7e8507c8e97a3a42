#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AttemptRepository, CatalogRepository, EnrollmentRepository, InMemoryRepository,
    NewEnrollmentRecord, ProgressRepository, QuizRepository, Storage, StorageError,
    UserRepository,
};
pub use sqlite::SqliteRepository;
