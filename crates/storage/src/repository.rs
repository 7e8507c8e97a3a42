use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    Attempt, AttemptId, Course, CourseId, CourseOutline, CourseProgress, Enrollment, EnrollmentId,
    Lecture, LectureId, LectureOutline, Lesson, LessonId, Question, Quiz, QuizId, User, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted reference: {0}")]
    Corrupted(String),
}

/// Insert shape for an enrollment before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewEnrollmentRecord {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist or update a user, including their enrolled-course list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the user cannot be stored.
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError>;

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing user is `Ok(None)`.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;
}

/// Repository contract for the course structure: courses, lectures, lessons.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or update a course, including lecture order and roster.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing course is `Ok(None)`.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List courses ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError>;

    /// Persist or update a lecture, including lesson order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lecture cannot be stored.
    async fn upsert_lecture(&self, lecture: &Lecture) -> Result<(), StorageError>;

    /// Fetch a lecture by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing lecture is `Ok(None)`.
    async fn get_lecture(&self, id: LectureId) -> Result<Option<Lecture>, StorageError>;

    /// Lectures of a course in course order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the course references a lecture
    /// that does not exist.
    async fn lectures_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Lecture>, StorageError>;

    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// Fetch a lesson by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing lesson is `Ok(None)`.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// Lessons of a lecture in lecture order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the lecture references a lesson
    /// that does not exist.
    async fn lessons_for_lecture(
        &self,
        lecture_id: LectureId,
    ) -> Result<Vec<Lesson>, StorageError>;

    /// Assemble the true outline of a course: every lecture with its
    /// lessons and attached quizzes, in course order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the structure references an
    /// entity that does not exist; a missing course is `Ok(None)`.
    async fn outline(&self, course_id: CourseId) -> Result<Option<CourseOutline>, StorageError>;
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or update a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another quiz already claims the
    /// same lesson.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing quiz is `Ok(None)`.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;

    /// Fetch the quiz attached to a lesson, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn quiz_for_lesson(&self, lesson_id: LessonId) -> Result<Option<Quiz>, StorageError>;

    /// All quizzes belonging to a course, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn quizzes_for_course(&self, course_id: CourseId) -> Result<Vec<Quiz>, StorageError>;

    /// Persist or update a question with its options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Questions of a quiz ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Insert a new enrollment and return its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user is already enrolled in
    /// the course.
    async fn insert_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError>;

    /// Fetch the enrollment linking a user to a course, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// All enrollments of a user, ordered by enrollment time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn enrollments_for_user(&self, user_id: UserId)
    -> Result<Vec<Enrollment>, StorageError>;

    /// Delete the enrollment linking a user to a course.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Persist or update an attempt with its answers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Fetch an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors; a missing attempt is `Ok(None)`.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError>;

    /// All in-progress attempts a user has open on a quiz, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn in_progress_for_user_quiz(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Vec<Attempt>, StorageError>;

    /// Number of completed attempts a user has on a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn completed_count(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError>;

    /// The most recently completed attempt a user has on a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn latest_completed(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<Attempt>, StorageError>;

    /// Completed attempts a user has across the given quizzes, ordered by
    /// completion time (oldest first).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn completed_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<Vec<Attempt>, StorageError>;

    /// Delete every attempt a user has on the given quizzes, returning the
    /// number of removed attempts.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update a whole progress document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn upsert_progress(&self, progress: &CourseProgress) -> Result<(), StorageError>;

    /// Fetch the progress document for a user and course, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// Delete the progress document for a user and course.
    ///
    /// Returns `true` if anything was removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct EnrollmentTable {
    rows: HashMap<(UserId, CourseId), Enrollment>,
    next_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<Mutex<HashMap<UserId, User>>>,
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
    lectures: Arc<Mutex<HashMap<LectureId, Lecture>>>,
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    questions: Arc<Mutex<HashMap<QuizId, Vec<Question>>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    enrollments: Arc<Mutex<EnrollmentTable>>,
    progress: Arc<Mutex<HashMap<(UserId, CourseId), CourseProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(user.id(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut courses: Vec<Course> = guard.values().cloned().collect();
        courses.sort_by_key(Course::id);
        courses.truncate(limit as usize);
        Ok(courses)
    }

    async fn upsert_lecture(&self, lecture: &Lecture) -> Result<(), StorageError> {
        let mut guard = self
            .lectures
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(lecture.id(), lecture.clone());
        Ok(())
    }

    async fn get_lecture(&self, id: LectureId) -> Result<Option<Lecture>, StorageError> {
        let guard = self
            .lectures
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn lectures_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Lecture>, StorageError> {
        let courses = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lectures = self
            .lectures
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(course) = courses.get(&course_id) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::with_capacity(course.lectures().len());
        for lecture_id in course.lectures() {
            match lectures.get(lecture_id) {
                Some(lecture) => found.push(lecture.clone()),
                None => {
                    return Err(StorageError::Corrupted(format!(
                        "course {course_id} references missing lecture {lecture_id}"
                    )));
                }
            }
        }
        Ok(found)
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn lessons_for_lecture(
        &self,
        lecture_id: LectureId,
    ) -> Result<Vec<Lesson>, StorageError> {
        let lectures = self
            .lectures
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lessons = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(lecture) = lectures.get(&lecture_id) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::with_capacity(lecture.lessons().len());
        for lesson_id in lecture.lessons() {
            match lessons.get(lesson_id) {
                Some(lesson) => found.push(lesson.clone()),
                None => {
                    return Err(StorageError::Corrupted(format!(
                        "lecture {lecture_id} references missing lesson {lesson_id}"
                    )));
                }
            }
        }
        Ok(found)
    }

    async fn outline(&self, course_id: CourseId) -> Result<Option<CourseOutline>, StorageError> {
        let courses = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lectures = self
            .lectures
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lessons = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(course) = courses.get(&course_id) else {
            return Ok(None);
        };

        let mut outline = CourseOutline::new(course_id);
        for lecture_id in course.lectures() {
            let Some(lecture) = lectures.get(lecture_id) else {
                return Err(StorageError::Corrupted(format!(
                    "course {course_id} references missing lecture {lecture_id}"
                )));
            };
            let mut lecture_outline = LectureOutline::new();
            for lesson_id in lecture.lessons() {
                let Some(lesson) = lessons.get(lesson_id) else {
                    return Err(StorageError::Corrupted(format!(
                        "lecture {lecture_id} references missing lesson {lesson_id}"
                    )));
                };
                lecture_outline.push_lesson(*lesson_id);
                if let Some(quiz_id) = lesson.quiz() {
                    lecture_outline.push_quiz(quiz_id);
                }
            }
            outline.push_lecture(*lecture_id, lecture_outline);
        }
        Ok(Some(outline))
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let lesson_taken = guard
            .values()
            .any(|q| q.lesson_id() == quiz.lesson_id() && q.id() != quiz.id());
        if lesson_taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn quiz_for_lesson(&self, lesson_id: LessonId) -> Result<Option<Quiz>, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .find(|q| q.lesson_id() == lesson_id)
            .cloned())
    }

    async fn quizzes_for_course(&self, course_id: CourseId) -> Result<Vec<Quiz>, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<Quiz> = guard
            .values()
            .filter(|q| q.course_id() == course_id)
            .cloned()
            .collect();
        found.sort_by_key(Quiz::id);
        Ok(found)
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let list = guard.entry(question.quiz_id()).or_default();
        match list.iter_mut().find(|q| q.id() == question.id()) {
            Some(slot) => *slot = question.clone(),
            None => list.push(question.clone()),
        }
        Ok(())
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found = guard.get(&quiz_id).cloned().unwrap_or_default();
        found.sort_by_key(Question::id);
        Ok(found)
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn insert_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError> {
        let mut guard = self
            .enrollments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.user_id, record.course_id);
        if guard.rows.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.next_id += 1;
        let id = EnrollmentId::new(guard.next_id);
        guard.rows.insert(
            key,
            Enrollment::new(
                id,
                record.user_id,
                record.course_id,
                record.enrolled_at,
                record.expires_at,
            ),
        );
        Ok(id)
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let guard = self
            .enrollments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.rows.get(&(user_id, course_id)).cloned())
    }

    async fn enrollments_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self
            .enrollments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<Enrollment> = guard
            .rows
            .values()
            .filter(|e| e.user_id() == user_id)
            .cloned()
            .collect();
        found.sort_by_key(Enrollment::id);
        Ok(found)
    }

    async fn delete_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        let mut guard = self
            .enrollments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.rows.remove(&(user_id, course_id)).is_some())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn in_progress_for_user_quiz(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<Attempt> = guard
            .values()
            .filter(|a| a.user_id() == user_id && a.quiz_id() == quiz_id && a.is_in_progress())
            .cloned()
            .collect();
        found.sort_by_key(Attempt::started_at);
        Ok(found)
    }

    async fn completed_count(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let count = guard
            .values()
            .filter(|a| a.user_id() == user_id && a.quiz_id() == quiz_id && a.is_completed())
            .count();
        u32::try_from(count)
            .map_err(|_| StorageError::Serialization("attempt count overflow".into()))
    }

    async fn latest_completed(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|a| a.user_id() == user_id && a.quiz_id() == quiz_id && a.is_completed())
            .max_by_key(|a| a.completed_at())
            .cloned())
    }

    async fn completed_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<Attempt> = guard
            .values()
            .filter(|a| {
                a.user_id() == user_id && a.is_completed() && quiz_ids.contains(&a.quiz_id())
            })
            .cloned()
            .collect();
        found.sort_by_key(Attempt::completed_at);
        Ok(found)
    }

    async fn delete_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<u64, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let before = guard.len();
        guard.retain(|_, a| !(a.user_id() == user_id && quiz_ids.contains(&a.quiz_id())));
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, progress: &CourseProgress) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (progress.user_id(), progress.course_id()),
            progress.clone(),
        );
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, course_id)).cloned())
    }

    async fn delete_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.remove(&(user_id, course_id)).is_some())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates every repository behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let users: Arc<dyn UserRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let enrollments: Arc<dyn EnrollmentRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            users,
            catalog,
            quizzes,
            enrollments,
            attempts,
            progress,
        }
    }
}
