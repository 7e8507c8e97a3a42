use std::sync::Arc;

use course_core::model::{
    Course, CourseId, ExpiryPolicy, Lecture, LectureId, Lesson, LessonId, Question,
    QuestionId, QuestionOption, Quiz, QuizId, UserId,
};
use storage::repository::{CatalogRepository, QuizRepository, StorageError};

use crate::Clock;
use crate::error::CatalogError;

/// Authoring surface for the course catalog.
///
/// Ids are assigned by the caller; creating an entity under an id that is
/// already taken fails with `StorageError::Conflict`. Parent references
/// and ordered child lists are maintained on both sides of each link.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    quizzes: Arc<dyn QuizRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        quizzes: Arc<dyn QuizRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            quizzes,
        }
    }

    /// Creates an unpublished course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Course` for an empty title, a conflict error
    /// when the id is taken, or a storage error.
    pub async fn create_course(
        &self,
        id: CourseId,
        title: &str,
        expiry: ExpiryPolicy,
        created_by: UserId,
    ) -> Result<Course, CatalogError> {
        if self.catalog.get_course(id).await?.is_some() {
            return Err(StorageError::Conflict.into());
        }
        let course = Course::new(id, title, expiry, created_by, self.clock.now())?;
        self.catalog.upsert_course(&course).await?;
        Ok(course)
    }

    /// Appends a lecture to a course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CourseNotFound` for a missing course,
    /// `CatalogError::Lecture` for an empty title, a conflict error when
    /// the id is taken, or a storage error.
    pub async fn add_lecture(
        &self,
        id: LectureId,
        course_id: CourseId,
        title: &str,
    ) -> Result<Lecture, CatalogError> {
        let mut course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(CatalogError::CourseNotFound)?;
        if self.catalog.get_lecture(id).await?.is_some() {
            return Err(StorageError::Conflict.into());
        }

        let lecture = Lecture::new(id, course_id, title, self.clock.now())?;
        self.catalog.upsert_lecture(&lecture).await?;
        course.push_lecture(id);
        self.catalog.upsert_course(&course).await?;
        Ok(lecture)
    }

    /// Appends a lesson to a lecture.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::LectureNotFound` for a missing lecture,
    /// `CatalogError::Lesson` for an empty title, a conflict error when
    /// the id is taken, or a storage error.
    pub async fn add_lesson(
        &self,
        id: LessonId,
        lecture_id: LectureId,
        title: &str,
        video: Option<&str>,
        resources: &[&str],
    ) -> Result<Lesson, CatalogError> {
        let mut lecture = self
            .catalog
            .get_lecture(lecture_id)
            .await?
            .ok_or(CatalogError::LectureNotFound)?;
        if self.catalog.get_lesson(id).await?.is_some() {
            return Err(StorageError::Conflict.into());
        }

        let lesson = Lesson::new(id, lecture_id, title, video, resources, self.clock.now())?;
        self.catalog.upsert_lesson(&lesson).await?;
        lecture.push_lesson(id);
        self.catalog.upsert_lecture(&lecture).await?;
        Ok(lesson)
    }

    /// Makes a course visible to learners.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CourseNotFound` for a missing course, or a
    /// storage error.
    pub async fn publish_course(&self, course_id: CourseId) -> Result<Course, CatalogError> {
        let mut course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(CatalogError::CourseNotFound)?;
        course.publish();
        self.catalog.upsert_course(&course).await?;
        Ok(course)
    }

    /// Attaches a new quiz to a lesson. One quiz per lesson.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::LessonNotFound` for a missing lesson,
    /// `LessonAlreadyHasQuiz` when the lesson already carries one,
    /// `LectureNotFound` when the lesson's parent is gone,
    /// `CatalogError::Quiz` for invalid quiz fields, a conflict error when
    /// the id is taken, or a storage error.
    pub async fn create_quiz(
        &self,
        id: QuizId,
        lesson_id: LessonId,
        title: &str,
        seconds_per_question: u32,
        max_attempts: u32,
        created_by: UserId,
    ) -> Result<Quiz, CatalogError> {
        let mut lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or(CatalogError::LessonNotFound)?;
        if lesson.quiz().is_some() {
            return Err(CatalogError::LessonAlreadyHasQuiz);
        }
        let lecture = self
            .catalog
            .get_lecture(lesson.lecture_id())
            .await?
            .ok_or(CatalogError::LectureNotFound)?;
        if self.quizzes.get_quiz(id).await?.is_some() {
            return Err(StorageError::Conflict.into());
        }

        let quiz = Quiz::new(
            id,
            lesson_id,
            lecture.id(),
            lecture.course_id(),
            title,
            seconds_per_question,
            max_attempts,
            created_by,
            self.clock.now(),
        )?;
        self.quizzes.upsert_quiz(&quiz).await?;
        lesson.attach_quiz(id)?;
        self.catalog.upsert_lesson(&lesson).await?;
        Ok(quiz)
    }

    /// Adds a question with its options to a quiz.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::QuizNotFound` for a missing quiz,
    /// `CatalogError::Question` when the question breaks its invariants
    /// (empty text, too few options, no correct option), or a storage
    /// error.
    pub async fn add_question(
        &self,
        id: QuestionId,
        quiz_id: QuizId,
        text: &str,
        options: Vec<QuestionOption>,
    ) -> Result<Question, CatalogError> {
        if self.quizzes.get_quiz(quiz_id).await?.is_none() {
            return Err(CatalogError::QuizNotFound);
        }
        let question = Question::new(id, quiz_id, text, options)?;
        self.quizzes.upsert_question(&question).await?;
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use course_core::model::{LessonError, OptionId, QuestionError};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    fn service(storage: &Storage) -> CatalogService {
        CatalogService::new(
            fixed_clock(),
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
        )
    }

    fn option(id: u64, is_correct: bool) -> QuestionOption {
        QuestionOption {
            id: OptionId::new(id),
            text: format!("Option {id}"),
            is_correct,
        }
    }

    async fn seed_course_with_lesson(svc: &CatalogService) {
        svc.create_course(
            CourseId::new(1),
            "Rust Basics",
            ExpiryPolicy::none(),
            UserId::new(99),
        )
        .await
        .unwrap();
        svc.add_lecture(LectureId::new(10), CourseId::new(1), "Getting Started")
            .await
            .unwrap();
        svc.add_lesson(LessonId::new(1), LectureId::new(10), "Installing", None, &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn authoring_builds_a_connected_catalog() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;

        let course = storage
            .catalog
            .get_course(CourseId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(course.lectures(), &[LectureId::new(10)]);
        assert!(!course.published());
        assert_eq!(course.created_at(), fixed_now());

        let lecture = storage
            .catalog
            .get_lecture(LectureId::new(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lecture.lessons(), &[LessonId::new(1)]);

        let outline = storage
            .catalog
            .outline(CourseId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outline.total_lessons(), 1);
    }

    #[tokio::test]
    async fn taken_ids_are_conflicts() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;

        let err = svc
            .create_course(
                CourseId::new(1),
                "Another",
                ExpiryPolicy::none(),
                UserId::new(99),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Storage(StorageError::Conflict)
        ));

        let err = svc
            .add_lecture(LectureId::new(10), CourseId::new(1), "Again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Storage(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn children_require_existing_parents() {
        let storage = Storage::in_memory();
        let svc = service(&storage);

        let err = svc
            .add_lecture(LectureId::new(10), CourseId::new(404), "Orphan")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::CourseNotFound));

        let err = svc
            .add_lesson(LessonId::new(1), LectureId::new(404), "Orphan", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LectureNotFound));

        let err = svc
            .create_quiz(QuizId::new(5), LessonId::new(404), "Orphan", 30, 5, UserId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LessonNotFound));
    }

    #[tokio::test]
    async fn publish_flips_the_flag() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;

        let course = svc.publish_course(CourseId::new(1)).await.unwrap();
        assert!(course.published());

        let stored = storage
            .catalog
            .get_course(CourseId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.published());
    }

    #[tokio::test]
    async fn one_quiz_per_lesson() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;

        let quiz = svc
            .create_quiz(QuizId::new(5), LessonId::new(1), "Checkpoint", 30, 5, UserId::new(99))
            .await
            .unwrap();
        assert_eq!(quiz.lecture_id(), LectureId::new(10));
        assert_eq!(quiz.course_id(), CourseId::new(1));

        let lesson = storage
            .catalog
            .get_lesson(LessonId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lesson.quiz(), Some(QuizId::new(5)));

        let err = svc
            .create_quiz(QuizId::new(6), LessonId::new(1), "Second", 30, 5, UserId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LessonAlreadyHasQuiz));
    }

    #[tokio::test]
    async fn questions_enforce_their_invariants() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;
        svc.create_quiz(QuizId::new(5), LessonId::new(1), "Checkpoint", 30, 5, UserId::new(99))
            .await
            .unwrap();

        let err = svc
            .add_question(
                QuestionId::new(1),
                QuizId::new(404),
                "Where does this go?",
                vec![option(11, true), option(12, false)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::QuizNotFound));

        let err = svc
            .add_question(
                QuestionId::new(1),
                QuizId::new(5),
                "No right answer",
                vec![option(11, false), option(12, false)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Question(QuestionError::NoCorrectOption)
        ));

        let question = svc
            .add_question(
                QuestionId::new(1),
                QuizId::new(5),
                "What does cargo build do?",
                vec![option(11, true), option(12, false)],
            )
            .await
            .unwrap();
        assert_eq!(question.options().len(), 2);

        let stored = storage
            .quizzes
            .questions_for_quiz(QuizId::new(5))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn empty_titles_are_rejected() {
        let storage = Storage::in_memory();
        let svc = service(&storage);

        let err = svc
            .create_course(CourseId::new(1), "  ", ExpiryPolicy::none(), UserId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Course(_)));
    }

    #[tokio::test]
    async fn attach_quiz_conflict_surfaces_from_the_model() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        seed_course_with_lesson(&svc).await;

        let mut lesson = storage
            .catalog
            .get_lesson(LessonId::new(1))
            .await
            .unwrap()
            .unwrap();
        lesson.attach_quiz(QuizId::new(9)).unwrap();
        let err = lesson.attach_quiz(QuizId::new(10)).unwrap_err();
        assert!(matches!(err, LessonError::QuizAlreadyAttached));
    }
}
