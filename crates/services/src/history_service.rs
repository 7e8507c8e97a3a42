use std::sync::Arc;

use serde::Serialize;

use course_core::model::{
    AttemptStatus, CourseId, CourseOutline, CourseProgress, GradeScale, LectureId,
    LectureOutline, LessonId, LessonProgress, QuizId, QuizScore, UserId,
};
use storage::repository::{
    AttemptRepository, CatalogRepository, ProgressRepository, QuizRepository,
};

use crate::error::HistoryError;

/// Per-quiz row of the history report.
///
/// `score`/`total` are on the canonical 0-10 scale; an untouched or still
/// open quiz reports zero and `InProgress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizHistory {
    pub quiz_id: QuizId,
    pub title: String,
    pub score: u8,
    pub total: u8,
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonHistory {
    pub lesson_id: LessonId,
    pub title: String,
    pub completed: bool,
    pub quiz: Option<QuizHistory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LectureHistory {
    pub lecture_id: LectureId,
    pub title: String,
    pub completed: bool,
    pub lessons: Vec<LessonHistory>,
}

/// Full report of one learner's trail through one course, in course order,
/// with the summary percentage and letter grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseHistory {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub course_title: String,
    pub completed: bool,
    pub percent: u8,
    pub grade: char,
    pub lectures: Vec<LectureHistory>,
}

/// Read-only reporter over the catalog, progress, and attempt stores.
#[derive(Clone)]
pub struct HistoryService {
    catalog: Arc<dyn CatalogRepository>,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    scale: GradeScale,
}

impl HistoryService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            catalog,
            quizzes,
            attempts,
            progress,
            scale: GradeScale::default(),
        }
    }

    /// Replaces the default A-F table with a custom grade scale.
    #[must_use]
    pub fn with_scale(mut self, scale: GradeScale) -> Self {
        self.scale = scale;
        self
    }

    /// Builds the nested course → lecture → lesson → quiz report for one
    /// learner, walking the catalog in course order.
    ///
    /// Quiz rows report the latest completed attempt's score (zero when
    /// none, including attempts swept closed without a score). A learner
    /// with no progress gets an all-unstarted report.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::CourseNotFound` if the course does not
    /// exist, or a storage error.
    pub async fn get_history(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseHistory, HistoryError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(HistoryError::CourseNotFound)?;
        let doc = self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .unwrap_or_else(|| CourseProgress::new(user_id, course_id));

        // the outline is rebuilt during the same walk so the summary
        // percentage agrees with what the walk rendered
        let mut outline = CourseOutline::new(course_id);
        let mut lectures = Vec::new();
        for lecture in self.catalog.lectures_for_course(course_id).await? {
            let entry = doc.lecture(lecture.id());
            let mut lecture_outline = LectureOutline::new();

            let mut lessons = Vec::new();
            for lesson in self.catalog.lessons_for_lecture(lecture.id()).await? {
                lecture_outline.push_lesson(lesson.id());
                if let Some(quiz_id) = lesson.quiz() {
                    lecture_outline.push_quiz(quiz_id);
                }

                let quiz = match self.quizzes.quiz_for_lesson(lesson.id()).await? {
                    Some(quiz) => Some(self.quiz_history(user_id, quiz.id(), quiz.title()).await?),
                    None => None,
                };
                let state = entry.and_then(|e| e.lesson(lesson.id()));
                lessons.push(LessonHistory {
                    lesson_id: lesson.id(),
                    title: lesson.title().to_owned(),
                    completed: state.is_some_and(LessonProgress::completed),
                    quiz,
                });
            }

            let completed =
                entry.map_or_else(|| lecture_outline.is_empty(), |e| e.completed());
            outline.push_lecture(lecture.id(), lecture_outline);
            lectures.push(LectureHistory {
                lecture_id: lecture.id(),
                title: lecture.title().to_owned(),
                completed,
                lessons,
            });
        }

        let percent = doc.completion_percent(&outline);
        Ok(CourseHistory {
            user_id,
            course_id,
            course_title: course.title().to_owned(),
            completed: doc.completed(),
            percent,
            grade: self.scale.letter_for(percent),
            lectures,
        })
    }

    async fn quiz_history(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        title: &str,
    ) -> Result<QuizHistory, HistoryError> {
        let latest = self.attempts.latest_completed(user_id, quiz_id).await?;
        let status = if latest.is_some() {
            AttemptStatus::Completed
        } else {
            AttemptStatus::InProgress
        };
        let score = latest
            .and_then(|a| a.score())
            .map_or(0, |s| s.points());
        Ok(QuizHistory {
            quiz_id,
            title: title.to_owned(),
            score,
            total: QuizScore::MAX_POINTS,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, Utc};
    use course_core::model::{
        Attempt, AttemptId, Course, ExpiryPolicy, GradeBand, Lecture, Lesson, Quiz,
    };
    use course_core::time::fixed_now;
    use storage::repository::Storage;

    fn user() -> UserId {
        UserId::new(1)
    }

    fn course_id() -> CourseId {
        CourseId::new(1)
    }

    fn lecture_id() -> LectureId {
        LectureId::new(10)
    }

    fn lesson_a() -> LessonId {
        LessonId::new(1)
    }

    fn lesson_b() -> LessonId {
        LessonId::new(2)
    }

    fn quiz_id() -> QuizId {
        QuizId::new(5)
    }

    fn service(storage: &Storage) -> HistoryService {
        HistoryService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        )
    }

    /// Course 1 / lecture 10 with lesson 1 (bare) and lesson 2 carrying
    /// quiz 5.
    async fn seed_catalog(storage: &Storage) {
        let mut course = Course::new(
            course_id(),
            "Rust Basics",
            ExpiryPolicy::none(),
            UserId::new(99),
            fixed_now(),
        )
        .unwrap();
        course.push_lecture(lecture_id());
        storage.catalog.upsert_course(&course).await.unwrap();

        let mut lecture =
            Lecture::new(lecture_id(), course_id(), "Getting Started", fixed_now()).unwrap();
        lecture.push_lesson(lesson_a());
        lecture.push_lesson(lesson_b());
        storage.catalog.upsert_lecture(&lecture).await.unwrap();

        let first =
            Lesson::new(lesson_a(), lecture_id(), "Installing", None, &[], fixed_now()).unwrap();
        storage.catalog.upsert_lesson(&first).await.unwrap();

        let mut second =
            Lesson::new(lesson_b(), lecture_id(), "Hello World", None, &[], fixed_now()).unwrap();
        second.attach_quiz(quiz_id()).unwrap();
        storage.catalog.upsert_lesson(&second).await.unwrap();

        let quiz = Quiz::new(
            quiz_id(),
            lesson_b(),
            lecture_id(),
            course_id(),
            "Checkpoint",
            30,
            5,
            UserId::new(99),
            fixed_now(),
        )
        .unwrap();
        storage.quizzes.upsert_quiz(&quiz).await.unwrap();
    }

    async fn complete_attempt(storage: &Storage, score: QuizScore, at: DateTime<Utc>) {
        let mut attempt = Attempt::start(AttemptId::generate(), user(), quiz_id(), at);
        attempt.complete(vec![], score, at).unwrap();
        storage.attempts.upsert_attempt(&attempt).await.unwrap();
    }

    #[tokio::test]
    async fn untouched_course_reports_all_unstarted() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        let history = service(&storage).get_history(user(), course_id()).await.unwrap();
        assert_eq!(history.course_title, "Rust Basics");
        assert_eq!(history.percent, 0);
        assert_eq!(history.grade, 'F');
        assert!(!history.completed);

        assert_eq!(history.lectures.len(), 1);
        let lecture = &history.lectures[0];
        assert_eq!(lecture.title, "Getting Started");
        assert!(!lecture.completed);
        assert_eq!(lecture.lessons.len(), 2);
        assert!(lecture.lessons[0].quiz.is_none());

        let quiz = lecture.lessons[1].quiz.as_ref().unwrap();
        assert_eq!(quiz.title, "Checkpoint");
        assert_eq!(quiz.score, 0);
        assert_eq!(quiz.total, 10);
        assert_eq!(quiz.status, AttemptStatus::InProgress);
    }

    #[tokio::test]
    async fn missing_course_is_an_error() {
        let storage = Storage::in_memory();
        let err = service(&storage)
            .get_history(user(), CourseId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::CourseNotFound));
    }

    #[tokio::test]
    async fn quiz_rows_follow_the_latest_completed_attempt() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        complete_attempt(&storage, QuizScore::from_correct(1, 3), fixed_now()).await;
        complete_attempt(
            &storage,
            QuizScore::from_correct(7, 10),
            fixed_now() + Duration::minutes(5),
        )
        .await;

        let history = service(&storage).get_history(user(), course_id()).await.unwrap();
        let quiz = history.lectures[0].lessons[1].quiz.as_ref().unwrap();
        assert_eq!(quiz.score, 7);
        assert_eq!(quiz.status, AttemptStatus::Completed);
    }

    #[tokio::test]
    async fn swept_attempts_report_zero_but_completed() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        let mut attempt = Attempt::start(AttemptId::generate(), user(), quiz_id(), fixed_now());
        attempt.complete_unscored(fixed_now()).unwrap();
        storage.attempts.upsert_attempt(&attempt).await.unwrap();

        let history = service(&storage).get_history(user(), course_id()).await.unwrap();
        let quiz = history.lectures[0].lessons[1].quiz.as_ref().unwrap();
        assert_eq!(quiz.score, 0);
        assert_eq!(quiz.status, AttemptStatus::Completed);
    }

    #[tokio::test]
    async fn summary_row_carries_percent_and_grade() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        // 2 of 3 outline units done
        let mut doc = CourseProgress::new(user(), course_id());
        doc.mark_lesson(lecture_id(), lesson_a(), fixed_now());
        doc.mark_quiz(
            lecture_id(),
            quiz_id(),
            QuizScore::from_correct(2, 3),
            fixed_now(),
        );
        storage.progress.upsert_progress(&doc).await.unwrap();

        let history = service(&storage).get_history(user(), course_id()).await.unwrap();
        assert_eq!(history.percent, 67);
        assert_eq!(history.grade, 'D');
        assert!(history.lectures[0].lessons[0].completed);
        assert!(!history.lectures[0].lessons[1].completed);
    }

    #[tokio::test]
    async fn report_serializes_with_stable_field_names() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        let history = service(&storage).get_history(user(), course_id()).await.unwrap();
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "user_id": 1,
                "course_id": 1,
                "course_title": "Rust Basics",
                "completed": false,
                "percent": 0,
                "grade": "F",
                "lectures": [{
                    "lecture_id": 10,
                    "title": "Getting Started",
                    "completed": false,
                    "lessons": [
                        {
                            "lesson_id": 1,
                            "title": "Installing",
                            "completed": false,
                            "quiz": null,
                        },
                        {
                            "lesson_id": 2,
                            "title": "Hello World",
                            "completed": false,
                            "quiz": {
                                "quiz_id": 5,
                                "title": "Checkpoint",
                                "score": 0,
                                "total": 10,
                                "status": "inprogress",
                            },
                        },
                    ],
                }],
            })
        );
    }

    #[tokio::test]
    async fn custom_scale_changes_the_letter() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;

        let scale = GradeScale::new(
            vec![GradeBand {
                min_percent: 50,
                letter: 'P',
            }],
            'N',
        )
        .unwrap();
        let svc = service(&storage).with_scale(scale);

        let mut doc = CourseProgress::new(user(), course_id());
        doc.mark_lesson(lecture_id(), lesson_a(), fixed_now());
        doc.mark_lesson(lecture_id(), lesson_b(), fixed_now());
        storage.progress.upsert_progress(&doc).await.unwrap();

        let history = svc.get_history(user(), course_id()).await.unwrap();
        assert_eq!(history.percent, 67);
        assert_eq!(history.grade, 'P');
    }
}
