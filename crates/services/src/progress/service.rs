use std::collections::HashMap;
use std::sync::Arc;

use course_core::model::{
    CourseId, CourseOutline, CourseProgress, LectureId, LessonId, QuizId, QuizProgress,
    QuizScore, UserId,
};
use storage::repository::{
    AttemptRepository, CatalogRepository, ProgressRepository, QuizRepository,
};

use super::locks::ProgressLocks;
use super::view::CourseProgressView;
use crate::Clock;
use crate::error::ProgressError;

/// Maintains per-learner course progress documents.
///
/// Every write runs under a per-(user, course) mutex, recomputes the
/// roll-up flags against the course's current outline, and persists the
/// whole document. Flags in storage therefore always reflect the outline
/// as of the last write.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    locks: ProgressLocks,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            quizzes,
            attempts,
            progress,
            locks: ProgressLocks::new(),
        }
    }

    /// Marks a lesson complete for a learner, creating the progress
    /// document and any intermediate entries on first touch. Marking a
    /// lesson twice is harmless.
    ///
    /// The lecture and lesson ids are recorded as given; ids outside the
    /// course's outline are tolerated but never count toward completion.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the course does not
    /// exist, or a storage error.
    pub async fn mark_lesson_complete(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        lesson_id: LessonId,
    ) -> Result<CourseProgress, ProgressError> {
        let lock = self.locks.for_key(user_id, course_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let outline = self.outline(course_id).await?;
        let mut doc = self.load_or_new(user_id, course_id).await?;
        doc.mark_lesson(lecture_id, lesson_id, now);
        doc.recompute(&outline, now);
        self.progress.upsert_progress(&doc).await?;
        Ok(doc)
    }

    /// Records a quiz attempt with its normalized score, creating entries
    /// as needed. A newer attempt overwrites the stored score.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the course does not
    /// exist, or a storage error.
    pub async fn mark_quiz_attempted(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        quiz_id: QuizId,
        score: QuizScore,
    ) -> Result<CourseProgress, ProgressError> {
        let lock = self.locks.for_key(user_id, course_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let outline = self.outline(course_id).await?;
        let mut doc = self.load_or_new(user_id, course_id).await?;
        doc.mark_quiz(lecture_id, quiz_id, score, now);
        doc.recompute(&outline, now);
        self.progress.upsert_progress(&doc).await?;
        Ok(doc)
    }

    /// Overwrites a quiz entry on an existing progress document.
    ///
    /// Unlike [`ProgressService::mark_quiz_attempted`] this never creates
    /// the document; it is the editing surface for progress that is
    /// already there.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the course does not
    /// exist, `ProgressNotFound` if the learner has no document for it,
    /// or a storage error.
    pub async fn update_quiz_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        quiz_id: QuizId,
        score: QuizScore,
    ) -> Result<CourseProgress, ProgressError> {
        let lock = self.locks.for_key(user_id, course_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let outline = self.outline(course_id).await?;
        let mut doc = self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .ok_or(ProgressError::ProgressNotFound)?;
        doc.mark_quiz(lecture_id, quiz_id, score, now);
        doc.recompute(&outline, now);
        self.progress.upsert_progress(&doc).await?;
        Ok(doc)
    }

    /// Manually forces or clears course completion.
    ///
    /// The override is stored as-is; roll-up flags are not recomputed, so
    /// it survives until the next marking operation re-evaluates the
    /// document against the outline.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ProgressNotFound` if the learner has no
    /// document for the course, or a storage error.
    pub async fn set_completion_override(
        &self,
        user_id: UserId,
        course_id: CourseId,
        completed: bool,
    ) -> Result<CourseProgress, ProgressError> {
        let lock = self.locks.for_key(user_id, course_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut doc = self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .ok_or(ProgressError::ProgressNotFound)?;
        doc.set_override(completed, now);
        self.progress.upsert_progress(&doc).await?;
        Ok(doc)
    }

    /// Renders a learner's standing in a course against its outline.
    ///
    /// A learner with no progress document gets an all-unstarted view.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the course does not
    /// exist, or a storage error.
    pub async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressView, ProgressError> {
        let outline = self.outline(course_id).await?;
        let doc = self.load_or_new(user_id, course_id).await?;
        Ok(CourseProgressView::from_progress(&doc, &outline))
    }

    /// Rebuilds a learner's quiz entries from their completed attempts.
    ///
    /// Completed attempts are replayed oldest first, so the stored score
    /// ends up matching the latest attempt, and quizzes the document
    /// missed (a crash between attempt persistence and progress update)
    /// are backfilled. Roll-up flags are recomputed afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the course does not
    /// exist, or a storage error.
    pub async fn reconcile(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressError> {
        let lock = self.locks.for_key(user_id, course_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let outline = self.outline(course_id).await?;
        let mut doc = self.load_or_new(user_id, course_id).await?;

        let quizzes = self.quizzes.quizzes_for_course(course_id).await?;
        let lecture_of: HashMap<QuizId, LectureId> =
            quizzes.iter().map(|q| (q.id(), q.lecture_id())).collect();
        let quiz_ids: Vec<QuizId> = lecture_of.keys().copied().collect();
        let completed = self.attempts.completed_for_user(user_id, &quiz_ids).await?;

        let mut healed = 0u32;
        for attempt in &completed {
            let Some(&lecture_id) = lecture_of.get(&attempt.quiz_id()) else {
                continue;
            };
            let already = doc
                .lecture(lecture_id)
                .and_then(|l| l.quiz(attempt.quiz_id()))
                .is_some_and(QuizProgress::attempted);
            if !already {
                healed += 1;
            }
            let score = attempt.score().unwrap_or_else(QuizScore::zero);
            let at = attempt.completed_at().unwrap_or(now);
            doc.mark_quiz(lecture_id, attempt.quiz_id(), score, at);
        }

        if healed > 0 {
            tracing::info!(
                user = user_id.value(),
                course = course_id.value(),
                healed,
                "reconcile backfilled quiz attempts"
            );
        }

        doc.recompute(&outline, now);
        self.progress.upsert_progress(&doc).await?;
        Ok(doc)
    }

    async fn outline(&self, course_id: CourseId) -> Result<CourseOutline, ProgressError> {
        self.catalog
            .outline(course_id)
            .await?
            .ok_or(ProgressError::CourseNotFound)
    }

    async fn load_or_new(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressError> {
        Ok(self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .unwrap_or_else(|| CourseProgress::new(user_id, course_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use course_core::model::{
        Attempt, AttemptId, Course, ExpiryPolicy, Lecture, Lesson, Quiz,
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

    fn service(storage: &Storage, clock: Clock) -> ProgressService {
        ProgressService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        )
    }

    /// Course 1 with one lecture holding two lessons; the second lesson
    /// carries quiz 5.
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

    #[tokio::test]
    async fn marking_creates_and_persists_the_document() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let doc = svc
            .mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        assert!(!doc.completed());

        let stored = storage
            .progress
            .get_progress(user(), course_id())
            .await
            .unwrap()
            .unwrap();
        assert!(
            stored
                .lecture(lecture_id())
                .unwrap()
                .lesson(lesson_a())
                .unwrap()
                .completed()
        );
    }

    #[tokio::test]
    async fn marking_against_missing_course_fails() {
        let storage = Storage::in_memory();
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let err = svc
            .mark_lesson_complete(user(), CourseId::new(404), lecture_id(), lesson_a())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::CourseNotFound));
    }

    #[tokio::test]
    async fn covering_the_outline_completes_the_course() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_b())
            .await
            .unwrap();
        let doc = svc
            .mark_quiz_attempted(
                user(),
                course_id(),
                lecture_id(),
                quiz_id(),
                QuizScore::from_correct(2, 3),
            )
            .await
            .unwrap();

        assert!(doc.completed());
        assert!(doc.lecture(lecture_id()).unwrap().completed());
    }

    #[tokio::test]
    async fn marking_is_idempotent() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        let doc = svc
            .mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();

        assert_eq!(doc.lecture(lecture_id()).unwrap().lessons().len(), 1);
    }

    #[tokio::test]
    async fn off_outline_marks_are_tolerated_but_never_count() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let doc = svc
            .mark_lesson_complete(user(), course_id(), lecture_id(), LessonId::new(77))
            .await
            .unwrap();
        assert!(!doc.completed());

        let view = svc.get_course_progress(user(), course_id()).await.unwrap();
        assert_eq!(view.percent, 0);
    }

    #[tokio::test]
    async fn update_requires_an_existing_document() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let err = svc
            .update_quiz_progress(user(), course_id(), lecture_id(), quiz_id(), QuizScore::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::ProgressNotFound));

        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        let doc = svc
            .update_quiz_progress(
                user(),
                course_id(),
                lecture_id(),
                quiz_id(),
                QuizScore::from_correct(1, 3),
            )
            .await
            .unwrap();
        let entry = doc.lecture(lecture_id()).unwrap().quiz(quiz_id()).unwrap();
        assert_eq!(entry.score(), Some(QuizScore::from_correct(1, 3)));
    }

    #[tokio::test]
    async fn override_sticks_until_the_next_recompute() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let err = svc
            .set_completion_override(user(), course_id(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::ProgressNotFound));

        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        let doc = svc
            .set_completion_override(user(), course_id(), true)
            .await
            .unwrap();
        assert!(doc.completed());

        // the next honest write re-evaluates against the outline
        let doc = svc
            .mark_lesson_complete(user(), course_id(), lecture_id(), lesson_b())
            .await
            .unwrap();
        assert!(!doc.completed());
    }

    #[tokio::test]
    async fn override_false_clears_the_course_flag_only() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_b())
            .await
            .unwrap();
        svc.mark_quiz_attempted(user(), course_id(), lecture_id(), quiz_id(), QuizScore::zero())
            .await
            .unwrap();

        let doc = svc
            .set_completion_override(user(), course_id(), false)
            .await
            .unwrap();
        assert!(!doc.completed());
        assert!(doc.lecture(lecture_id()).unwrap().completed());
    }

    #[tokio::test]
    async fn view_for_untouched_learner_is_all_unstarted() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let view = svc.get_course_progress(user(), course_id()).await.unwrap();
        assert_eq!(view.lectures.len(), 1);
        assert_eq!(view.lectures[0].lessons.len(), 2);
        assert_eq!(view.lectures[0].quizzes.len(), 1);
        assert_eq!(view.percent, 0);
        assert!(!view.completed);

        let err = svc
            .get_course_progress(user(), CourseId::new(404))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::CourseNotFound));
    }

    #[tokio::test]
    async fn view_percent_rounds_half_up() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        // 1 of 3 units
        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
            .await
            .unwrap();
        let view = svc.get_course_progress(user(), course_id()).await.unwrap();
        assert_eq!(view.percent, 33);

        // 2 of 3 units
        svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_b())
            .await
            .unwrap();
        let view = svc.get_course_progress(user(), course_id()).await.unwrap();
        assert_eq!(view.percent, 67);
    }

    #[tokio::test]
    async fn reconcile_backfills_from_completed_attempts() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        // two completed attempts that never made it into the document
        let older = fixed_now() - Duration::hours(2);
        let newer = fixed_now() - Duration::hours(1);
        let mut first = Attempt::start(AttemptId::generate(), user(), quiz_id(), older);
        first
            .complete(vec![], QuizScore::from_correct(1, 3), older)
            .unwrap();
        storage.attempts.upsert_attempt(&first).await.unwrap();
        let mut second = Attempt::start(AttemptId::generate(), user(), quiz_id(), newer);
        second
            .complete(vec![], QuizScore::from_correct(2, 3), newer)
            .unwrap();
        storage.attempts.upsert_attempt(&second).await.unwrap();

        let doc = svc.reconcile(user(), course_id()).await.unwrap();
        let entry = doc.lecture(lecture_id()).unwrap().quiz(quiz_id()).unwrap();
        assert!(entry.attempted());
        // latest attempt wins
        assert_eq!(entry.score(), Some(QuizScore::from_correct(2, 3)));
        assert_eq!(entry.completed_at(), Some(newer));
    }

    #[tokio::test]
    async fn reconcile_of_clean_state_changes_nothing() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        svc.mark_quiz_attempted(
            user(),
            course_id(),
            lecture_id(),
            quiz_id(),
            QuizScore::from_correct(2, 3),
        )
        .await
        .unwrap();
        let before = storage
            .progress
            .get_progress(user(), course_id())
            .await
            .unwrap()
            .unwrap();

        let mut attempt = Attempt::start(AttemptId::generate(), user(), quiz_id(), fixed_now());
        attempt
            .complete(vec![], QuizScore::from_correct(2, 3), fixed_now())
            .unwrap();
        storage.attempts.upsert_attempt(&attempt).await.unwrap();

        let after = svc.reconcile(user(), course_id()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn concurrent_marks_on_one_course_all_land() {
        let storage = Storage::in_memory();
        seed_catalog(&storage).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let a = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_a())
                    .await
            })
        };
        let b = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.mark_lesson_complete(user(), course_id(), lecture_id(), lesson_b())
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let doc = storage
            .progress
            .get_progress(user(), course_id())
            .await
            .unwrap()
            .unwrap();
        let lecture = doc.lecture(lecture_id()).unwrap();
        assert!(lecture.lesson(lesson_a()).unwrap().completed());
        assert!(lecture.lesson(lesson_b()).unwrap().completed());
    }
}
