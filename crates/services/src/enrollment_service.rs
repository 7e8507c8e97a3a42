use std::sync::Arc;

use chrono::{DateTime, Utc};

use course_core::model::{
    CourseId, CourseProgress, Enrollment, MAX_ACTIVE_ENROLLMENTS, Quiz, QuizId, UserId,
};
use storage::repository::{
    AttemptRepository, CatalogRepository, EnrollmentRepository, NewEnrollmentRecord,
    ProgressRepository, QuizRepository, UserRepository,
};

use crate::Clock;
use crate::error::EnrollmentError;

/// True while an enrollment still grants access: the deadline has not
/// passed and the learner has not finished the course.
#[must_use]
pub fn is_enrollment_active(
    enrollment: &Enrollment,
    progress: Option<&CourseProgress>,
    now: DateTime<Utc>,
) -> bool {
    let completed = progress.is_some_and(CourseProgress::completed);
    enrollment.is_active(completed, now)
}

/// An enrollment together with its derived expiry flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentStatus {
    pub enrollment: Enrollment,
    pub is_expired: bool,
}

/// Gatekeeps course membership: enrollment existence, frozen expiry, and
/// the active-enrollment ceiling.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    users: Arc<dyn UserRepository>,
    catalog: Arc<dyn CatalogRepository>,
    quizzes: Arc<dyn QuizRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        catalog: Arc<dyn CatalogRepository>,
        quizzes: Arc<dyn QuizRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            users,
            catalog,
            quizzes,
            enrollments,
            attempts,
            progress,
        }
    }

    /// Enroll a user in a course.
    ///
    /// The access deadline is computed from the course's expiry policy at
    /// enrollment time and frozen. Cross-references are added on both the
    /// user and the course roster.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::UserNotFound` or `CourseNotFound` when a
    /// party is missing, `AlreadyEnrolled` when an enrollment exists
    /// (carrying the existing record), `LimitExceeded` at the
    /// active-enrollment ceiling, and storage errors if persistence fails.
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<EnrollmentStatus, EnrollmentError> {
        let now = self.clock.now();
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(EnrollmentError::UserNotFound)?;
        let mut course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentError::CourseNotFound)?;

        if let Some(existing) = self.enrollments.get_enrollment(user_id, course_id).await? {
            let is_expired = existing.is_expired(now);
            return Err(EnrollmentError::AlreadyEnrolled {
                enrollment: existing,
                is_expired,
            });
        }

        let active = self.active_enrollment_count(user_id, now).await?;
        if active >= MAX_ACTIVE_ENROLLMENTS {
            return Err(EnrollmentError::LimitExceeded {
                limit: MAX_ACTIVE_ENROLLMENTS,
            });
        }

        let expires_at = course.expiry().duration().map(|d| now + d);
        let id = self
            .enrollments
            .insert_enrollment(NewEnrollmentRecord {
                user_id,
                course_id,
                enrolled_at: now,
                expires_at,
            })
            .await?;

        user.add_enrolled(course_id);
        self.users.upsert_user(&user).await?;
        course.add_enrolled(user_id);
        self.catalog.upsert_course(&course).await?;

        let enrollment = Enrollment::new(id, user_id, course_id, now, expires_at);
        let is_expired = enrollment.is_expired(now);
        Ok(EnrollmentStatus {
            enrollment,
            is_expired,
        })
    }

    /// Remove a user from a course and wipe their trail: the enrollment,
    /// the progress document, and every attempt on the course's quizzes.
    /// Re-enrolling afterwards starts from zero.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::UserNotFound` or `CourseNotFound` when a
    /// party is missing, `NotEnrolled` when no enrollment exists, and
    /// storage errors if the purge fails.
    pub async fn unenroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<(), EnrollmentError> {
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(EnrollmentError::UserNotFound)?;
        let mut course = self
            .catalog
            .get_course(course_id)
            .await?
            .ok_or(EnrollmentError::CourseNotFound)?;

        if self
            .enrollments
            .get_enrollment(user_id, course_id)
            .await?
            .is_none()
        {
            return Err(EnrollmentError::NotEnrolled);
        }

        self.enrollments
            .delete_enrollment(user_id, course_id)
            .await?;
        self.progress.delete_progress(user_id, course_id).await?;

        let quiz_ids: Vec<QuizId> = self
            .quizzes
            .quizzes_for_course(course_id)
            .await?
            .iter()
            .map(Quiz::id)
            .collect();
        let purged = self.attempts.delete_for_user(user_id, &quiz_ids).await?;
        if purged > 0 {
            tracing::debug!(
                user = user_id.value(),
                course = course_id.value(),
                purged,
                "purged quiz attempts on unenroll"
            );
        }

        user.remove_enrolled(course_id);
        self.users.upsert_user(&user).await?;
        course.remove_enrolled(user_id);
        self.catalog.upsert_course(&course).await?;
        Ok(())
    }

    async fn active_enrollment_count(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<usize, EnrollmentError> {
        let enrollments = self.enrollments.enrollments_for_user(user_id).await?;
        let mut active = 0;
        for enrollment in &enrollments {
            let progress = self
                .progress
                .get_progress(user_id, enrollment.course_id())
                .await?;
            if is_enrollment_active(enrollment, progress.as_ref(), now) {
                active += 1;
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use course_core::model::{
        Attempt, AttemptId, Course, CourseProgress, EnrollmentId, ExpiryPolicy, LectureId,
        LessonId, QuizScore, User,
    };
    use course_core::time::fixed_now;
    use storage::repository::Storage;

    fn service(storage: &Storage, clock: Clock) -> EnrollmentService {
        EnrollmentService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
        )
    }

    async fn seed_user(storage: &Storage, id: u64) -> UserId {
        let user = User::new(UserId::new(id), format!("Learner {id}"), fixed_now()).unwrap();
        storage.users.upsert_user(&user).await.unwrap();
        user.id()
    }

    async fn seed_course(storage: &Storage, id: u64, expiry: ExpiryPolicy) -> CourseId {
        let course = Course::new(
            CourseId::new(id),
            format!("Course {id}"),
            expiry,
            UserId::new(999),
            fixed_now(),
        )
        .unwrap();
        storage.catalog.upsert_course(&course).await.unwrap();
        course.id()
    }

    #[tokio::test]
    async fn enroll_links_user_and_course() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::none()).await;

        let svc = service(&storage, Clock::fixed(fixed_now()));
        let status = svc.enroll(user_id, course_id).await.unwrap();

        assert_eq!(status.enrollment.user_id(), user_id);
        assert_eq!(status.enrollment.course_id(), course_id);
        assert_eq!(status.enrollment.enrolled_at(), fixed_now());
        assert_eq!(status.enrollment.expires_at(), None);
        assert!(!status.is_expired);

        let user = storage.users.get_user(user_id).await.unwrap().unwrap();
        assert_eq!(user.enrolled(), &[course_id]);
        let course = storage
            .catalog
            .get_course(course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(course.enrolled(), &[user_id]);
    }

    #[tokio::test]
    async fn enroll_freezes_expiry_from_course_policy() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id =
            seed_course(&storage, 10, ExpiryPolicy::after_days(30).unwrap()).await;

        let svc = service(&storage, Clock::fixed(fixed_now()));
        let status = svc.enroll(user_id, course_id).await.unwrap();

        assert_eq!(
            status.enrollment.expires_at(),
            Some(fixed_now() + Duration::days(30))
        );
        assert!(!status.is_expired);
    }

    #[tokio::test]
    async fn enroll_requires_existing_parties() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::none()).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let err = svc.enroll(user_id, CourseId::new(404)).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::CourseNotFound));

        let err = svc.enroll(UserId::new(404), course_id).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::UserNotFound));
    }

    #[tokio::test]
    async fn enroll_twice_reports_existing_enrollment() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::none()).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let first = svc.enroll(user_id, course_id).await.unwrap();
        let err = svc.enroll(user_id, course_id).await.unwrap_err();

        match err {
            EnrollmentError::AlreadyEnrolled {
                enrollment,
                is_expired,
            } => {
                assert_eq!(enrollment.id(), first.enrollment.id());
                assert!(!is_expired);
            }
            other => panic!("expected AlreadyEnrolled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reenroll_after_deadline_reports_expired() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::after_days(1).unwrap()).await;

        service(&storage, Clock::fixed(fixed_now()))
            .enroll(user_id, course_id)
            .await
            .unwrap();

        let later = Clock::fixed(fixed_now() + Duration::days(2));
        let err = service(&storage, later)
            .enroll(user_id, course_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EnrollmentError::AlreadyEnrolled {
                is_expired: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn eleventh_active_enrollment_is_rejected() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        for id in 1..=10 {
            let course_id = seed_course(&storage, id, ExpiryPolicy::none()).await;
            svc.enroll(user_id, course_id).await.unwrap();
        }

        let eleventh = seed_course(&storage, 11, ExpiryPolicy::none()).await;
        let err = svc.enroll(user_id, eleventh).await.unwrap_err();
        assert!(matches!(
            err,
            EnrollmentError::LimitExceeded {
                limit: MAX_ACTIVE_ENROLLMENTS
            }
        ));
    }

    #[tokio::test]
    async fn completed_courses_do_not_count_against_the_cap() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        for id in 1..=10 {
            let course_id = seed_course(&storage, id, ExpiryPolicy::none()).await;
            svc.enroll(user_id, course_id).await.unwrap();
        }

        let mut done = CourseProgress::new(user_id, CourseId::new(3));
        done.set_override(true, fixed_now());
        storage.progress.upsert_progress(&done).await.unwrap();

        let eleventh = seed_course(&storage, 11, ExpiryPolicy::none()).await;
        let status = svc.enroll(user_id, eleventh).await.unwrap();
        assert_eq!(status.enrollment.course_id(), eleventh);
    }

    #[tokio::test]
    async fn expired_enrollments_do_not_count_against_the_cap() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;

        let early = service(&storage, Clock::fixed(fixed_now()));
        let short_lived = seed_course(&storage, 1, ExpiryPolicy::after_days(1).unwrap()).await;
        early.enroll(user_id, short_lived).await.unwrap();
        for id in 2..=10 {
            let course_id = seed_course(&storage, id, ExpiryPolicy::none()).await;
            early.enroll(user_id, course_id).await.unwrap();
        }

        let later = service(&storage, Clock::fixed(fixed_now() + Duration::days(2)));
        let eleventh = seed_course(&storage, 11, ExpiryPolicy::none()).await;
        let status = later.enroll(user_id, eleventh).await.unwrap();
        assert_eq!(status.enrollment.course_id(), eleventh);
    }

    #[tokio::test]
    async fn unenroll_requires_an_enrollment() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::none()).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));

        let err = svc.unenroll(user_id, course_id).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::NotEnrolled));
    }

    #[tokio::test]
    async fn unenroll_purges_progress_attempts_and_references() {
        let storage = Storage::in_memory();
        let user_id = seed_user(&storage, 1).await;
        let course_id = seed_course(&storage, 10, ExpiryPolicy::none()).await;
        let svc = service(&storage, Clock::fixed(fixed_now()));
        svc.enroll(user_id, course_id).await.unwrap();

        let quiz = Quiz::new(
            QuizId::new(50),
            LessonId::new(20),
            LectureId::new(30),
            course_id,
            "Checkpoint",
            30,
            5,
            UserId::new(999),
            fixed_now(),
        )
        .unwrap();
        storage.quizzes.upsert_quiz(&quiz).await.unwrap();

        let mut attempt =
            Attempt::start(AttemptId::generate(), user_id, quiz.id(), fixed_now());
        attempt
            .complete(vec![], QuizScore::from_correct(1, 2), fixed_now())
            .unwrap();
        storage.attempts.upsert_attempt(&attempt).await.unwrap();

        let mut progress = CourseProgress::new(user_id, course_id);
        progress.mark_quiz(
            LectureId::new(30),
            quiz.id(),
            QuizScore::from_correct(1, 2),
            fixed_now(),
        );
        storage.progress.upsert_progress(&progress).await.unwrap();

        svc.unenroll(user_id, course_id).await.unwrap();

        assert!(
            storage
                .enrollments
                .get_enrollment(user_id, course_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            storage
                .progress
                .get_progress(user_id, course_id)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            storage
                .attempts
                .completed_count(user_id, quiz.id())
                .await
                .unwrap(),
            0
        );

        let user = storage.users.get_user(user_id).await.unwrap().unwrap();
        assert!(user.enrolled().is_empty());
        let course = storage
            .catalog
            .get_course(course_id)
            .await
            .unwrap()
            .unwrap();
        assert!(course.enrolled().is_empty());
    }

    #[test]
    fn active_predicate_checks_expiry_and_completion() {
        let now = fixed_now();
        let open = Enrollment::new(
            EnrollmentId::new(1),
            UserId::new(1),
            CourseId::new(2),
            now,
            None,
        );
        assert!(is_enrollment_active(&open, None, now));

        let deadline = Enrollment::new(
            EnrollmentId::new(2),
            UserId::new(1),
            CourseId::new(2),
            now,
            Some(now),
        );
        assert!(is_enrollment_active(&deadline, None, now));
        assert!(!is_enrollment_active(
            &deadline,
            None,
            now + Duration::seconds(1)
        ));

        let mut finished = CourseProgress::new(UserId::new(1), CourseId::new(2));
        finished.set_override(true, now);
        assert!(!is_enrollment_active(&open, Some(&finished), now));

        let untouched = CourseProgress::new(UserId::new(1), CourseId::new(2));
        assert!(is_enrollment_active(&open, Some(&untouched), now));
    }
}
