use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, EnrollmentId, UserId};

/// Ceiling on simultaneously active enrollments per learner.
///
/// Expired enrollments and enrollments whose course is finished do not
/// count against the ceiling.
pub const MAX_ACTIVE_ENROLLMENTS: usize = 10;

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// Links a learner to a course, with an optional frozen access deadline.
///
/// `expires_at` is computed from the course's expiry policy at enrollment
/// time and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    id: EnrollmentId,
    user_id: UserId,
    course_id: CourseId,
    enrolled_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    #[must_use]
    pub fn new(
        id: EnrollmentId,
        user_id: UserId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            course_id,
            enrolled_at,
            expires_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> EnrollmentId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True once the access deadline has passed.
    ///
    /// An enrollment with no deadline never expires, and the deadline
    /// instant itself still counts as valid access.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// True while the enrollment counts against the active ceiling:
    /// not expired and the course not yet completed.
    #[must_use]
    pub fn is_active(&self, course_completed: bool, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !course_completed
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
