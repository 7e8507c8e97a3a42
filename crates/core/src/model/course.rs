use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("expiry must be at least 1 day when enabled")]
    InvalidExpiryDays,
}

//
// ─── EXPIRY POLICY ─────────────────────────────────────────────────────────────
//

/// Access-expiry policy applied to enrollments in a course.
///
/// The deadline is computed once at enrollment time and frozen on the
/// enrollment row; editing the course later never moves existing deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    enabled: bool,
    days: u32,
}

impl ExpiryPolicy {
    /// Policy where enrollments never lapse.
    #[must_use]
    pub fn none() -> Self {
        Self {
            enabled: false,
            days: 0,
        }
    }

    /// Policy that expires an enrollment `days` after it is created.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::InvalidExpiryDays` if `days` is zero.
    pub fn after_days(days: u32) -> Result<Self, CourseError> {
        if days == 0 {
            return Err(CourseError::InvalidExpiryDays);
        }
        Ok(Self {
            enabled: true,
            days,
        })
    }

    // Accessors
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Enrollment lifetime, or `None` when expiry is disabled.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.enabled
            .then(|| Duration::days(i64::from(self.days)))
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course: an ordered list of lectures, plus enrollment policy.
///
/// The `enrolled` list mirrors the enrollment table the same way
/// `User::enrolled` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    published: bool,
    expiry: ExpiryPolicy,
    lectures: Vec<LectureId>,
    enrolled: Vec<UserId>,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Creates a new unpublished Course with no lectures.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` if title is empty or whitespace-only.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        expiry: ExpiryPolicy,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }

        Ok(Self {
            id,
            title: title.trim().to_owned(),
            published: false,
            expiry,
            lectures: Vec::new(),
            enrolled: Vec::new(),
            created_by,
            created_at,
        })
    }

    /// Rebuilds a Course from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` if the stored title is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: CourseId,
        title: impl Into<String>,
        published: bool,
        expiry: ExpiryPolicy,
        lectures: Vec<LectureId>,
        enrolled: Vec<UserId>,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let mut course = Self::new(id, title, expiry, created_by, created_at)?;
        course.published = published;
        course.lectures = lectures;
        course.enrolled = enrolled;
        Ok(course)
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn published(&self) -> bool {
        self.published
    }

    #[must_use]
    pub fn expiry(&self) -> ExpiryPolicy {
        self.expiry
    }

    /// Lecture ids in course order.
    #[must_use]
    pub fn lectures(&self) -> &[LectureId] {
        &self.lectures
    }

    #[must_use]
    pub fn enrolled(&self) -> &[UserId] {
        &self.enrolled
    }

    #[must_use]
    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Marks the course visible to learners.
    pub fn publish(&mut self) {
        self.published = true;
    }

    /// Appends a lecture to the course order. Duplicates are ignored.
    pub fn push_lecture(&mut self, lecture_id: LectureId) {
        if !self.lectures.contains(&lecture_id) {
            self.lectures.push(lecture_id);
        }
    }

    /// Records a learner on the course roster. Duplicates are ignored.
    pub fn add_enrolled(&mut self, user_id: UserId) {
        if !self.enrolled.contains(&user_id) {
            self.enrolled.push(user_id);
        }
    }

    /// Removes a learner from the course roster, if present.
    pub fn remove_enrolled(&mut self, user_id: UserId) {
        self.enrolled.retain(|u| *u != user_id);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
