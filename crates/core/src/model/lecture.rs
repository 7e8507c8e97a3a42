use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, LessonId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LectureError {
    #[error("lecture title cannot be empty")]
    EmptyTitle,
}

//
// ─── LECTURE ───────────────────────────────────────────────────────────────────
//

/// A section of a course holding an ordered list of lessons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lecture {
    id: LectureId,
    course_id: CourseId,
    title: String,
    lessons: Vec<LessonId>,
    created_at: DateTime<Utc>,
}

impl Lecture {
    /// Creates a new Lecture with no lessons.
    ///
    /// # Errors
    ///
    /// Returns `LectureError::EmptyTitle` if title is empty or whitespace-only.
    pub fn new(
        id: LectureId,
        course_id: CourseId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LectureError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LectureError::EmptyTitle);
        }

        Ok(Self {
            id,
            course_id,
            title: title.trim().to_owned(),
            lessons: Vec::new(),
            created_at,
        })
    }

    /// Rebuilds a Lecture from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `LectureError::EmptyTitle` if the stored title is empty.
    pub fn from_persisted(
        id: LectureId,
        course_id: CourseId,
        title: impl Into<String>,
        lessons: Vec<LessonId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LectureError> {
        let mut lecture = Self::new(id, course_id, title, created_at)?;
        lecture.lessons = lessons;
        Ok(lecture)
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> LectureId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Lesson ids in lecture order.
    #[must_use]
    pub fn lessons(&self) -> &[LessonId] {
        &self.lessons
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Appends a lesson to the lecture order. Duplicates are ignored.
    pub fn push_lesson(&mut self, lesson_id: LessonId) {
        if !self.lessons.contains(&lesson_id) {
            self.lessons.push(lesson_id);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn lecture_new_rejects_empty_title() {
        let err = Lecture::new(LectureId::new(1), CourseId::new(1), "  ", fixed_now()).unwrap_err();
        assert_eq!(err, LectureError::EmptyTitle);
    }

    #[test]
    fn lecture_trims_title() {
        let lecture =
            Lecture::new(LectureId::new(1), CourseId::new(2), " Ownership ", fixed_now()).unwrap();
        assert_eq!(lecture.title(), "Ownership");
        assert_eq!(lecture.course_id(), CourseId::new(2));
        assert!(lecture.lessons().is_empty());
    }

    #[test]
    fn push_lesson_keeps_order_and_ignores_duplicates() {
        let mut lecture =
            Lecture::new(LectureId::new(1), CourseId::new(1), "Ownership", fixed_now()).unwrap();

        lecture.push_lesson(LessonId::new(5));
        lecture.push_lesson(LessonId::new(6));
        lecture.push_lesson(LessonId::new(5));

        assert_eq!(lecture.lessons(), &[LessonId::new(5), LessonId::new(6)]);
    }
}
