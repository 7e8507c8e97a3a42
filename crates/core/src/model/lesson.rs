use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::model::ids::{LectureId, LessonId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("lesson link is not a valid URL: {0}")]
    InvalidLink(String),

    #[error("lesson already has a quiz attached")]
    QuizAlreadyAttached,
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// A single unit of content inside a lecture.
///
/// At most one quiz can hang off a lesson; attaching a second is rejected
/// here and again at the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    lecture_id: LectureId,
    title: String,
    video: Option<Url>,
    resources: Vec<Url>,
    quiz: Option<QuizId>,
    created_at: DateTime<Utc>,
}

impl Lesson {
    /// Creates a new Lesson with no quiz attached.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` if title is empty or whitespace-only,
    /// or `LessonError::InvalidLink` if the video or a resource link does not
    /// parse as a URL.
    pub fn new(
        id: LessonId,
        lecture_id: LectureId,
        title: impl Into<String>,
        video: Option<&str>,
        resources: &[&str],
        created_at: DateTime<Utc>,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }

        let video = video.map(parse_link).transpose()?;
        let resources = resources
            .iter()
            .map(|raw| parse_link(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            lecture_id,
            title: title.trim().to_owned(),
            video,
            resources,
            quiz: None,
            created_at,
        })
    }

    /// Rebuilds a Lesson from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` if the stored title is empty.
    pub fn from_persisted(
        id: LessonId,
        lecture_id: LectureId,
        title: impl Into<String>,
        video: Option<Url>,
        resources: Vec<Url>,
        quiz: Option<QuizId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }

        Ok(Self {
            id,
            lecture_id,
            title: title.trim().to_owned(),
            video,
            resources,
            quiz,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn lecture_id(&self) -> LectureId {
        self.lecture_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn video(&self) -> Option<&Url> {
        self.video.as_ref()
    }

    #[must_use]
    pub fn resources(&self) -> &[Url] {
        &self.resources
    }

    #[must_use]
    pub fn quiz(&self) -> Option<QuizId> {
        self.quiz
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attaches a quiz to this lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::QuizAlreadyAttached` if a quiz is already set.
    pub fn attach_quiz(&mut self, quiz_id: QuizId) -> Result<(), LessonError> {
        if self.quiz.is_some() {
            return Err(LessonError::QuizAlreadyAttached);
        }
        self.quiz = Some(quiz_id);
        Ok(())
    }
}

fn parse_link(raw: &str) -> Result<Url, LessonError> {
    let trimmed = raw.trim();
    Url::parse(trimmed).map_err(|_| LessonError::InvalidLink(trimmed.to_owned()))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn lesson() -> Lesson {
        Lesson::new(
            LessonId::new(1),
            LectureId::new(1),
            "Borrowing",
            Some("https://videos.example.com/borrowing.mp4"),
            &["https://docs.example.com/borrowing.pdf"],
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn lesson_new_rejects_empty_title() {
        let err = Lesson::new(
            LessonId::new(1),
            LectureId::new(1),
            "   ",
            None,
            &[],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, LessonError::EmptyTitle);
    }

    #[test]
    fn lesson_rejects_bad_video_link() {
        let err = Lesson::new(
            LessonId::new(1),
            LectureId::new(1),
            "Borrowing",
            Some("not a url"),
            &[],
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, LessonError::InvalidLink(_)));
    }

    #[test]
    fn lesson_parses_links() {
        let lesson = lesson();
        assert_eq!(
            lesson.video().map(Url::as_str),
            Some("https://videos.example.com/borrowing.mp4")
        );
        assert_eq!(lesson.resources().len(), 1);
        assert_eq!(lesson.quiz(), None);
    }

    #[test]
    fn attach_quiz_only_once() {
        let mut lesson = lesson();
        lesson.attach_quiz(QuizId::new(9)).unwrap();
        assert_eq!(lesson.quiz(), Some(QuizId::new(9)));

        let err = lesson.attach_quiz(QuizId::new(10)).unwrap_err();
        assert_eq!(err, LessonError::QuizAlreadyAttached);
        assert_eq!(lesson.quiz(), Some(QuizId::new(9)));
    }
}
