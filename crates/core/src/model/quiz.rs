use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, LessonId, OptionId, QuestionId, QuizId, UserId};

/// Attempt ceiling applied when a quiz is created without an explicit limit.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("max attempts must be > 0")]
    InvalidMaxAttempts,

    #[error("seconds per question must be between 5 and 600")]
    InvalidSecondsPerQuestion,

    #[error("score {0} is outside the 0-10 scale")]
    ScoreOutOfRange(u8),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question needs at least 2 options")]
    TooFewOptions,

    #[error("option text cannot be empty")]
    EmptyOptionText,

    #[error("question needs at least one correct option")]
    NoCorrectOption,

    #[error("option ids within a question must be unique")]
    DuplicateOptionId,
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Points a quiz attempt earned, always on the fixed 0-10 scale.
///
/// Every scoring path normalizes through [`QuizScore::from_correct`], so a
/// 7/10 quiz and a 2/3 quiz land on the same scale (7 points each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuizScore(u8);

impl QuizScore {
    /// Upper end of the scale.
    pub const MAX_POINTS: u8 = 10;

    /// Score for an attempt with no correct answers.
    #[must_use]
    pub fn zero() -> Self {
        Self(0)
    }

    /// Normalizes a raw correct/total count onto the 0-10 scale,
    /// rounding half up.
    ///
    /// A quiz with zero questions scores zero; callers are expected to
    /// reject such quizzes before scoring.
    #[must_use]
    pub fn from_correct(correct: u32, total: u32) -> Self {
        if total == 0 {
            return Self(0);
        }
        let correct = correct.min(total);
        let points = (u64::from(correct) * 20 + u64::from(total)) / (u64::from(total) * 2);
        Self(u8::try_from(points).unwrap_or(Self::MAX_POINTS))
    }

    /// Rebuilds a score from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ScoreOutOfRange` if the stored value exceeds 10.
    pub fn from_persisted(points: u8) -> Result<Self, QuizError> {
        if points > Self::MAX_POINTS {
            return Err(QuizError::ScoreOutOfRange(points));
        }
        Ok(Self(points))
    }

    /// Points earned, 0 through 10.
    #[must_use]
    pub fn points(&self) -> u8 {
        self.0
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A quiz attached to a lesson.
///
/// Parent ids are carried directly so the progress layer can locate the
/// owning lecture and course without walking the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    id: QuizId,
    lesson_id: LessonId,
    lecture_id: LectureId,
    course_id: CourseId,
    title: String,
    seconds_per_question: u32,
    max_attempts: u32,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl Quiz {
    /// Creates a new Quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyTitle` if title is empty or whitespace-only,
    /// `QuizError::InvalidMaxAttempts` if the attempt ceiling is zero, or
    /// `QuizError::InvalidSecondsPerQuestion` if the timer is out of bounds.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuizId,
        lesson_id: LessonId,
        lecture_id: LectureId,
        course_id: CourseId,
        title: impl Into<String>,
        seconds_per_question: u32,
        max_attempts: u32,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if max_attempts == 0 {
            return Err(QuizError::InvalidMaxAttempts);
        }
        if !(5..=600).contains(&seconds_per_question) {
            return Err(QuizError::InvalidSecondsPerQuestion);
        }

        Ok(Self {
            id,
            lesson_id,
            lecture_id,
            course_id,
            title: title.trim().to_owned(),
            seconds_per_question,
            max_attempts,
            created_by,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn lecture_id(&self) -> LectureId {
        self.lecture_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn seconds_per_question(&self) -> u32 {
        self.seconds_per_question
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// One selectable answer within a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// A multiple-choice question belonging to a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    quiz_id: QuizId,
    text: String,
    options: Vec<QuestionOption>,
}

impl Question {
    /// Creates a new Question.
    ///
    /// # Errors
    ///
    /// Returns an error unless the question has non-empty text, at least two
    /// options with unique ids and non-empty texts, and at least one option
    /// flagged correct.
    pub fn new(
        id: QuestionId,
        quiz_id: QuizId,
        text: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions);
        }
        if options.iter().any(|o| o.text.trim().is_empty()) {
            return Err(QuestionError::EmptyOptionText);
        }
        if !options.iter().any(|o| o.is_correct) {
            return Err(QuestionError::NoCorrectOption);
        }
        for (i, option) in options.iter().enumerate() {
            if options[..i].iter().any(|prev| prev.id == option.id) {
                return Err(QuestionError::DuplicateOptionId);
            }
        }

        Ok(Self {
            id,
            quiz_id,
            text: text.trim().to_owned(),
            options,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption] {
        &self.options
    }

    /// True if the selected option exists and is flagged correct.
    #[must_use]
    pub fn is_correct_choice(&self, selected: OptionId) -> bool {
        self.options
            .iter()
            .any(|o| o.id == selected && o.is_correct)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
