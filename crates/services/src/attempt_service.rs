use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use course_core::model::{
    Attempt, AttemptAnswer, AttemptError, AttemptId, OptionId, Question, QuestionId, Quiz,
    QuizId, QuizScore, UserId,
};
use storage::repository::{AttemptRepository, CatalogRepository, QuizRepository};

use crate::Clock;
use crate::error::{AttemptServiceError, ProgressError};
use crate::progress::ProgressService;

/// A question as handed to a learner: text and options, no answer keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub id: OptionId,
    pub text: String,
}

impl QuestionView {
    #[must_use]
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id(),
            text: question.text().to_owned(),
            options: question
                .options()
                .iter()
                .map(|o| OptionView {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

/// An open attempt bundled with what the learner needs to take it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSession {
    pub attempt: Attempt,
    pub questions: Vec<QuestionView>,
    pub seconds_per_question: u32,
}

/// Outcome of a graded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAttempt {
    pub attempt: Attempt,
    pub score: QuizScore,
    pub correct: u32,
    pub total_questions: u32,
}

/// Runs quiz attempts end to end: grading against stored answer keys,
/// attempt-budget enforcement, and folding results into course progress.
#[derive(Clone)]
pub struct AttemptService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: ProgressService,
    shuffle: bool,
}

impl AttemptService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        progress: ProgressService,
    ) -> Self {
        Self {
            clock,
            catalog,
            quizzes,
            attempts,
            progress,
            shuffle: false,
        }
    }

    /// Shuffles question and option order in delivered sessions.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Takes a quiz in one shot: grades the answers, persists a completed
    /// attempt, and folds the result into the learner's course progress.
    ///
    /// A quiz with no questions grades to zero rather than failing; the
    /// deliberate path for refusing empty quizzes is
    /// [`AttemptService::submit`].
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::QuizNotFound` for an unknown quiz,
    /// `MaxAttemptsReached` when the completed-attempt budget is spent,
    /// `DataIntegrity` when the quiz's parent references are broken, and
    /// storage errors if persistence fails.
    pub async fn attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        answers: Vec<AttemptAnswer>,
    ) -> Result<ScoredAttempt, AttemptServiceError> {
        let now = self.clock.now();
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(AttemptServiceError::QuizNotFound)?;
        self.check_attempt_budget(user_id, &quiz).await?;

        let questions = self.quizzes.questions_for_quiz(quiz_id).await?;
        let (correct, total) = score_answers(&questions, &answers);
        let score = QuizScore::from_correct(correct, total);

        let mut attempt = Attempt::start(AttemptId::generate(), user_id, quiz_id, now);
        attempt.complete(answers, score, now)?;
        self.attempts.upsert_attempt(&attempt).await?;

        self.record_on_progress(&quiz, user_id, score).await?;
        Ok(ScoredAttempt {
            attempt,
            score,
            correct,
            total_questions: total,
        })
    }

    /// Opens a session on a quiz: resumes the learner's oldest in-progress
    /// attempt or starts a fresh one, and delivers the questions without
    /// their answer keys.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::QuizNotFound` for an unknown quiz, or
    /// a storage error.
    pub async fn start_or_resume(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<AttemptSession, AttemptServiceError> {
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(AttemptServiceError::QuizNotFound)?;

        let open = self
            .attempts
            .in_progress_for_user_quiz(user_id, quiz_id)
            .await?;
        let attempt = match open.into_iter().next() {
            Some(existing) => existing,
            None => {
                let fresh =
                    Attempt::start(AttemptId::generate(), user_id, quiz_id, self.clock.now());
                self.attempts.upsert_attempt(&fresh).await?;
                fresh
            }
        };

        let questions = self.quizzes.questions_for_quiz(quiz_id).await?;
        Ok(AttemptSession {
            questions: self.question_views(&questions),
            seconds_per_question: quiz.seconds_per_question(),
            attempt,
        })
    }

    /// Checkpoints an open attempt with the learner's current answers and
    /// remaining time.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::AttemptNotFound` for an unknown
    /// attempt, `Forbidden` when the caller does not own it,
    /// `Attempt(AlreadyCompleted)` once it has been submitted, or a
    /// storage error.
    pub async fn update_in_progress(
        &self,
        attempt_id: AttemptId,
        caller: UserId,
        answers: Vec<AttemptAnswer>,
        remaining_secs: Option<u32>,
    ) -> Result<Attempt, AttemptServiceError> {
        let mut attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(AttemptServiceError::AttemptNotFound)?;
        if attempt.user_id() != caller {
            return Err(AttemptServiceError::Forbidden);
        }
        attempt.record_answers(answers, remaining_secs)?;
        self.attempts.upsert_attempt(&attempt).await?;
        Ok(attempt)
    }

    /// Grades and closes an open attempt.
    ///
    /// Any other in-progress attempts the learner has on the same quiz are
    /// swept to completed without a score; swept attempts still use up the
    /// attempt budget. The result is folded into the learner's course
    /// progress.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::AttemptNotFound`, `Forbidden` for a
    /// caller who does not own the attempt (nothing is mutated),
    /// `Attempt(AlreadyCompleted)` on re-submission, `QuizNotFound` when
    /// the quiz has vanished, `NoQuestions` for an empty quiz,
    /// `MaxAttemptsReached` when the budget is spent, `DataIntegrity` when
    /// the quiz's parent references are broken, and storage errors if
    /// persistence fails.
    pub async fn submit(
        &self,
        attempt_id: AttemptId,
        caller: UserId,
        answers: Vec<AttemptAnswer>,
    ) -> Result<ScoredAttempt, AttemptServiceError> {
        let now = self.clock.now();
        let mut attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(AttemptServiceError::AttemptNotFound)?;
        if attempt.user_id() != caller {
            return Err(AttemptServiceError::Forbidden);
        }
        if attempt.is_completed() {
            return Err(AttemptError::AlreadyCompleted.into());
        }

        let quiz = self
            .quizzes
            .get_quiz(attempt.quiz_id())
            .await?
            .ok_or(AttemptServiceError::QuizNotFound)?;
        let questions = self.quizzes.questions_for_quiz(quiz.id()).await?;
        if questions.is_empty() {
            return Err(AttemptServiceError::NoQuestions);
        }
        self.check_attempt_budget(caller, &quiz).await?;

        let (correct, total) = score_answers(&questions, &answers);
        let score = QuizScore::from_correct(correct, total);
        attempt.complete(answers, score, now)?;
        self.attempts.upsert_attempt(&attempt).await?;

        self.sweep_open_attempts(caller, quiz.id(), now).await?;
        self.record_on_progress(&quiz, caller, score).await?;
        Ok(ScoredAttempt {
            attempt,
            score,
            correct,
            total_questions: total,
        })
    }

    async fn check_attempt_budget(
        &self,
        user_id: UserId,
        quiz: &Quiz,
    ) -> Result<(), AttemptServiceError> {
        let used = self.attempts.completed_count(user_id, quiz.id()).await?;
        if used >= quiz.max_attempts() {
            return Err(AttemptServiceError::MaxAttemptsReached {
                max: quiz.max_attempts(),
            });
        }
        Ok(())
    }

    /// Closes every other in-progress attempt for the same user and quiz.
    async fn sweep_open_attempts(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptServiceError> {
        let open = self
            .attempts
            .in_progress_for_user_quiz(user_id, quiz_id)
            .await?;
        let swept = u32::try_from(open.len()).unwrap_or(u32::MAX);
        for mut stray in open {
            stray.complete_unscored(now)?;
            self.attempts.upsert_attempt(&stray).await?;
        }
        if swept > 0 {
            tracing::debug!(
                user = user_id.value(),
                quiz = quiz_id.value(),
                swept,
                "closed stray in-progress attempts"
            );
        }
        Ok(())
    }

    /// Folds a completed attempt into the learner's progress document via
    /// the quiz's parent references. Passing a quiz also completes its
    /// hosting lesson.
    async fn record_on_progress(
        &self,
        quiz: &Quiz,
        user_id: UserId,
        score: QuizScore,
    ) -> Result<(), AttemptServiceError> {
        if self.catalog.get_lesson(quiz.lesson_id()).await?.is_none() {
            return Err(self.broken_reference(quiz, "lesson"));
        }
        if self.catalog.get_lecture(quiz.lecture_id()).await?.is_none() {
            return Err(self.broken_reference(quiz, "lecture"));
        }

        self.progress
            .mark_quiz_attempted(user_id, quiz.course_id(), quiz.lecture_id(), quiz.id(), score)
            .await
            .map_err(progress_fault)?;
        self.progress
            .mark_lesson_complete(user_id, quiz.course_id(), quiz.lecture_id(), quiz.lesson_id())
            .await
            .map_err(progress_fault)?;
        Ok(())
    }

    fn broken_reference(&self, quiz: &Quiz, missing: &str) -> AttemptServiceError {
        tracing::error!(
            quiz = quiz.id().value(),
            lesson = quiz.lesson_id().value(),
            lecture = quiz.lecture_id().value(),
            missing,
            "quiz parent reference is broken"
        );
        AttemptServiceError::DataIntegrity(format!(
            "quiz {} references a missing {missing}",
            quiz.id()
        ))
    }

    fn question_views(&self, questions: &[Question]) -> Vec<QuestionView> {
        let mut views: Vec<QuestionView> =
            questions.iter().map(QuestionView::from_question).collect();
        if self.shuffle {
            let mut rng = rng();
            views.shuffle(&mut rng);
            for view in &mut views {
                view.options.shuffle(&mut rng);
            }
        }
        views
    }
}

/// Grades answers against the stored keys: per question the learner's last
/// submitted answer counts, and an option id that does not belong to the
/// question is simply wrong. Returns (correct, total questions).
fn score_answers(questions: &[Question], answers: &[AttemptAnswer]) -> (u32, u32) {
    let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
    let correct = questions
        .iter()
        .filter(|question| {
            answers
                .iter()
                .rev()
                .find(|a| a.question_id == question.id())
                .is_some_and(|a| question.is_correct_choice(a.selected_option_id))
        })
        .count();
    (u32::try_from(correct).unwrap_or(u32::MAX), total)
}

/// Progress failures during the drive are integrity faults from this
/// service's point of view: the quiz itself vouched for the references.
fn progress_fault(err: ProgressError) -> AttemptServiceError {
    match err {
        ProgressError::CourseNotFound => {
            tracing::error!("quiz references a missing course");
            AttemptServiceError::DataIntegrity("quiz references a missing course".to_owned())
        }
        ProgressError::ProgressNotFound => AttemptServiceError::DataIntegrity(
            "progress document vanished during update".to_owned(),
        ),
        ProgressError::Storage(e) => AttemptServiceError::Storage(e),
    }
}
