use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AttemptId, OptionId, QuestionId, QuizId, UserId};
use crate::model::quiz::QuizScore;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt is already completed")]
    AlreadyCompleted,

    #[error("invalid persisted attempt: {0}")]
    InvalidPersistedState(String),
}

//
// ─── ATTEMPT TYPES ─────────────────────────────────────────────────────────────
//

/// Lifecycle state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "inprogress",
            AttemptStatus::Completed => "completed",
        }
    }
}

/// One selected answer inside an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptAnswer {
    pub question_id: QuestionId,
    pub selected_option_id: OptionId,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// A single run of a learner through a quiz.
///
/// An attempt is in-progress from `start` until it is completed exactly
/// once; completed attempts are immutable. A completed attempt normally
/// carries a score, but attempts swept closed when a newer submission wins
/// stay scoreless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    user_id: UserId,
    quiz_id: QuizId,
    status: AttemptStatus,
    answers: Vec<AttemptAnswer>,
    score: Option<QuizScore>,
    remaining_secs: Option<u32>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Starts a fresh in-progress attempt with no answers.
    #[must_use]
    pub fn start(id: AttemptId, user_id: UserId, quiz_id: QuizId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            quiz_id,
            status: AttemptStatus::InProgress,
            answers: Vec::new(),
            score: None,
            remaining_secs: None,
            started_at: now,
            completed_at: None,
        }
    }

    /// Rebuilds an Attempt from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidPersistedState` if the stored fields
    /// contradict the status (e.g. completed without a completion time).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        user_id: UserId,
        quiz_id: QuizId,
        status: AttemptStatus,
        answers: Vec<AttemptAnswer>,
        score: Option<QuizScore>,
        remaining_secs: Option<u32>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AttemptError> {
        match status {
            AttemptStatus::Completed => {
                if completed_at.is_none() {
                    return Err(AttemptError::InvalidPersistedState(
                        "completed attempt has no completed_at".to_owned(),
                    ));
                }
            }
            AttemptStatus::InProgress => {
                if completed_at.is_some() {
                    return Err(AttemptError::InvalidPersistedState(
                        "in-progress attempt has a completed_at".to_owned(),
                    ));
                }
                if score.is_some() {
                    return Err(AttemptError::InvalidPersistedState(
                        "in-progress attempt has a score".to_owned(),
                    ));
                }
            }
        }

        Ok(Self {
            id,
            user_id,
            quiz_id,
            status,
            answers,
            score,
            remaining_secs,
            started_at,
            completed_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn answers(&self) -> &[AttemptAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn score(&self) -> Option<QuizScore> {
        self.score
    }

    /// Seconds left on the client-side timer at the last checkpoint.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining_secs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self.status, AttemptStatus::InProgress)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.status, AttemptStatus::Completed)
    }

    /// Checkpoints answers-so-far and the remaining timer.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyCompleted` if the attempt is finished.
    pub fn record_answers(
        &mut self,
        answers: Vec<AttemptAnswer>,
        remaining_secs: Option<u32>,
    ) -> Result<(), AttemptError> {
        if self.is_completed() {
            return Err(AttemptError::AlreadyCompleted);
        }
        self.answers = answers;
        self.remaining_secs = remaining_secs;
        Ok(())
    }

    /// Finishes the attempt with its final answers and score.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyCompleted` if the attempt is finished.
    pub fn complete(
        &mut self,
        answers: Vec<AttemptAnswer>,
        score: QuizScore,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        if self.is_completed() {
            return Err(AttemptError::AlreadyCompleted);
        }
        self.answers = answers;
        self.score = Some(score);
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Closes a stale in-progress attempt without awarding a score.
    ///
    /// Used when a newer submission for the same quiz supersedes this one.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyCompleted` if the attempt is finished.
    pub fn complete_unscored(&mut self, now: DateTime<Utc>) -> Result<(), AttemptError> {
        if self.is_completed() {
            return Err(AttemptError::AlreadyCompleted);
        }
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn answer(q: u64, o: u64) -> AttemptAnswer {
        AttemptAnswer {
            question_id: QuestionId::new(q),
            selected_option_id: OptionId::new(o),
        }
    }

    fn started() -> Attempt {
        Attempt::start(
            AttemptId::generate(),
            UserId::new(1),
            QuizId::new(2),
            fixed_now(),
        )
    }

    #[test]
    fn start_is_in_progress_and_empty() {
        let attempt = started();
        assert!(attempt.is_in_progress());
        assert!(attempt.answers().is_empty());
        assert_eq!(attempt.score(), None);
        assert_eq!(attempt.completed_at(), None);
    }

    #[test]
    fn record_answers_checkpoints_state() {
        let mut attempt = started();
        attempt
            .record_answers(vec![answer(1, 3)], Some(42))
            .unwrap();

        assert_eq!(attempt.answers(), &[answer(1, 3)]);
        assert_eq!(attempt.remaining_secs(), Some(42));
        assert!(attempt.is_in_progress());
    }

    #[test]
    fn complete_locks_the_attempt() {
        let mut attempt = started();
        let later = fixed_now() + Duration::minutes(3);
        attempt
            .complete(vec![answer(1, 3)], QuizScore::from_correct(1, 1), later)
            .unwrap();

        assert!(attempt.is_completed());
        assert_eq!(attempt.score(), Some(QuizScore::from_correct(1, 1)));
        assert_eq!(attempt.completed_at(), Some(later));

        let err = attempt
            .record_answers(vec![answer(1, 2)], None)
            .unwrap_err();
        assert_eq!(err, AttemptError::AlreadyCompleted);

        let err = attempt
            .complete(vec![], QuizScore::zero(), later)
            .unwrap_err();
        assert_eq!(err, AttemptError::AlreadyCompleted);
    }

    #[test]
    fn complete_unscored_keeps_score_empty() {
        let mut attempt = started();
        attempt.complete_unscored(fixed_now()).unwrap();

        assert!(attempt.is_completed());
        assert_eq!(attempt.score(), None);
        assert!(attempt.completed_at().is_some());
    }

    #[test]
    fn from_persisted_rejects_contradictions() {
        let err = Attempt::from_persisted(
            AttemptId::generate(),
            UserId::new(1),
            QuizId::new(2),
            AttemptStatus::Completed,
            vec![],
            None,
            None,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::InvalidPersistedState(_)));

        let err = Attempt::from_persisted(
            AttemptId::generate(),
            UserId::new(1),
            QuizId::new(2),
            AttemptStatus::InProgress,
            vec![],
            Some(QuizScore::zero()),
            None,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::InvalidPersistedState(_)));
    }

    #[test]
    fn from_persisted_allows_swept_completed_attempt() {
        let attempt = Attempt::from_persisted(
            AttemptId::generate(),
            UserId::new(1),
            QuizId::new(2),
            AttemptStatus::Completed,
            vec![answer(1, 1)],
            None,
            Some(10),
            fixed_now(),
            Some(fixed_now()),
        )
        .unwrap();

        assert!(attempt.is_completed());
        assert_eq!(attempt.score(), None);
    }

    #[test]
    fn status_as_str() {
        assert_eq!(AttemptStatus::InProgress.as_str(), "inprogress");
        assert_eq!(AttemptStatus::Completed.as_str(), "completed");
    }
}
