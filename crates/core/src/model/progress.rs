use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, LectureId, LessonId, QuizId, UserId};
use crate::model::quiz::QuizScore;

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// The lessons and quizzes a single lecture actually contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LectureOutline {
    lessons: Vec<LessonId>,
    quizzes: Vec<QuizId>,
}

impl LectureOutline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lesson to the outline. Duplicates are ignored.
    pub fn push_lesson(&mut self, lesson_id: LessonId) {
        if !self.lessons.contains(&lesson_id) {
            self.lessons.push(lesson_id);
        }
    }

    /// Adds a quiz to the outline. Duplicates are ignored.
    pub fn push_quiz(&mut self, quiz_id: QuizId) {
        if !self.quizzes.contains(&quiz_id) {
            self.quizzes.push(quiz_id);
        }
    }

    // Accessors
    #[must_use]
    pub fn lessons(&self) -> &[LessonId] {
        &self.lessons
    }

    #[must_use]
    pub fn quizzes(&self) -> &[QuizId] {
        &self.quizzes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty() && self.quizzes.is_empty()
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.lessons.len() + self.quizzes.len()
    }

    /// True if the given progress covers every lesson and quiz listed here.
    ///
    /// Progress entries for items not in the outline are ignored, so stale
    /// rows can never complete a lecture on their own.
    #[must_use]
    pub fn satisfied_by(&self, progress: Option<&LectureProgress>) -> bool {
        let lessons_done = self.lessons.iter().all(|id| {
            progress
                .and_then(|p| p.lesson(*id))
                .is_some_and(|l| l.completed())
        });
        let quizzes_done = self.quizzes.iter().all(|id| {
            progress
                .and_then(|p| p.quiz(*id))
                .is_some_and(|q| q.attempted())
        });
        lessons_done && quizzes_done
    }
}

/// The true structure of a course at evaluation time, in course order.
///
/// Completion is always judged against this, never against whatever
/// entries happen to exist in a progress document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    course_id: CourseId,
    lectures: Vec<(LectureId, LectureOutline)>,
}

impl CourseOutline {
    #[must_use]
    pub fn new(course_id: CourseId) -> Self {
        Self {
            course_id,
            lectures: Vec::new(),
        }
    }

    /// Appends a lecture's outline, replacing any earlier entry for the
    /// same lecture.
    pub fn push_lecture(&mut self, lecture_id: LectureId, outline: LectureOutline) {
        if let Some(slot) = self.lectures.iter_mut().find(|(id, _)| *id == lecture_id) {
            slot.1 = outline;
        } else {
            self.lectures.push((lecture_id, outline));
        }
    }

    // Accessors
    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Lecture outlines in course order.
    #[must_use]
    pub fn lectures(&self) -> &[(LectureId, LectureOutline)] {
        &self.lectures
    }

    #[must_use]
    pub fn lecture(&self, lecture_id: LectureId) -> Option<&LectureOutline> {
        self.lectures
            .iter()
            .find(|(id, _)| *id == lecture_id)
            .map(|(_, outline)| outline)
    }

    #[must_use]
    pub fn contains_lecture(&self, lecture_id: LectureId) -> bool {
        self.lecture(lecture_id).is_some()
    }

    #[must_use]
    pub fn total_units(&self) -> usize {
        self.lectures.iter().map(|(_, o)| o.unit_count()).sum()
    }

    #[must_use]
    pub fn total_lessons(&self) -> usize {
        self.lectures.iter().map(|(_, o)| o.lessons().len()).sum()
    }

    #[must_use]
    pub fn total_quizzes(&self) -> usize {
        self.lectures.iter().map(|(_, o)| o.quizzes().len()).sum()
    }
}

//
// ─── LEAF PROGRESS ─────────────────────────────────────────────────────────────
//

/// Completion marker for one lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonProgress {
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    #[must_use]
    pub fn from_persisted(completed: bool, completed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            completed,
            completed_at,
        }
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Marks the lesson done. Re-marking just refreshes the timestamp.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.completed = true;
        self.completed_at = Some(now);
    }
}

/// Attempt marker for one quiz, holding the latest normalized score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizProgress {
    attempted: bool,
    score: Option<QuizScore>,
    completed_at: Option<DateTime<Utc>>,
}

impl QuizProgress {
    #[must_use]
    pub fn from_persisted(
        attempted: bool,
        score: Option<QuizScore>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            attempted,
            score,
            completed_at,
        }
    }

    #[must_use]
    pub fn attempted(&self) -> bool {
        self.attempted
    }

    #[must_use]
    pub fn score(&self) -> Option<QuizScore> {
        self.score
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Records an attempt. A newer attempt overwrites the stored score.
    pub fn record(&mut self, score: QuizScore, now: DateTime<Utc>) {
        self.attempted = true;
        self.score = Some(score);
        self.completed_at = Some(now);
    }
}

//
// ─── LECTURE PROGRESS ──────────────────────────────────────────────────────────
//

/// Per-lecture progress: keyed maps of lesson and quiz markers plus a
/// derived completion flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LectureProgress {
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    lessons: BTreeMap<LessonId, LessonProgress>,
    quizzes: BTreeMap<QuizId, QuizProgress>,
}

impl LectureProgress {
    #[must_use]
    pub fn from_persisted(
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        lessons: BTreeMap<LessonId, LessonProgress>,
        quizzes: BTreeMap<QuizId, QuizProgress>,
    ) -> Self {
        Self {
            completed,
            completed_at,
            lessons,
            quizzes,
        }
    }

    // Accessors
    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn lessons(&self) -> &BTreeMap<LessonId, LessonProgress> {
        &self.lessons
    }

    #[must_use]
    pub fn quizzes(&self) -> &BTreeMap<QuizId, QuizProgress> {
        &self.quizzes
    }

    #[must_use]
    pub fn lesson(&self, lesson_id: LessonId) -> Option<&LessonProgress> {
        self.lessons.get(&lesson_id)
    }

    #[must_use]
    pub fn quiz(&self, quiz_id: QuizId) -> Option<&QuizProgress> {
        self.quizzes.get(&quiz_id)
    }

    fn mark_lesson(&mut self, lesson_id: LessonId, now: DateTime<Utc>) {
        self.lessons.entry(lesson_id).or_default().complete(now);
    }

    fn mark_quiz(&mut self, quiz_id: QuizId, score: QuizScore, now: DateTime<Utc>) {
        self.quizzes.entry(quiz_id).or_default().record(score, now);
    }

    /// Recomputes the lecture flag against the lecture's true outline.
    ///
    /// The completion time is set when the lecture first becomes complete
    /// and cleared again if the outline is no longer satisfied.
    fn recompute(&mut self, outline: &LectureOutline, now: DateTime<Utc>) {
        if outline.satisfied_by(Some(self)) {
            if !self.completed {
                self.completed = true;
                self.completed_at = Some(now);
            }
        } else {
            self.completed = false;
            self.completed_at = None;
        }
    }

    fn force_complete(&mut self, now: DateTime<Utc>) {
        self.completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    fn clear_completion(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// Everything one learner has done in one course, keyed by entity id.
///
/// Marking operations lazily create whatever entries they need, so callers
/// never have to pre-build the document. The roll-up flags are derived by
/// [`CourseProgress::recompute`] and only trustworthy after it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    user_id: UserId,
    course_id: CourseId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    lectures: BTreeMap<LectureId, LectureProgress>,
}

impl CourseProgress {
    /// Creates an empty progress document.
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId) -> Self {
        Self {
            user_id,
            course_id,
            completed: false,
            completed_at: None,
            lectures: BTreeMap::new(),
        }
    }

    /// Rebuilds a progress document from persisted state.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        lectures: BTreeMap<LectureId, LectureProgress>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            completed,
            completed_at,
            lectures,
        }
    }

    // Accessors
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn lectures(&self) -> &BTreeMap<LectureId, LectureProgress> {
        &self.lectures
    }

    #[must_use]
    pub fn lecture(&self, lecture_id: LectureId) -> Option<&LectureProgress> {
        self.lectures.get(&lecture_id)
    }

    /// Marks a lesson complete, creating entries as needed.
    ///
    /// Marking the same lesson twice leaves a single entry and just
    /// refreshes its timestamp.
    pub fn mark_lesson(
        &mut self,
        lecture_id: LectureId,
        lesson_id: LessonId,
        now: DateTime<Utc>,
    ) {
        self.lectures
            .entry(lecture_id)
            .or_default()
            .mark_lesson(lesson_id, now);
    }

    /// Marks a quiz attempted with its normalized score, creating entries
    /// as needed. A newer attempt overwrites the stored score.
    pub fn mark_quiz(
        &mut self,
        lecture_id: LectureId,
        quiz_id: QuizId,
        score: QuizScore,
        now: DateTime<Utc>,
    ) {
        self.lectures
            .entry(lecture_id)
            .or_default()
            .mark_quiz(quiz_id, score, now);
    }

    /// Recomputes every roll-up flag against the course's true outline.
    ///
    /// A lecture is complete when all of its outline lessons are completed
    /// and all of its outline quizzes attempted. The course is complete
    /// when it has at least one unit of content and every outline lecture
    /// is complete. Entries for lectures that left the outline are cleared
    /// and never counted.
    pub fn recompute(&mut self, outline: &CourseOutline, now: DateTime<Utc>) {
        for (lecture_id, entry) in &mut self.lectures {
            match outline.lecture(*lecture_id) {
                Some(lecture_outline) => entry.recompute(lecture_outline, now),
                None => entry.clear_completion(),
            }
        }

        let all_done = outline.total_units() > 0
            && outline.lectures().iter().all(|(id, lecture_outline)| {
                match self.lectures.get(id) {
                    Some(entry) => entry.completed(),
                    None => lecture_outline.is_empty(),
                }
            });

        if all_done {
            if !self.completed {
                self.completed = true;
                self.completed_at = Some(now);
            }
        } else {
            self.completed = false;
            self.completed_at = None;
        }
    }

    /// Manual completion override.
    ///
    /// `true` sets the course flag and forces every existing lecture entry
    /// complete; `false` clears the course-level flag only. A later
    /// [`CourseProgress::recompute`] recalculates both honestly.
    pub fn set_override(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed {
            for entry in self.lectures.values_mut() {
                entry.force_complete(now);
            }
            self.completed = true;
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed = false;
            self.completed_at = None;
        }
    }

    /// Share of outline units (lessons completed, quizzes attempted) done,
    /// as a whole percentage rounded half up. An outline with no units is 0.
    #[must_use]
    pub fn completion_percent(&self, outline: &CourseOutline) -> u8 {
        let total = outline.total_units();
        if total == 0 {
            return 0;
        }

        let done: usize = outline
            .lectures()
            .iter()
            .map(|(lecture_id, lecture_outline)| {
                let entry = self.lectures.get(lecture_id);
                let lessons = lecture_outline
                    .lessons()
                    .iter()
                    .filter(|id| {
                        entry
                            .and_then(|e| e.lesson(**id))
                            .is_some_and(|l| l.completed())
                    })
                    .count();
                let quizzes = lecture_outline
                    .quizzes()
                    .iter()
                    .filter(|id| {
                        entry
                            .and_then(|e| e.quiz(**id))
                            .is_some_and(|q| q.attempted())
                    })
                    .count();
                lessons + quizzes
            })
            .sum();

        let percent = (done * 200 + total) / (total * 2);
        u8::try_from(percent).unwrap_or(100)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
