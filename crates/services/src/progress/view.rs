use chrono::{DateTime, Utc};
use serde::Serialize;

use course_core::model::{
    CourseId, CourseOutline, CourseProgress, LectureId, LectureOutline, LectureProgress,
    LessonId, LessonProgress, QuizId, QuizProgress, UserId,
};

/// Snapshot of one learner's standing in one course.
///
/// The view is shaped by the course's outline: every outline unit appears
/// exactly once, in course order, whether or not the learner has touched
/// it. Progress rows for items no longer in the outline are not rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseProgressView {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub percent: u8,
    pub lectures: Vec<LectureProgressView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LectureProgressView {
    pub lecture_id: LectureId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub lessons: Vec<LessonProgressView>,
    pub quizzes: Vec<QuizProgressView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonProgressView {
    pub lesson_id: LessonId,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizProgressView {
    pub quiz_id: QuizId,
    pub attempted: bool,
    pub score: Option<u8>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CourseProgressView {
    #[must_use]
    pub fn from_progress(progress: &CourseProgress, outline: &CourseOutline) -> Self {
        let lectures = outline
            .lectures()
            .iter()
            .map(|(lecture_id, lecture_outline)| {
                LectureProgressView::from_lecture(
                    *lecture_id,
                    lecture_outline,
                    progress.lecture(*lecture_id),
                )
            })
            .collect();

        Self {
            user_id: progress.user_id(),
            course_id: progress.course_id(),
            completed: progress.completed(),
            completed_at: progress.completed_at(),
            percent: progress.completion_percent(outline),
            lectures,
        }
    }
}

impl LectureProgressView {
    #[must_use]
    pub fn from_lecture(
        lecture_id: LectureId,
        outline: &LectureOutline,
        entry: Option<&LectureProgress>,
    ) -> Self {
        let lessons = outline
            .lessons()
            .iter()
            .map(|lesson_id| {
                let state = entry.and_then(|e| e.lesson(*lesson_id));
                LessonProgressView {
                    lesson_id: *lesson_id,
                    completed: state.is_some_and(LessonProgress::completed),
                    completed_at: state.and_then(LessonProgress::completed_at),
                }
            })
            .collect();

        let quizzes = outline
            .quizzes()
            .iter()
            .map(|quiz_id| {
                let state = entry.and_then(|e| e.quiz(*quiz_id));
                QuizProgressView {
                    quiz_id: *quiz_id,
                    attempted: state.is_some_and(QuizProgress::attempted),
                    score: state.and_then(QuizProgress::score).map(|s| s.points()),
                    completed_at: state.and_then(QuizProgress::completed_at),
                }
            })
            .collect();

        // an untouched lecture with no content is vacuously complete
        let completed = entry.map_or_else(|| outline.is_empty(), LectureProgress::completed);
        Self {
            lecture_id,
            completed,
            completed_at: entry.and_then(LectureProgress::completed_at),
            lessons,
            quizzes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::QuizScore;
    use course_core::time::fixed_now;

    fn outline() -> CourseOutline {
        let mut first = LectureOutline::new();
        first.push_lesson(LessonId::new(1));
        first.push_lesson(LessonId::new(2));
        first.push_quiz(QuizId::new(5));
        let mut second = LectureOutline::new();
        second.push_lesson(LessonId::new(3));

        let mut outline = CourseOutline::new(CourseId::new(1));
        outline.push_lecture(LectureId::new(10), first);
        outline.push_lecture(LectureId::new(11), second);
        outline
    }

    #[test]
    fn view_mirrors_outline_order_with_unstarted_defaults() {
        let progress = CourseProgress::new(UserId::new(1), CourseId::new(1));
        let view = CourseProgressView::from_progress(&progress, &outline());

        assert_eq!(view.percent, 0);
        assert!(!view.completed);
        assert_eq!(view.lectures.len(), 2);
        assert_eq!(view.lectures[0].lecture_id, LectureId::new(10));
        assert_eq!(view.lectures[1].lecture_id, LectureId::new(11));

        let first = &view.lectures[0];
        assert!(!first.completed);
        assert_eq!(first.lessons.len(), 2);
        assert!(first.lessons.iter().all(|l| !l.completed));
        assert_eq!(first.quizzes.len(), 1);
        assert!(!first.quizzes[0].attempted);
        assert_eq!(first.quizzes[0].score, None);
    }

    #[test]
    fn view_annotates_marked_units() {
        let now = fixed_now();
        let mut progress = CourseProgress::new(UserId::new(1), CourseId::new(1));
        progress.mark_lesson(LectureId::new(10), LessonId::new(1), now);
        progress.mark_quiz(
            LectureId::new(10),
            QuizId::new(5),
            QuizScore::from_correct(7, 10),
            now,
        );

        let view = CourseProgressView::from_progress(&progress, &outline());
        let first = &view.lectures[0];
        assert!(first.lessons[0].completed);
        assert_eq!(first.lessons[0].completed_at, Some(now));
        assert!(!first.lessons[1].completed);
        assert!(first.quizzes[0].attempted);
        assert_eq!(first.quizzes[0].score, Some(7));
        assert_eq!(view.percent, 50);
    }

    #[test]
    fn stale_rows_are_not_rendered() {
        let now = fixed_now();
        let mut progress = CourseProgress::new(UserId::new(1), CourseId::new(1));
        progress.mark_lesson(LectureId::new(10), LessonId::new(77), now);
        progress.mark_lesson(LectureId::new(99), LessonId::new(1), now);

        let view = CourseProgressView::from_progress(&progress, &outline());
        assert_eq!(view.lectures.len(), 2);
        assert!(view.lectures[0].lessons.iter().all(|l| !l.completed));
        assert_eq!(view.percent, 0);
    }

    #[test]
    fn empty_untouched_lecture_renders_complete() {
        let mut bare = CourseOutline::new(CourseId::new(1));
        bare.push_lecture(LectureId::new(10), LectureOutline::new());

        let progress = CourseProgress::new(UserId::new(1), CourseId::new(1));
        let view = CourseProgressView::from_progress(&progress, &bare);
        assert!(view.lectures[0].completed);
        assert!(!view.completed);
    }
}
