mod attempt;
mod course;
mod enrollment;
mod grade;
mod ids;
mod lecture;
mod lesson;
mod progress;
mod quiz;
mod user;

pub use ids::{
    AttemptId, CourseId, EnrollmentId, LectureId, LessonId, OptionId, ParseIdError, QuestionId,
    QuizId, UserId,
};

pub use attempt::{Attempt, AttemptAnswer, AttemptError, AttemptStatus};
pub use course::{Course, CourseError, ExpiryPolicy};
pub use enrollment::{Enrollment, MAX_ACTIVE_ENROLLMENTS};
pub use grade::{GradeBand, GradeScale, GradeScaleError};
pub use lecture::{Lecture, LectureError};
pub use lesson::{Lesson, LessonError};
pub use progress::{
    CourseOutline, CourseProgress, LectureOutline, LectureProgress, LessonProgress, QuizProgress,
};
pub use quiz::{
    DEFAULT_MAX_ATTEMPTS, Question, QuestionError, QuestionOption, Quiz, QuizError, QuizScore,
};
pub use user::{User, UserError};
