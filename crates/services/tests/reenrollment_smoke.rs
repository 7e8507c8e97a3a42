use course_core::model::{
    AttemptAnswer, CourseId, ExpiryPolicy, LectureId, LessonId, OptionId, QuestionId,
    QuestionOption, QuizId, User, UserId,
};
use course_core::time::fixed_now;
use services::{AppServices, Clock};
use storage::repository::Storage;

#[tokio::test]
async fn unenroll_purges_and_reenroll_starts_clean() {
    let storage = Storage::in_memory();
    let services = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let learner = UserId::new(7);
    let author = UserId::new(99);

    storage
        .users
        .upsert_user(&User::new(learner, "Dana", fixed_now()).unwrap())
        .await
        .unwrap();

    let catalog = services.catalog();
    catalog
        .create_course(CourseId::new(1), "Intro", ExpiryPolicy::none(), author)
        .await
        .unwrap();
    catalog
        .add_lecture(LectureId::new(10), CourseId::new(1), "Basics")
        .await
        .unwrap();
    catalog
        .add_lesson(LessonId::new(1), LectureId::new(10), "Hello", None, &[])
        .await
        .unwrap();
    // One attempt only, so the budget reset below is observable.
    catalog
        .create_quiz(QuizId::new(5), LessonId::new(1), "Check", 30, 1, author)
        .await
        .unwrap();
    catalog
        .add_question(
            QuestionId::new(1),
            QuizId::new(5),
            "Pick the first option",
            vec![
                QuestionOption {
                    id: OptionId::new(11),
                    text: "Right".into(),
                    is_correct: true,
                },
                QuestionOption {
                    id: OptionId::new(12),
                    text: "Wrong".into(),
                    is_correct: false,
                },
            ],
        )
        .await
        .unwrap();

    services.enrollment().enroll(learner, CourseId::new(1)).await.unwrap();
    let scored = services
        .attempts()
        .attempt(
            learner,
            QuizId::new(5),
            vec![AttemptAnswer {
                question_id: QuestionId::new(1),
                selected_option_id: OptionId::new(11),
            }],
        )
        .await
        .unwrap();
    assert_eq!(scored.score.points(), 10);

    let history = services
        .history()
        .get_history(learner, CourseId::new(1))
        .await
        .unwrap();
    assert!(history.completed);
    assert_eq!(history.percent, 100);

    services.enrollment().unenroll(learner, CourseId::new(1)).await.unwrap();
    assert!(
        storage
            .progress
            .get_progress(learner, CourseId::new(1))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        storage
            .attempts
            .completed_count(learner, QuizId::new(5))
            .await
            .unwrap(),
        0
    );

    // A fresh enrollment carries no trace of the previous run, and the
    // purged attempts no longer count against the budget of one.
    services.enrollment().enroll(learner, CourseId::new(1)).await.unwrap();
    let history = services
        .history()
        .get_history(learner, CourseId::new(1))
        .await
        .unwrap();
    assert!(!history.completed);
    assert_eq!(history.percent, 0);

    let scored = services
        .attempts()
        .attempt(
            learner,
            QuizId::new(5),
            vec![AttemptAnswer {
                question_id: QuestionId::new(1),
                selected_option_id: OptionId::new(12),
            }],
        )
        .await
        .unwrap();
    assert_eq!(scored.score.points(), 0);
}
