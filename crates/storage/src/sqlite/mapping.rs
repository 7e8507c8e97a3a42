use course_core::model::{
    AttemptId, AttemptStatus, CourseId, EnrollmentId, LectureId, LessonId, OptionId, QuestionId,
    QuizId, QuizScore, UserId,
};
use url::Url;
use uuid::Uuid;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn usize_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn lecture_id_from_i64(v: i64) -> Result<LectureId, StorageError> {
    Ok(LectureId::new(i64_to_u64("lecture_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn enrollment_id_from_i64(v: i64) -> Result<EnrollmentId, StorageError> {
    Ok(EnrollmentId::new(i64_to_u64("enrollment_id", v)?))
}

pub(crate) fn attempt_id_from_str(s: &str) -> Result<AttemptId, StorageError> {
    let uuid = Uuid::parse_str(s).map_err(ser)?;
    Ok(AttemptId::from_uuid(uuid))
}

pub(crate) fn parse_attempt_status(s: &str) -> Result<AttemptStatus, StorageError> {
    match s {
        "inprogress" => Ok(AttemptStatus::InProgress),
        "completed" => Ok(AttemptStatus::Completed),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn score_from_i64(v: Option<i64>) -> Result<Option<QuizScore>, StorageError> {
    v.map(|points| {
        let points = u8::try_from(points)
            .map_err(|_| StorageError::Serialization(format!("invalid score: {points}")))?;
        QuizScore::from_persisted(points).map_err(ser)
    })
    .transpose()
}

pub(crate) fn parse_url(field: &'static str, raw: &str) -> Result<Url, StorageError> {
    Url::parse(raw).map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}
