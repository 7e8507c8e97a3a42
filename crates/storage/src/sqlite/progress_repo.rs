use std::collections::BTreeMap;

use course_core::model::{
    CourseId, CourseProgress, LectureId, LectureProgress, LessonId, LessonProgress, QuizId,
    QuizProgress, UserId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    lecture_id_from_i64, lesson_id_from_i64, quiz_id_from_i64, score_from_i64, u64_to_i64,
};
use crate::repository::{ProgressRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, progress: &CourseProgress) -> Result<(), StorageError> {
        let user_id = u64_to_i64("user_id", progress.user_id().value())?;
        let course_id = u64_to_i64("course_id", progress.course_id().value())?;
        let completed = if progress.completed() { 1_i64 } else { 0 };

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // replace the whole document; old child rows cascade off the root
        sqlx::query("DELETE FROM course_progress WHERE user_id = ?1 AND course_id = ?2")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO course_progress (user_id, course_id, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(completed)
        .bind(progress.completed_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (lecture_id, lecture) in progress.lectures() {
            let lecture_key = u64_to_i64("lecture_id", lecture_id.value())?;
            let lecture_completed = if lecture.completed() { 1_i64 } else { 0 };

            sqlx::query(
                r"
                INSERT INTO lecture_progress (user_id, course_id, lecture_id, completed, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(lecture_key)
            .bind(lecture_completed)
            .bind(lecture.completed_at())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (lesson_id, lesson) in lecture.lessons() {
                let lesson_completed = if lesson.completed() { 1_i64 } else { 0 };
                sqlx::query(
                    r"
                    INSERT INTO lesson_progress
                        (user_id, course_id, lecture_id, lesson_id, completed, completed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(user_id)
                .bind(course_id)
                .bind(lecture_key)
                .bind(u64_to_i64("lesson_id", lesson_id.value())?)
                .bind(lesson_completed)
                .bind(lesson.completed_at())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }

            for (quiz_id, quiz) in lecture.quizzes() {
                let attempted = if quiz.attempted() { 1_i64 } else { 0 };
                let score = quiz.score().map(|s| i64::from(s.points()));
                sqlx::query(
                    r"
                    INSERT INTO quiz_progress
                        (user_id, course_id, lecture_id, quiz_id, attempted, score, completed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(user_id)
                .bind(course_id)
                .bind(lecture_key)
                .bind(u64_to_i64("quiz_id", quiz_id.value())?)
                .bind(attempted)
                .bind(score)
                .bind(quiz.completed_at())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let user_key = u64_to_i64("user_id", user_id.value())?;
        let course_key = u64_to_i64("course_id", course_id.value())?;

        let root = sqlx::query(
            r"
            SELECT completed, completed_at FROM course_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_key)
        .bind(course_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(root) = root else {
            return Ok(None);
        };

        let lecture_rows = sqlx::query(
            r"
            SELECT lecture_id, completed, completed_at FROM lecture_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_key)
        .bind(course_key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let lesson_rows = sqlx::query(
            r"
            SELECT lecture_id, lesson_id, completed, completed_at FROM lesson_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_key)
        .bind(course_key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let quiz_rows = sqlx::query(
            r"
            SELECT lecture_id, quiz_id, attempted, score, completed_at FROM quiz_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_key)
        .bind(course_key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lessons_by_lecture: BTreeMap<LectureId, BTreeMap<LessonId, LessonProgress>> =
            BTreeMap::new();
        for row in lesson_rows {
            let lecture_id =
                lecture_id_from_i64(row.try_get::<i64, _>("lecture_id").map_err(ser)?)?;
            let lesson_id = lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?;
            lessons_by_lecture.entry(lecture_id).or_default().insert(
                lesson_id,
                LessonProgress::from_persisted(
                    row.try_get::<i64, _>("completed").map_err(ser)? != 0,
                    row.try_get("completed_at").map_err(ser)?,
                ),
            );
        }

        let mut quizzes_by_lecture: BTreeMap<LectureId, BTreeMap<QuizId, QuizProgress>> =
            BTreeMap::new();
        for row in quiz_rows {
            let lecture_id =
                lecture_id_from_i64(row.try_get::<i64, _>("lecture_id").map_err(ser)?)?;
            let quiz_id = quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?;
            quizzes_by_lecture.entry(lecture_id).or_default().insert(
                quiz_id,
                QuizProgress::from_persisted(
                    row.try_get::<i64, _>("attempted").map_err(ser)? != 0,
                    score_from_i64(row.try_get::<Option<i64>, _>("score").map_err(ser)?)?,
                    row.try_get("completed_at").map_err(ser)?,
                ),
            );
        }

        let mut lectures = BTreeMap::new();
        for row in lecture_rows {
            let lecture_id =
                lecture_id_from_i64(row.try_get::<i64, _>("lecture_id").map_err(ser)?)?;
            lectures.insert(
                lecture_id,
                LectureProgress::from_persisted(
                    row.try_get::<i64, _>("completed").map_err(ser)? != 0,
                    row.try_get("completed_at").map_err(ser)?,
                    lessons_by_lecture.remove(&lecture_id).unwrap_or_default(),
                    quizzes_by_lecture.remove(&lecture_id).unwrap_or_default(),
                ),
            );
        }

        Ok(Some(CourseProgress::from_persisted(
            user_id,
            course_id,
            root.try_get::<i64, _>("completed").map_err(ser)? != 0,
            root.try_get("completed_at").map_err(ser)?,
            lectures,
        )))
    }

    async fn delete_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        // child rows cascade off the course_progress root
        let res = sqlx::query("DELETE FROM course_progress WHERE user_id = ?1 AND course_id = ?2")
            .bind(u64_to_i64("user_id", user_id.value())?)
            .bind(u64_to_i64("course_id", course_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(res.rows_affected() > 0)
    }
}
