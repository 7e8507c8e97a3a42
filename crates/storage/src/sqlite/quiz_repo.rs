use course_core::model::{
    CourseId, LessonId, Question, QuestionOption, Quiz, QuizId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, lecture_id_from_i64, lesson_id_from_i64, option_id_from_i64,
    question_id_from_i64, quiz_id_from_i64, u64_to_i64, user_id_from_i64, usize_to_i64,
};
use crate::repository::{QuizRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let id = u64_to_i64("quiz_id", quiz.id().value())?;
        let lesson_id = u64_to_i64("lesson_id", quiz.lesson_id().value())?;
        let lecture_id = u64_to_i64("lecture_id", quiz.lecture_id().value())?;
        let course_id = u64_to_i64("course_id", quiz.course_id().value())?;
        let title = quiz.title().to_string();
        let seconds_per_question = i64::from(quiz.seconds_per_question());
        let max_attempts = i64::from(quiz.max_attempts());
        let created_by = u64_to_i64("user_id", quiz.created_by().value())?;
        let created_at = quiz.created_at();

        sqlx::query(
            r"
            INSERT INTO quizzes (id, lesson_id, lecture_id, course_id, title,
                                 seconds_per_question, max_attempts, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                lesson_id = excluded.lesson_id,
                lecture_id = excluded.lecture_id,
                course_id = excluded.course_id,
                title = excluded.title,
                seconds_per_question = excluded.seconds_per_question,
                max_attempts = excluded.max_attempts
            ",
        )
        .bind(id)
        .bind(lesson_id)
        .bind(lecture_id)
        .bind(course_id)
        .bind(title)
        .bind(seconds_per_question)
        .bind(max_attempts)
        .bind(created_by)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                StorageError::Conflict
            } else {
                StorageError::Connection(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, lesson_id, lecture_id, course_id, title,
                   seconds_per_question, max_attempts, created_by, created_at
            FROM quizzes WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("quiz_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => quiz_from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn quiz_for_lesson(&self, lesson_id: LessonId) -> Result<Option<Quiz>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, lesson_id, lecture_id, course_id, title,
                   seconds_per_question, max_attempts, created_by, created_at
            FROM quizzes WHERE lesson_id = ?1
            ",
        )
        .bind(u64_to_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => quiz_from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn quizzes_for_course(&self, course_id: CourseId) -> Result<Vec<Quiz>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, lesson_id, lecture_id, course_id, title,
                   seconds_per_question, max_attempts, created_by, created_at
            FROM quizzes
            WHERE course_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(u64_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut quizzes = Vec::with_capacity(rows.len());
        for row in rows {
            quizzes.push(quiz_from_row(&row)?);
        }
        Ok(quizzes)
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let id = u64_to_i64("question_id", question.id().value())?;
        let quiz_id = u64_to_i64("quiz_id", question.quiz_id().value())?;
        let text = question.text().to_string();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO questions (id, quiz_id, text)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id, quiz_id) DO UPDATE SET
                text = excluded.text
            ",
        )
        .bind(id)
        .bind(quiz_id)
        .bind(text)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM question_options WHERE quiz_id = ?1 AND question_id = ?2")
            .bind(quiz_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, option) in question.options().iter().enumerate() {
            let is_correct = if option.is_correct { 1_i64 } else { 0 };
            sqlx::query(
                r"
                INSERT INTO question_options (quiz_id, question_id, option_id, position, text, is_correct)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(quiz_id)
            .bind(id)
            .bind(u64_to_i64("option_id", option.id.value())?)
            .bind(usize_to_i64("position", position)?)
            .bind(option.text.clone())
            .bind(is_correct)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn questions_for_quiz(&self, quiz_id: QuizId) -> Result<Vec<Question>, StorageError> {
        let key = u64_to_i64("quiz_id", quiz_id.value())?;

        let rows = sqlx::query(
            r"
            SELECT id, quiz_id, text FROM questions
            WHERE quiz_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(question_from_row(&self.pool, &row).await?);
        }
        Ok(questions)
    }
}

fn quiz_from_row(row: &SqliteRow) -> Result<Quiz, StorageError> {
    let seconds_per_question =
        u32::try_from(row.try_get::<i64, _>("seconds_per_question").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("seconds_per_question overflow".into()))?;
    let max_attempts = u32::try_from(row.try_get::<i64, _>("max_attempts").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("max_attempts overflow".into()))?;

    Quiz::new(
        quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        lecture_id_from_i64(row.try_get::<i64, _>("lecture_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        seconds_per_question,
        max_attempts,
        user_id_from_i64(row.try_get::<i64, _>("created_by").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

async fn question_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Question, StorageError> {
    let id = row.try_get::<i64, _>("id").map_err(ser)?;
    let quiz_id = row.try_get::<i64, _>("quiz_id").map_err(ser)?;

    let option_rows = sqlx::query(
        r"
        SELECT option_id, text, is_correct FROM question_options
        WHERE quiz_id = ?1 AND question_id = ?2
        ORDER BY position ASC
        ",
    )
    .bind(quiz_id)
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut options = Vec::with_capacity(option_rows.len());
    for option_row in option_rows {
        options.push(QuestionOption {
            id: option_id_from_i64(option_row.try_get::<i64, _>("option_id").map_err(ser)?)?,
            text: option_row.try_get::<String, _>("text").map_err(ser)?,
            is_correct: option_row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
        });
    }

    Question::new(
        question_id_from_i64(id)?,
        quiz_id_from_i64(quiz_id)?,
        row.try_get::<String, _>("text").map_err(ser)?,
        options,
    )
    .map_err(ser)
}
