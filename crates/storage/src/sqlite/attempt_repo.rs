use course_core::model::{Attempt, AttemptAnswer, AttemptId, QuizId, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_str, option_id_from_i64, parse_attempt_status, question_id_from_i64,
    quiz_id_from_i64, score_from_i64, u64_to_i64, user_id_from_i64, usize_to_i64,
};
use crate::repository::{AttemptRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn upsert_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let id = attempt.id().as_uuid().to_string();
        let user_id = u64_to_i64("user_id", attempt.user_id().value())?;
        let quiz_id = u64_to_i64("quiz_id", attempt.quiz_id().value())?;
        let status = attempt.status().as_str();
        let score = attempt.score().map(|s| i64::from(s.points()));
        let remaining_secs = attempt.remaining_secs().map(i64::from);
        let started_at = attempt.started_at();
        let completed_at = attempt.completed_at();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO attempts (id, user_id, quiz_id, status, score, remaining_secs,
                                  started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                score = excluded.score,
                remaining_secs = excluded.remaining_secs,
                completed_at = excluded.completed_at
            ",
        )
        .bind(id.clone())
        .bind(user_id)
        .bind(quiz_id)
        .bind(status)
        .bind(score)
        .bind(remaining_secs)
        .bind(started_at)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM attempt_answers WHERE attempt_id = ?1")
            .bind(id.clone())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, answer) in attempt.answers().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO attempt_answers (attempt_id, question_id, selected_option_id, position)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id.clone())
            .bind(u64_to_i64("question_id", answer.question_id.value())?)
            .bind(u64_to_i64("option_id", answer.selected_option_id.value())?)
            .bind(usize_to_i64("position", position)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, quiz_id, status, score, remaining_secs, started_at, completed_at
            FROM attempts WHERE id = ?1
            ",
        )
        .bind(id.as_uuid().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => attempt_from_row(&self.pool, &row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn in_progress_for_user_quiz(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, quiz_id, status, score, remaining_secs, started_at, completed_at
            FROM attempts
            WHERE user_id = ?1 AND quiz_id = ?2 AND status = 'inprogress'
            ORDER BY started_at ASC
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(attempt_from_row(&self.pool, &row).await?);
        }
        Ok(attempts)
    }

    async fn completed_count(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count FROM attempts
            WHERE user_id = ?1 AND quiz_id = ?2 AND status = 'completed'
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let count: i64 = row.try_get("count").map_err(ser)?;
        u32::try_from(count)
            .map_err(|_| StorageError::Serialization("attempt count overflow".into()))
    }

    async fn latest_completed(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<Attempt>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, quiz_id, status, score, remaining_secs, started_at, completed_at
            FROM attempts
            WHERE user_id = ?1 AND quiz_id = ?2 AND status = 'completed'
            ORDER BY completed_at DESC
            LIMIT 1
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(u64_to_i64("quiz_id", quiz_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => attempt_from_row(&self.pool, &row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn completed_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<Vec<Attempt>, StorageError> {
        let user_key = u64_to_i64("user_id", user_id.value())?;

        let mut attempts = Vec::new();
        for quiz_id in quiz_ids {
            let rows = sqlx::query(
                r"
                SELECT id, user_id, quiz_id, status, score, remaining_secs, started_at, completed_at
                FROM attempts
                WHERE user_id = ?1 AND quiz_id = ?2 AND status = 'completed'
                ",
            )
            .bind(user_key)
            .bind(u64_to_i64("quiz_id", quiz_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

            for row in rows {
                attempts.push(attempt_from_row(&self.pool, &row).await?);
            }
        }

        attempts.sort_by_key(Attempt::completed_at);
        Ok(attempts)
    }

    async fn delete_for_user(
        &self,
        user_id: UserId,
        quiz_ids: &[QuizId],
    ) -> Result<u64, StorageError> {
        let user_key = u64_to_i64("user_id", user_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let mut removed = 0_u64;
        for quiz_id in quiz_ids {
            let res = sqlx::query("DELETE FROM attempts WHERE user_id = ?1 AND quiz_id = ?2")
                .bind(user_key)
                .bind(u64_to_i64("quiz_id", quiz_id.value())?)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            removed += res.rows_affected();
        }
        tx.commit().await.map_err(conn)?;

        Ok(removed)
    }
}

async fn attempt_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Attempt, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;

    let answer_rows = sqlx::query(
        r"
        SELECT question_id, selected_option_id FROM attempt_answers
        WHERE attempt_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(id.clone())
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut answers = Vec::with_capacity(answer_rows.len());
    for answer_row in answer_rows {
        answers.push(AttemptAnswer {
            question_id: question_id_from_i64(
                answer_row.try_get::<i64, _>("question_id").map_err(ser)?,
            )?,
            selected_option_id: option_id_from_i64(
                answer_row
                    .try_get::<i64, _>("selected_option_id")
                    .map_err(ser)?,
            )?,
        });
    }

    let status_str: String = row.try_get("status").map_err(ser)?;
    let remaining_secs = row
        .try_get::<Option<i64>, _>("remaining_secs")
        .map_err(ser)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization("remaining_secs overflow".into()))
        })
        .transpose()?;

    Attempt::from_persisted(
        attempt_id_from_str(&id)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        parse_attempt_status(&status_str)?,
        answers,
        score_from_i64(row.try_get::<Option<i64>, _>("score").map_err(ser)?)?,
        remaining_secs,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}
