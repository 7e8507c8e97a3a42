use course_core::model::{User, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{course_id_from_i64, u64_to_i64, user_id_from_i64, usize_to_i64};
use crate::repository::{StorageError, UserRepository};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        let id = u64_to_i64("user_id", user.id().value())?;
        let name = user.name().to_string();
        let created_at = user.created_at();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO users (id, name, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name
            ",
        )
        .bind(id)
        .bind(name)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM user_courses WHERE user_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, course_id) in user.enrolled().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO user_courses (user_id, course_id, position)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(u64_to_i64("course_id", course_id.value())?)
            .bind(usize_to_i64("position", position)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let key = u64_to_i64("user_id", id.value())?;

        let row = sqlx::query("SELECT id, name, created_at FROM users WHERE id = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let course_rows = sqlx::query(
            r"
            SELECT course_id FROM user_courses
            WHERE user_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut enrolled = Vec::with_capacity(course_rows.len());
        for course_row in course_rows {
            enrolled.push(course_id_from_i64(
                course_row.try_get::<i64, _>("course_id").map_err(ser)?,
            )?);
        }

        User::from_persisted(
            user_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
            row.try_get::<String, _>("name").map_err(ser)?,
            enrolled,
            row.try_get("created_at").map_err(ser)?,
        )
        .map_err(ser)
        .map(Some)
    }
}
