use course_core::model::{CourseId, Enrollment, EnrollmentId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{course_id_from_i64, enrollment_id_from_i64, u64_to_i64, user_id_from_i64};
use crate::repository::{EnrollmentRepository, NewEnrollmentRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn insert_enrollment(
        &self,
        record: NewEnrollmentRecord,
    ) -> Result<EnrollmentId, StorageError> {
        let user_id = u64_to_i64("user_id", record.user_id.value())?;
        let course_id = u64_to_i64("course_id", record.course_id.value())?;

        let res = sqlx::query(
            r"
            INSERT INTO enrollments (user_id, course_id, enrolled_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(record.enrolled_at)
        .bind(record.expires_at)
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

        enrollment_id_from_i64(res.last_insert_rowid())
    }

    async fn get_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, course_id, enrolled_at, expires_at
            FROM enrollments
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(u64_to_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => enrollment_from_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn enrollments_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, course_id, enrolled_at, expires_at
            FROM enrollments
            WHERE user_id = ?1
            ORDER BY enrolled_at ASC, id ASC
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut enrollments = Vec::with_capacity(rows.len());
        for row in rows {
            enrollments.push(enrollment_from_row(&row)?);
        }
        Ok(enrollments)
    }

    async fn delete_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM enrollments WHERE user_id = ?1 AND course_id = ?2")
            .bind(u64_to_i64("user_id", user_id.value())?)
            .bind(u64_to_i64("course_id", course_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(res.rows_affected() > 0)
    }
}

fn enrollment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment::new(
        enrollment_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get("expires_at").map_err(ser)?,
    ))
}
