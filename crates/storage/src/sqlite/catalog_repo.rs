use course_core::model::{
    Course, CourseId, CourseOutline, ExpiryPolicy, Lecture, LectureId, LectureOutline, Lesson,
    LessonId, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use url::Url;

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, lecture_id_from_i64, lesson_id_from_i64, parse_url, quiz_id_from_i64,
    u64_to_i64, user_id_from_i64, usize_to_i64,
};
use crate::repository::{CatalogRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let id = u64_to_i64("course_id", course.id().value())?;
        let title = course.title().to_string();
        let published = if course.published() { 1_i64 } else { 0 };
        let expiry_enabled = if course.expiry().enabled() { 1_i64 } else { 0 };
        let expiry_days = i64::from(course.expiry().days());
        let created_by = u64_to_i64("user_id", course.created_by().value())?;
        let created_at = course.created_at();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title, published, expiry_enabled, expiry_days, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                published = excluded.published,
                expiry_enabled = excluded.expiry_enabled,
                expiry_days = excluded.expiry_days
            ",
        )
        .bind(id)
        .bind(title)
        .bind(published)
        .bind(expiry_enabled)
        .bind(expiry_days)
        .bind(created_by)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM course_lectures WHERE course_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, lecture_id) in course.lectures().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO course_lectures (course_id, lecture_id, position)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(u64_to_i64("lecture_id", lecture_id.value())?)
            .bind(usize_to_i64("position", position)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        sqlx::query("DELETE FROM course_students WHERE course_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, user_id) in course.enrolled().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO course_students (course_id, user_id, position)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(u64_to_i64("user_id", user_id.value())?)
            .bind(usize_to_i64("position", position)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, published, expiry_enabled, expiry_days, created_by, created_at
            FROM courses WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => course_from_row(&self.pool, &row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, published, expiry_enabled, expiry_days, created_by, created_at
            FROM courses
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(course_from_row(&self.pool, &row).await?);
        }
        Ok(courses)
    }

    async fn upsert_lecture(&self, lecture: &Lecture) -> Result<(), StorageError> {
        let id = u64_to_i64("lecture_id", lecture.id().value())?;
        let course_id = u64_to_i64("course_id", lecture.course_id().value())?;
        let title = lecture.title().to_string();
        let created_at = lecture.created_at();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO lectures (id, course_id, title, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title
            ",
        )
        .bind(id)
        .bind(course_id)
        .bind(title)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM lecture_lessons WHERE lecture_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, lesson_id) in lecture.lessons().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO lecture_lessons (lecture_id, lesson_id, position)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(u64_to_i64("lesson_id", lesson_id.value())?)
            .bind(usize_to_i64("position", position)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_lecture(&self, id: LectureId) -> Result<Option<Lecture>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, created_at
            FROM lectures WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("lecture_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => lecture_from_row(&self.pool, &row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn lectures_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Lecture>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT cl.lecture_id AS lecture_ref, l.id AS id, l.course_id AS course_id,
                   l.title AS title, l.created_at AS created_at
            FROM course_lectures cl
            LEFT JOIN lectures l ON l.id = cl.lecture_id
            WHERE cl.course_id = ?1
            ORDER BY cl.position ASC
            ",
        )
        .bind(u64_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lectures = Vec::with_capacity(rows.len());
        for row in rows {
            if row.try_get::<Option<i64>, _>("id").map_err(ser)?.is_none() {
                let lecture_ref =
                    lecture_id_from_i64(row.try_get::<i64, _>("lecture_ref").map_err(ser)?)?;
                return Err(StorageError::Corrupted(format!(
                    "course {course_id} references missing lecture {lecture_ref}"
                )));
            }
            lectures.push(lecture_from_row(&self.pool, &row).await?);
        }
        Ok(lectures)
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let id = u64_to_i64("lesson_id", lesson.id().value())?;
        let lecture_id = u64_to_i64("lecture_id", lesson.lecture_id().value())?;
        let title = lesson.title().to_string();
        let video_url = lesson.video().map(Url::to_string);
        let quiz_id = lesson
            .quiz()
            .map(|q| u64_to_i64("quiz_id", q.value()))
            .transpose()?;
        let created_at = lesson.created_at();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO lessons (id, lecture_id, title, video_url, quiz_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                lecture_id = excluded.lecture_id,
                title = excluded.title,
                video_url = excluded.video_url,
                quiz_id = excluded.quiz_id
            ",
        )
        .bind(id)
        .bind(lecture_id)
        .bind(title)
        .bind(video_url)
        .bind(quiz_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM lesson_resources WHERE lesson_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, resource) in lesson.resources().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO lesson_resources (lesson_id, position, url)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id)
            .bind(usize_to_i64("position", position)?)
            .bind(resource.to_string())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, lecture_id, title, video_url, quiz_id, created_at
            FROM lessons WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("lesson_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => lesson_from_row(&self.pool, &row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn lessons_for_lecture(
        &self,
        lecture_id: LectureId,
    ) -> Result<Vec<Lesson>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT ll.lesson_id AS lesson_ref, ls.id AS id, ls.lecture_id AS lecture_id,
                   ls.title AS title, ls.video_url AS video_url, ls.quiz_id AS quiz_id,
                   ls.created_at AS created_at
            FROM lecture_lessons ll
            LEFT JOIN lessons ls ON ls.id = ll.lesson_id
            WHERE ll.lecture_id = ?1
            ORDER BY ll.position ASC
            ",
        )
        .bind(u64_to_i64("lecture_id", lecture_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            if row.try_get::<Option<i64>, _>("id").map_err(ser)?.is_none() {
                let lesson_ref =
                    lesson_id_from_i64(row.try_get::<i64, _>("lesson_ref").map_err(ser)?)?;
                return Err(StorageError::Corrupted(format!(
                    "lecture {lecture_id} references missing lesson {lesson_ref}"
                )));
            }
            lessons.push(lesson_from_row(&self.pool, &row).await?);
        }
        Ok(lessons)
    }

    async fn outline(&self, course_id: CourseId) -> Result<Option<CourseOutline>, StorageError> {
        let key = u64_to_i64("course_id", course_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            r"
            SELECT cl.lecture_id AS lecture_ref, lc.id AS lecture_row,
                   ll.lesson_id AS lesson_ref, ls.id AS lesson_row, ls.quiz_id AS quiz_id
            FROM course_lectures cl
            LEFT JOIN lectures lc ON lc.id = cl.lecture_id
            LEFT JOIN lecture_lessons ll ON ll.lecture_id = cl.lecture_id
            LEFT JOIN lessons ls ON ls.id = ll.lesson_id
            WHERE cl.course_id = ?1
            ORDER BY cl.position ASC, ll.position ASC
            ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut outline = CourseOutline::new(course_id);
        let mut current: Option<(LectureId, LectureOutline)> = None;
        for row in rows {
            let lecture_ref =
                lecture_id_from_i64(row.try_get::<i64, _>("lecture_ref").map_err(ser)?)?;
            if row
                .try_get::<Option<i64>, _>("lecture_row")
                .map_err(ser)?
                .is_none()
            {
                return Err(StorageError::Corrupted(format!(
                    "course {course_id} references missing lecture {lecture_ref}"
                )));
            }

            if current.as_ref().is_none_or(|(id, _)| *id != lecture_ref) {
                if let Some((id, lecture_outline)) = current.take() {
                    outline.push_lecture(id, lecture_outline);
                }
                current = Some((lecture_ref, LectureOutline::new()));
            }

            let lesson_ref = row.try_get::<Option<i64>, _>("lesson_ref").map_err(ser)?;
            if let Some(lesson_ref) = lesson_ref {
                let lesson_id = lesson_id_from_i64(lesson_ref)?;
                if row
                    .try_get::<Option<i64>, _>("lesson_row")
                    .map_err(ser)?
                    .is_none()
                {
                    return Err(StorageError::Corrupted(format!(
                        "lecture {lecture_ref} references missing lesson {lesson_id}"
                    )));
                }
                if let Some((_, lecture_outline)) = current.as_mut() {
                    lecture_outline.push_lesson(lesson_id);
                    if let Some(quiz) = row.try_get::<Option<i64>, _>("quiz_id").map_err(ser)? {
                        lecture_outline.push_quiz(quiz_id_from_i64(quiz)?);
                    }
                }
            }
        }
        if let Some((id, lecture_outline)) = current.take() {
            outline.push_lecture(id, lecture_outline);
        }
        Ok(Some(outline))
    }
}

async fn course_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Course, StorageError> {
    let id = row.try_get::<i64, _>("id").map_err(ser)?;

    let lecture_rows = sqlx::query(
        r"
        SELECT lecture_id FROM course_lectures
        WHERE course_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut lectures = Vec::with_capacity(lecture_rows.len());
    for lecture_row in lecture_rows {
        lectures.push(lecture_id_from_i64(
            lecture_row.try_get::<i64, _>("lecture_id").map_err(ser)?,
        )?);
    }

    let student_rows = sqlx::query(
        r"
        SELECT user_id FROM course_students
        WHERE course_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut enrolled = Vec::with_capacity(student_rows.len());
    for student_row in student_rows {
        enrolled.push(user_id_from_i64(
            student_row.try_get::<i64, _>("user_id").map_err(ser)?,
        )?);
    }

    let expiry = if row.try_get::<i64, _>("expiry_enabled").map_err(ser)? != 0 {
        let days = u32::try_from(row.try_get::<i64, _>("expiry_days").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("expiry_days overflow".into()))?;
        ExpiryPolicy::after_days(days).map_err(ser)?
    } else {
        ExpiryPolicy::none()
    };

    Course::from_persisted(
        course_id_from_i64(id)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<i64, _>("published").map_err(ser)? != 0,
        expiry,
        lectures,
        enrolled,
        user_id_from_i64(row.try_get::<i64, _>("created_by").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

async fn lecture_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Lecture, StorageError> {
    let id = row.try_get::<i64, _>("id").map_err(ser)?;

    let lesson_rows = sqlx::query(
        r"
        SELECT lesson_id FROM lecture_lessons
        WHERE lecture_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut lessons = Vec::with_capacity(lesson_rows.len());
    for lesson_row in lesson_rows {
        lessons.push(lesson_id_from_i64(
            lesson_row.try_get::<i64, _>("lesson_id").map_err(ser)?,
        )?);
    }

    Lecture::from_persisted(
        lecture_id_from_i64(id)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        lessons,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

async fn lesson_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Lesson, StorageError> {
    let id = row.try_get::<i64, _>("id").map_err(ser)?;

    let resource_rows = sqlx::query(
        r"
        SELECT url FROM lesson_resources
        WHERE lesson_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .map_err(conn)?;

    let mut resources = Vec::with_capacity(resource_rows.len());
    for resource_row in resource_rows {
        let raw: String = resource_row.try_get("url").map_err(ser)?;
        resources.push(parse_url("resource url", &raw)?);
    }

    let video = row
        .try_get::<Option<String>, _>("video_url")
        .map_err(ser)?
        .map(|raw| parse_url("video url", &raw))
        .transpose()?;

    let quiz = row
        .try_get::<Option<i64>, _>("quiz_id")
        .map_err(ser)?
        .map(quiz_id_from_i64)
        .transpose()?;

    Lesson::from_persisted(
        lesson_id_from_i64(id)?,
        lecture_id_from_i64(row.try_get::<i64, _>("lecture_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        video,
        resources,
        quiz,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}
