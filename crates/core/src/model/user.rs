use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserError {
    #[error("user name cannot be empty")]
    EmptyName,
}

//
// ─── USER ──────────────────────────────────────────────────────────────────────
//

/// A learner account.
///
/// The `enrolled` list is a denormalized mirror of the enrollment table so
/// "my courses" can be answered from the user alone; the Enrollment entity
/// stays authoritative for expiry and dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    name: String,
    enrolled: Vec<CourseId>,
    created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new User with no enrollments.
    ///
    /// # Errors
    ///
    /// Returns `UserError::EmptyName` if name is empty or whitespace-only.
    pub fn new(
        id: UserId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UserError::EmptyName);
        }

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            enrolled: Vec::new(),
            created_at,
        })
    }

    /// Rebuilds a User from persisted state.
    ///
    /// # Errors
    ///
    /// Returns `UserError::EmptyName` if the stored name is empty.
    pub fn from_persisted(
        id: UserId,
        name: impl Into<String>,
        enrolled: Vec<CourseId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, UserError> {
        let mut user = Self::new(id, name, created_at)?;
        user.enrolled = enrolled;
        Ok(user)
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn enrolled(&self) -> &[CourseId] {
        &self.enrolled
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Records a course on the user's enrolled list. Duplicates are ignored.
    pub fn add_enrolled(&mut self, course_id: CourseId) {
        if !self.enrolled.contains(&course_id) {
            self.enrolled.push(course_id);
        }
    }

    /// Removes a course from the user's enrolled list, if present.
    pub fn remove_enrolled(&mut self, course_id: CourseId) {
        self.enrolled.retain(|c| *c != course_id);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn user_new_rejects_empty_name() {
        let err = User::new(UserId::new(1), "   ", fixed_now()).unwrap_err();
        assert_eq!(err, UserError::EmptyName);
    }

    #[test]
    fn user_trims_name() {
        let user = User::new(UserId::new(1), "  Dana  ", fixed_now()).unwrap();
        assert_eq!(user.name(), "Dana");
        assert!(user.enrolled().is_empty());
    }

    #[test]
    fn add_enrolled_ignores_duplicates() {
        let mut user = User::new(UserId::new(1), "Dana", fixed_now()).unwrap();
        user.add_enrolled(CourseId::new(7));
        user.add_enrolled(CourseId::new(7));
        assert_eq!(user.enrolled(), &[CourseId::new(7)]);
    }

    #[test]
    fn remove_enrolled_drops_course() {
        let mut user = User::new(UserId::new(1), "Dana", fixed_now()).unwrap();
        user.add_enrolled(CourseId::new(7));
        user.add_enrolled(CourseId::new(9));
        user.remove_enrolled(CourseId::new(7));
        assert_eq!(user.enrolled(), &[CourseId::new(9)]);
    }
}
