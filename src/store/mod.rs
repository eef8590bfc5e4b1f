//! Persistence ports.
//!
//! Every state transition of the enrollment ledger is expressed as a single
//! conditional operation here, so callers never read-modify-write a ledger
//! entry from application memory.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("record").to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
    pub parent_id: Option<Uuid>,
}

pub struct NewCourse {
    pub instructor_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
}

pub struct NewLesson {
    pub title: String,
    pub duration_minutes: i32,
}

/// Result of recording a lesson against a ledger entry.
#[derive(Debug, Clone)]
pub enum LessonOutcome {
    /// The lesson was appended; `finished` is set when this call moved the
    /// entry from active to completed.
    Recorded { enrollment: Enrollment, finished: bool },
    /// The lesson was already in the completed set; nothing changed.
    AlreadyCompleted(Enrollment),
    /// The entry has not been activated yet.
    NotActive(Enrollment),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course>;
    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>>;
    async fn list_published_courses(&self) -> StoreResult<Vec<Course>>;
    async fn publish_course(&self, id: Uuid) -> StoreResult<Option<Course>>;
    /// Appends a lesson at the end of the course's ordered lesson list.
    async fn append_lesson(&self, course_id: Uuid, lesson: NewLesson) -> StoreResult<Lesson>;
    async fn list_lessons(&self, course_id: Uuid) -> StoreResult<Vec<Lesson>>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    async fn find_enrollment(&self, id: Uuid) -> StoreResult<Option<Enrollment>>;
    async fn find_enrollment_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;
    async fn list_enrollments(&self, user_id: Uuid) -> StoreResult<Vec<EnrollmentSummary>>;
    /// Inserts a pending entry and its payment together. Fails with
    /// [`StoreError::Conflict`] when an entry for the pair already exists.
    async fn insert_pending_enrollment(
        &self,
        enrollment: Enrollment,
        payment: Payment,
    ) -> StoreResult<(Enrollment, Payment)>;
    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    /// Most recent payment for the entry that is still pending or confirmed.
    async fn find_open_payment(&self, enrollment_id: Uuid) -> StoreResult<Option<Payment>>;
    /// Adds a fresh payment to an entry whose earlier payments failed.
    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment>;
    /// `pending -> confirmed`. Returns `None` if the payment was not pending.
    async fn confirm_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>>;
    /// `pending -> failed`. Returns `None` if the payment was not pending.
    async fn decline_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>>;
    /// Finalizes a confirmed payment and flips its entry `pending -> active`
    /// as one unit. Returns `None` when either precondition no longer holds.
    async fn activate(&self, enrollment_id: Uuid, payment_id: Uuid)
        -> StoreResult<Option<Enrollment>>;
    async fn record_lesson(
        &self,
        enrollment_id: Uuid,
        lesson: &Lesson,
    ) -> StoreResult<Option<LessonOutcome>>;
    async fn completed_lesson_ids(&self, enrollment_id: Uuid) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn insert_activity(&self, entry: ActivityEntry) -> StoreResult<()>;
    async fn list_activity(&self, limit: i64) -> StoreResult<Vec<ActivityEntry>>;
    async fn insert_notification(&self, notification: Notification) -> StoreResult<()>;
    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;
}

pub trait Store:
    UserRepository + CatalogRepository + EnrollmentRepository + ActivityRepository + 'static
{
}

impl<T> Store for T where
    T: UserRepository + CatalogRepository + EnrollmentRepository + ActivityRepository + 'static
{
}

pub type SharedStore = Arc<dyn Store>;
