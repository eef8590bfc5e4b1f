use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Parent,
    Instructor,
    Admin,
    SubAdmin,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "enrollment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Completed,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Completed,
    Failed,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
}

/// Per-user, per-course ledger entry.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub completed_lessons: i32,
    pub progress_percent: i32,
    pub minutes_spent: i32,
    pub enrolled_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub subject_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// --- request / response bodies ---

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterReq {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Option<Role>,
    pub parent_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub parent_id: Option<Uuid>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            parent_id: u.parent_id,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub currency: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AddLessonReq {
    pub title: String,
    #[serde(default)]
    pub duration_minutes: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateEnrollmentReq {
    pub course_id: Uuid,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ActivateReq {
    pub payment_id: Uuid,
}

/// Mock gateway callback body; the reference proves the caller holds the handle.
#[derive(Deserialize, Debug, Clone)]
pub struct GatewayCallbackReq {
    pub reference: String,
}

/// What the caller needs to pay for a pending enrollment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentHandle {
    pub payment_id: Uuid,
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

impl From<&Payment> for PaymentHandle {
    fn from(p: &Payment) -> Self {
        Self {
            payment_id: p.id,
            reference: p.reference.clone(),
            amount_cents: p.amount_cents,
            currency: p.currency.clone(),
            status: p.status,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollmentHandle {
    pub enrollment: Enrollment,
    pub payment: PaymentHandle,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollmentSummary {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course_title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressView {
    pub enrollment: Enrollment,
    pub total_lessons: i32,
    pub completed_lesson_ids: Vec<Uuid>,
    pub certificate_available: bool,
}
