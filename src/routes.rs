use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    models::*,
    policy::Capability,
    state::AppState,
    store::ActivityRepository,
};

const ACTIVITY_PAGE: i64 = 200;

pub fn router(state: AppState) -> Router {
    Router::new()
        // identity
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        // catalog
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/:course_id", get(course_detail))
        .route("/api/courses/:course_id/lessons", post(add_lesson))
        .route("/api/courses/:course_id/publish", post(publish_course))
        // enrollment workflow
        .route("/api/enrollments", get(list_enrollments))
        .route("/api/enrollments/create", post(create_enrollment))
        .route("/api/enrollments/activate/:enrollment_id", post(activate_enrollment))
        .route("/api/payments/:payment_id/confirm", post(confirm_payment))
        .route("/api/payments/:payment_id/decline", post(decline_payment))
        // progress + certificates
        .route(
            "/api/progress/:course_id/lessons/:lesson_id/complete",
            post(complete_lesson),
        )
        .route("/api/progress/:course_id", get(course_progress))
        .route("/api/progress/users/:user_id", get(user_progress))
        .route(
            "/api/progress/certificates/:course_id/download",
            get(download_certificate),
        )
        // side channel
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_read))
        .route("/api/admin/activity", get(list_activity))
        .with_state(state)
}

/// Bearer token if present; anonymous otherwise.
struct MaybeUser(Option<AuthUser>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(Self(None));
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(|u| Self(Some(u)))
    }
}

async fn register(
    State(st): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    let user = st.accounts.register(req).await?;
    Ok((http::StatusCode::CREATED, Json(UserView::from(&user))))
}

async fn login(
    State(st): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = st.accounts.authenticate(&req.email, &req.password).await?;
    let (token, expires_at) = st
        .tokens
        .issue(&user)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    tracing::info!(user_id = %user.id, "login");
    Ok(Json(TokenResponse {
        token,
        expires_at,
        user: UserView::from(&user),
    }))
}

async fn me(State(st): State<AppState>, user: AuthUser) -> Result<Json<UserView>, AppError> {
    let u = st.accounts.get(user.id).await?;
    Ok(Json(UserView::from(&u)))
}

async fn list_courses(State(st): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(st.catalog.list().await?))
}

async fn course_detail(
    State(st): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CourseDetail>, AppError> {
    Ok(Json(st.catalog.detail(viewer.as_ref(), course_id).await?))
}

async fn create_course(
    State(st): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCourseReq>,
) -> Result<impl IntoResponse, AppError> {
    let course = st.catalog.create_course(&user, req).await?;
    Ok((http::StatusCode::CREATED, Json(course)))
}

async fn add_lesson(
    State(st): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<AddLessonReq>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = st.catalog.add_lesson(&user, course_id, req).await?;
    Ok((http::StatusCode::CREATED, Json(lesson)))
}

async fn publish_course(
    State(st): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Course>, AppError> {
    Ok(Json(st.catalog.publish(&user, course_id).await?))
}

async fn list_enrollments(
    State(st): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<EnrollmentSummary>>, AppError> {
    user.require(Capability::Enroll)?;
    Ok(Json(st.enrollments.list_for(user.id).await?))
}

async fn create_enrollment(
    State(st): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateEnrollmentReq>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Capability::Enroll)?;
    let handle = st.enrollments.create_enrollment(user.id, req.course_id).await?;
    Ok((http::StatusCode::CREATED, Json(handle)))
}

async fn confirm_payment(
    State(st): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<GatewayCallbackReq>,
) -> Result<Json<PaymentHandle>, AppError> {
    user.require(Capability::Enroll)?;
    Ok(Json(
        st.enrollments
            .confirm_payment(user.id, payment_id, &req.reference)
            .await?,
    ))
}

async fn decline_payment(
    State(st): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<GatewayCallbackReq>,
) -> Result<Json<PaymentHandle>, AppError> {
    user.require(Capability::Enroll)?;
    Ok(Json(
        st.enrollments
            .decline_payment(user.id, payment_id, &req.reference)
            .await?,
    ))
}

async fn activate_enrollment(
    State(st): State<AppState>,
    user: AuthUser,
    Path(enrollment_id): Path<Uuid>,
    Json(req): Json<ActivateReq>,
) -> Result<Json<Enrollment>, AppError> {
    user.require(Capability::Enroll)?;
    Ok(Json(
        st.enrollments
            .activate_enrollment(user.id, enrollment_id, req.payment_id)
            .await?,
    ))
}

async fn complete_lesson(
    State(st): State<AppState>,
    user: AuthUser,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ProgressView>, AppError> {
    user.require(Capability::TrackProgress)?;
    Ok(Json(
        st.progress
            .complete_lesson(user.id, course_id, lesson_id)
            .await?,
    ))
}

async fn course_progress(
    State(st): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ProgressView>, AppError> {
    user.require(Capability::TrackProgress)?;
    Ok(Json(st.progress.progress(user.id, course_id).await?))
}

async fn user_progress(
    State(st): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ProgressView>>, AppError> {
    Ok(Json(st.progress.progress_for(&user, user_id).await?))
}

async fn download_certificate(
    State(st): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Capability::TrackProgress)?;
    let cert = st.certificates.issue_certificate(user.id, course_id).await?;
    tracing::info!(user_id = %user.id, %course_id, certificate = %cert.id, "certificate issued");
    let disposition = format!("attachment; filename=\"{}\"", cert.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        cert.render_html(),
    ))
}

async fn list_notifications(
    State(st): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(st.store.list_notifications(user.id).await?))
}

async fn mark_read(
    State(st): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !st.store.mark_notification_read(user.id, id).await? {
        return Err(AppError::not_found("notification", id));
    }
    Ok(Json(json!({ "ok": true })))
}

async fn list_activity(
    State(st): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    user.require(Capability::ViewActivity)?;
    Ok(Json(st.store.list_activity(ACTIVITY_PAGE).await?))
}
