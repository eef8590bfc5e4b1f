//! Lesson completion and progress reads.

use serde_json::json;
use uuid::Uuid;

use crate::{
    activity::ActivityLog,
    auth::AuthUser,
    error::AppError,
    models::{Enrollment, EnrollmentStatus, ProgressView},
    policy::Capability,
    store::{
        CatalogRepository, EnrollmentRepository, LessonOutcome, SharedStore, UserRepository,
    },
};

#[derive(Clone)]
pub struct ProgressTracker {
    store: SharedStore,
    activity: ActivityLog,
}

impl ProgressTracker {
    pub fn new(store: SharedStore, activity: ActivityLog) -> Self {
        Self { store, activity }
    }

    /// Marks a lesson complete. Completing a lesson twice is a no-op that
    /// returns the current progress.
    pub async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<ProgressView, AppError> {
        let lessons = self.store.list_lessons(course_id).await?;
        let lesson = lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .ok_or_else(|| AppError::not_found("lesson", lesson_id))?;
        let entry = self.entry(user_id, course_id).await?;

        let outcome = self
            .store
            .record_lesson(entry.id, lesson)
            .await?
            .ok_or_else(|| AppError::not_found("enrollment", entry.id))?;

        let enrollment = match outcome {
            LessonOutcome::NotActive(_) => {
                return Err(AppError::InvalidState(format!(
                    "enrollment {} is awaiting payment",
                    entry.id
                )))
            }
            LessonOutcome::AlreadyCompleted(current) => {
                tracing::debug!(%lesson_id, enrollment_id = %current.id, "lesson already complete");
                current
            }
            LessonOutcome::Recorded { enrollment, finished } => {
                tracing::info!(
                    enrollment_id = %enrollment.id,
                    %lesson_id,
                    progress = enrollment.progress_percent,
                    "lesson completed"
                );
                if finished {
                    self.on_course_finished(&enrollment);
                }
                enrollment
            }
        };
        self.view(enrollment, lessons.len()).await
    }

    pub async fn progress(&self, user_id: Uuid, course_id: Uuid) -> Result<ProgressView, AppError> {
        let entry = self.entry(user_id, course_id).await?;
        let total = self.store.list_lessons(course_id).await?.len();
        self.view(entry, total).await
    }

    /// All ledger entries of `user_id`, for the user, a linked parent, or staff.
    pub async fn progress_for(&self, viewer: &AuthUser, user_id: Uuid) -> Result<Vec<ProgressView>, AppError> {
        let subject = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user", user_id))?;
        let allowed = viewer.id == subject.id
            || viewer.can(Capability::ViewAnyProgress)
            || (viewer.can(Capability::ViewChildProgress) && subject.parent_id == Some(viewer.id));
        if !allowed {
            return Err(AppError::Forbidden("not allowed to view this learner".into()));
        }

        let mut views = Vec::new();
        for summary in self.store.list_enrollments(user_id).await? {
            let total = self
                .store
                .list_lessons(summary.enrollment.course_id)
                .await?
                .len();
            views.push(self.view(summary.enrollment, total).await?);
        }
        Ok(views)
    }

    fn on_course_finished(&self, enrollment: &Enrollment) {
        tracing::info!(enrollment_id = %enrollment.id, "course completed; certificate available");
        self.activity.record(
            Some(enrollment.user_id),
            "course.completed",
            Some(enrollment.id),
            json!({ "course_id": enrollment.course_id }),
        );
        self.activity.notify(
            enrollment.user_id,
            "Congratulations! Your certificate is ready to download.",
        );
    }

    async fn entry(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, AppError> {
        self.store
            .find_enrollment_for(user_id, course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("enrollment for course {course_id}")))
    }

    async fn view(&self, enrollment: Enrollment, total: usize) -> Result<ProgressView, AppError> {
        let completed_lesson_ids = self.store.completed_lesson_ids(enrollment.id).await?;
        Ok(ProgressView {
            certificate_available: enrollment.status == EnrollmentStatus::Completed,
            total_lessons: i32::try_from(total).unwrap_or(i32::MAX),
            completed_lesson_ids,
            enrollment,
        })
    }
}
