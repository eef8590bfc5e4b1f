use serde_json::json;
use uuid::Uuid;

use crate::{
    activity::ActivityLog,
    auth::AuthUser,
    error::{AppError, FieldErrors},
    models::{AddLessonReq, Course, CourseDetail, CreateCourseReq, Lesson},
    policy::Capability,
    store::{CatalogRepository, NewCourse, NewLesson, SharedStore},
};

#[derive(Clone)]
pub struct Catalog {
    store: SharedStore,
    activity: ActivityLog,
}

impl Catalog {
    pub fn new(store: SharedStore, activity: ActivityLog) -> Self {
        Self { store, activity }
    }

    pub async fn create_course(&self, by: &AuthUser, req: CreateCourseReq) -> Result<Course, AppError> {
        by.require(Capability::ManageCourses)?;
        let currency = req
            .currency
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|| "USD".into());
        FieldErrors::default()
            .check(!req.title.trim().is_empty(), "title", "must not be empty")
            .check(req.price_cents >= 0, "price_cents", "must not be negative")
            .check(
                currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()),
                "currency",
                "must be a 3-letter code",
            )
            .finish()?;

        let course = self
            .store
            .insert_course(NewCourse {
                instructor_id: by.id,
                title: req.title.trim().to_string(),
                description: req.description,
                price_cents: req.price_cents,
                currency,
            })
            .await?;
        tracing::info!(course_id = %course.id, instructor_id = %by.id, "course created");
        self.activity
            .record(Some(by.id), "course.created", Some(course.id), json!({ "title": course.title }));
        Ok(course)
    }

    pub async fn add_lesson(
        &self,
        by: &AuthUser,
        course_id: Uuid,
        req: AddLessonReq,
    ) -> Result<Lesson, AppError> {
        self.owned_course(by, course_id).await?;
        FieldErrors::default()
            .check(!req.title.trim().is_empty(), "title", "must not be empty")
            .check(req.duration_minutes >= 0, "duration_minutes", "must not be negative")
            .finish()?;
        let lesson = self
            .store
            .append_lesson(
                course_id,
                NewLesson {
                    title: req.title.trim().to_string(),
                    duration_minutes: req.duration_minutes,
                },
            )
            .await?;
        tracing::info!(%course_id, lesson_id = %lesson.id, position = lesson.position, "lesson added");
        Ok(lesson)
    }

    pub async fn publish(&self, by: &AuthUser, course_id: Uuid) -> Result<Course, AppError> {
        self.owned_course(by, course_id).await?;
        let course = self
            .store
            .publish_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("course", course_id))?;
        self.activity
            .record(Some(by.id), "course.published", Some(course_id), json!({}));
        Ok(course)
    }

    pub async fn list(&self) -> Result<Vec<Course>, AppError> {
        Ok(self.store.list_published_courses().await?)
    }

    /// Published courses are visible to everyone; drafts only to whoever may
    /// manage them.
    pub async fn detail(&self, viewer: Option<&AuthUser>, course_id: Uuid) -> Result<CourseDetail, AppError> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("course", course_id))?;
        if !course.published && !viewer.is_some_and(|v| may_manage(v, &course)) {
            return Err(AppError::not_found("course", course_id));
        }
        let lessons = self.store.list_lessons(course_id).await?;
        Ok(CourseDetail { course, lessons })
    }

    async fn owned_course(&self, by: &AuthUser, course_id: Uuid) -> Result<Course, AppError> {
        by.require(Capability::ManageCourses)?;
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("course", course_id))?;
        if !may_manage(by, &course) {
            return Err(AppError::Forbidden("course belongs to another instructor".into()));
        }
        Ok(course)
    }
}

fn may_manage(user: &AuthUser, course: &Course) -> bool {
    user.can(Capability::ManageAnyCourse)
        || (user.can(Capability::ManageCourses) && course.instructor_id == user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::Role, store::memory::MemoryStore};
    use std::sync::Arc;

    fn catalog() -> Catalog {
        let store = Arc::new(MemoryStore::new());
        let (activity, _worker) = ActivityLog::spawn(store.clone(), 16);
        Catalog::new(store, activity)
    }

    fn course_req(title: &str) -> CreateCourseReq {
        CreateCourseReq {
            title: title.into(),
            description: String::new(),
            price_cents: 4_900,
            currency: Some("eur".into()),
        }
    }

    fn lesson(title: &str) -> AddLessonReq {
        AddLessonReq {
            title: title.into(),
            duration_minutes: 30,
        }
    }

    #[tokio::test]
    async fn instructor_builds_ordered_course() {
        let cat = catalog();
        let tutor = AuthUser::new(Uuid::new_v4(), Role::Instructor);
        let course = cat.create_course(&tutor, course_req("Rust 101")).await.unwrap();
        assert_eq!(course.currency, "EUR");
        assert!(!course.published);

        for t in ["Ownership", "Borrowing", "Lifetimes"] {
            cat.add_lesson(&tutor, course.id, lesson(t)).await.unwrap();
        }
        cat.publish(&tutor, course.id).await.unwrap();

        let detail = cat.detail(None, course.id).await.unwrap();
        let positions: Vec<_> = detail.lessons.iter().map(|l| (l.position, l.title.as_str())).collect();
        assert_eq!(positions, [(1, "Ownership"), (2, "Borrowing"), (3, "Lifetimes")]);
        assert_eq!(cat.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn students_cannot_author() {
        let cat = catalog();
        let student = AuthUser::new(Uuid::new_v4(), Role::Student);
        assert!(matches!(
            cat.create_course(&student, course_req("Hack")).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn other_instructors_cannot_edit_but_admins_can() {
        let cat = catalog();
        let owner = AuthUser::new(Uuid::new_v4(), Role::Instructor);
        let rival = AuthUser::new(Uuid::new_v4(), Role::Instructor);
        let admin = AuthUser::new(Uuid::new_v4(), Role::Admin);
        let course = cat.create_course(&owner, course_req("Go")).await.unwrap();

        assert!(matches!(
            cat.add_lesson(&rival, course.id, lesson("x")).await,
            Err(AppError::Forbidden(_))
        ));
        cat.add_lesson(&admin, course.id, lesson("x")).await.unwrap();
    }

    #[tokio::test]
    async fn drafts_are_hidden_from_the_public() {
        let cat = catalog();
        let owner = AuthUser::new(Uuid::new_v4(), Role::Instructor);
        let course = cat.create_course(&owner, course_req("Draft")).await.unwrap();
        assert!(matches!(cat.detail(None, course.id).await, Err(AppError::NotFound(_))));
        assert!(cat.detail(Some(&owner), course.id).await.is_ok());
        assert!(cat.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_course_fields() {
        let cat = catalog();
        let owner = AuthUser::new(Uuid::new_v4(), Role::Instructor);
        let err = cat
            .create_course(
                &owner,
                CreateCourseReq {
                    title: "".into(),
                    description: String::new(),
                    price_cents: -1,
                    currency: Some("dollars".into()),
                },
            )
            .await
            .unwrap_err();
        match err {
            AppError::Validation(fields) => assert_eq!(fields.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
