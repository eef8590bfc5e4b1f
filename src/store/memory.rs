//! In-process store used by the service and router tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::*;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    courses: HashMap<Uuid, Course>,
    lessons: Vec<Lesson>,
    enrollments: HashMap<Uuid, Enrollment>,
    completions: HashMap<Uuid, HashSet<Uuid>>,
    payments: HashMap<Uuid, Payment>,
    activity: Vec<ActivityEntry>,
    notifications: Vec<Notification>,
}

/// All operations take the single lock, which gives every conditional
/// update the same atomicity the Postgres adapter gets from row locks.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payments_for(&self, enrollment_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .payments
            .values()
            .filter(|p| p.enrollment_id == enrollment_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut st = self.state.lock();
        if st.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        let rec = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            role: user.role,
            password_hash: user.password_hash,
            parent_id: user.parent_id,
            created_at: Utc::now(),
        };
        st.users.insert(rec.id, rec.clone());
        Ok(rec)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let rec = Course {
            id: Uuid::new_v4(),
            instructor_id: course.instructor_id,
            title: course.title,
            description: course.description,
            price_cents: course.price_cents,
            currency: course.currency,
            published: false,
            created_at: Utc::now(),
        };
        self.state.lock().courses.insert(rec.id, rec.clone());
        Ok(rec)
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.state.lock().courses.get(&id).cloned())
    }

    async fn list_published_courses(&self) -> StoreResult<Vec<Course>> {
        let mut courses: Vec<Course> = self
            .state
            .lock()
            .courses
            .values()
            .filter(|c| c.published)
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses)
    }

    async fn publish_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let mut st = self.state.lock();
        Ok(st.courses.get_mut(&id).map(|c| {
            c.published = true;
            c.clone()
        }))
    }

    async fn append_lesson(&self, course_id: Uuid, lesson: NewLesson) -> StoreResult<Lesson> {
        let mut st = self.state.lock();
        let position = st
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id)
            .map(|l| l.position)
            .max()
            .unwrap_or(0)
            + 1;
        let rec = Lesson {
            id: Uuid::new_v4(),
            course_id,
            title: lesson.title,
            position,
            duration_minutes: lesson.duration_minutes,
            created_at: Utc::now(),
        };
        st.lessons.push(rec.clone());
        Ok(rec)
    }

    async fn list_lessons(&self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = self
            .state
            .lock()
            .lessons
            .iter()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.position);
        Ok(lessons)
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn find_enrollment(&self, id: Uuid) -> StoreResult<Option<Enrollment>> {
        Ok(self.state.lock().enrollments.get(&id).cloned())
    }

    async fn find_enrollment_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .state
            .lock()
            .enrollments
            .values()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn list_enrollments(&self, user_id: Uuid) -> StoreResult<Vec<EnrollmentSummary>> {
        let st = self.state.lock();
        let mut out: Vec<EnrollmentSummary> = st
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| EnrollmentSummary {
                enrollment: e.clone(),
                course_title: st
                    .courses
                    .get(&e.course_id)
                    .map(|c| c.title.clone())
                    .unwrap_or_default(),
            })
            .collect();
        out.sort_by_key(|s| s.enrollment.enrolled_at);
        Ok(out)
    }

    async fn insert_pending_enrollment(
        &self,
        enrollment: Enrollment,
        payment: Payment,
    ) -> StoreResult<(Enrollment, Payment)> {
        let mut st = self.state.lock();
        let taken = st
            .enrollments
            .values()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id);
        if taken {
            return Err(StoreError::Conflict(
                "enrollments_user_id_course_id_key".into(),
            ));
        }
        st.enrollments.insert(enrollment.id, enrollment.clone());
        st.payments.insert(payment.id, payment.clone());
        Ok((enrollment, payment))
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state.lock().payments.get(&id).cloned())
    }

    async fn find_open_payment(&self, enrollment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self
            .state
            .lock()
            .payments
            .values()
            .filter(|p| {
                p.enrollment_id == enrollment_id
                    && matches!(p.status, PaymentStatus::Pending | PaymentStatus::Confirmed)
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment> {
        self.state.lock().payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn decline_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        let mut st = self.state.lock();
        Ok(st
            .payments
            .get_mut(&payment_id)
            .filter(|p| p.status == PaymentStatus::Pending)
            .map(|p| {
                p.status = PaymentStatus::Failed;
                p.clone()
            }))
    }

    async fn confirm_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        let mut st = self.state.lock();
        Ok(st
            .payments
            .get_mut(&payment_id)
            .filter(|p| p.status == PaymentStatus::Pending)
            .map(|p| {
                p.status = PaymentStatus::Confirmed;
                p.confirmed_at = Some(Utc::now());
                p.clone()
            }))
    }

    async fn activate(
        &self,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let mut st = self.state.lock();
        let payment_ok = st.payments.get(&payment_id).is_some_and(|p| {
            p.enrollment_id == enrollment_id && p.status == PaymentStatus::Confirmed
        });
        let entry_ok = st
            .enrollments
            .get(&enrollment_id)
            .is_some_and(|e| e.status == EnrollmentStatus::Pending);
        if !(payment_ok && entry_ok) {
            return Ok(None);
        }
        let now = Utc::now();
        if let Some(p) = st.payments.get_mut(&payment_id) {
            p.status = PaymentStatus::Completed;
            p.finalized_at = Some(now);
        }
        Ok(st.enrollments.get_mut(&enrollment_id).map(|e| {
            e.status = EnrollmentStatus::Active;
            e.activated_at = Some(now);
            e.clone()
        }))
    }

    async fn record_lesson(
        &self,
        enrollment_id: Uuid,
        lesson: &Lesson,
    ) -> StoreResult<Option<LessonOutcome>> {
        let mut st = self.state.lock();
        let Some(current) = st.enrollments.get(&enrollment_id).cloned() else {
            return Ok(None);
        };
        if current.status == EnrollmentStatus::Pending {
            return Ok(Some(LessonOutcome::NotActive(current)));
        }
        if !st
            .completions
            .entry(enrollment_id)
            .or_default()
            .insert(lesson.id)
        {
            return Ok(Some(LessonOutcome::AlreadyCompleted(current)));
        }

        let done = st.completions.get(&enrollment_id).map_or(0, HashSet::len) as i32;
        let total = st
            .lessons
            .iter()
            .filter(|l| l.course_id == lesson.course_id)
            .count() as i32;
        let Some(e) = st.enrollments.get_mut(&enrollment_id) else {
            return Ok(None);
        };
        e.completed_lessons = done;
        // study time is frozen once the certificate exists
        if e.status != EnrollmentStatus::Completed {
            e.minutes_spent += lesson.duration_minutes;
        }
        e.progress_percent = e
            .progress_percent
            .max((done * 100 / total.max(1)).min(100));
        let finished = e.status == EnrollmentStatus::Active && total > 0 && done >= total;
        if finished {
            e.status = EnrollmentStatus::Completed;
            e.completed_at = Some(Utc::now());
        }
        Ok(Some(LessonOutcome::Recorded {
            enrollment: e.clone(),
            finished,
        }))
    }

    async fn completed_lesson_ids(&self, enrollment_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let st = self.state.lock();
        let Some(done) = st.completions.get(&enrollment_id) else {
            return Ok(Vec::new());
        };
        let mut lessons: Vec<&Lesson> = st.lessons.iter().filter(|l| done.contains(&l.id)).collect();
        lessons.sort_by_key(|l| l.position);
        Ok(lessons.into_iter().map(|l| l.id).collect())
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn insert_activity(&self, entry: ActivityEntry) -> StoreResult<()> {
        self.state.lock().activity.push(entry);
        Ok(())
    }

    async fn list_activity(&self, limit: i64) -> StoreResult<Vec<ActivityEntry>> {
        let st = self.state.lock();
        Ok(st
            .activity
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, n: Notification) -> StoreResult<()> {
        self.state.lock().notifications.push(n);
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let st = self.state.lock();
        Ok(st
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut st = self.state.lock();
        Ok(st
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| n.read = true)
            .is_some())
    }
}
