use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar};
use uuid::Uuid;

use super::*;
use crate::db::Db;

#[derive(sqlx::FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    enrollment: Enrollment,
    course_title: String,
}

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let rec = query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, role, password_hash, parent_id)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING id, email, name, role, password_hash, parent_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(user.parent_id)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(query_as::<_, User>("SELECT * FROM users WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(query_as::<_, User>("SELECT * FROM users WHERE email=$1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let rec = query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, instructor_id, title, description, price_cents, currency)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING id, instructor_id, title, description, price_cents, currency, published, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course.instructor_id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price_cents)
        .bind(&course.currency)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(query_as::<_, Course>("SELECT * FROM courses WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_published_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(query_as::<_, Course>(
            "SELECT * FROM courses WHERE published ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await?)
    }

    async fn publish_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(
            query_as::<_, Course>("UPDATE courses SET published=TRUE WHERE id=$1 RETURNING *")
                .bind(id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    async fn append_lesson(&self, course_id: Uuid, lesson: NewLesson) -> StoreResult<Lesson> {
        let mut tx = self.db.begin().await?;
        // serialize appends per course so positions stay dense
        query("SELECT id FROM courses WHERE id=$1 FOR UPDATE")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
        let rec = query_as::<_, Lesson>(
            r#"
            INSERT INTO lessons (id, course_id, title, position, duration_minutes)
            VALUES ($1, $2, $3,
                    (SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE course_id = $2),
                    $4)
            RETURNING id, course_id, title, position, duration_minutes, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(&lesson.title)
        .bind(lesson.duration_minutes)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rec)
    }

    async fn list_lessons(&self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        Ok(
            query_as::<_, Lesson>("SELECT * FROM lessons WHERE course_id=$1 ORDER BY position")
                .bind(course_id)
                .fetch_all(&self.db)
                .await?,
        )
    }
}

#[async_trait]
impl EnrollmentRepository for PgStore {
    async fn find_enrollment(&self, id: Uuid) -> StoreResult<Option<Enrollment>> {
        Ok(query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_enrollment_for(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE user_id=$1 AND course_id=$2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn list_enrollments(&self, user_id: Uuid) -> StoreResult<Vec<EnrollmentSummary>> {
        let rows = query_as::<_, SummaryRow>(
            r#"
            SELECT e.*, c.title AS course_title
            FROM enrollments e JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = $1
            ORDER BY e.enrolled_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| EnrollmentSummary {
                enrollment: r.enrollment,
                course_title: r.course_title,
            })
            .collect())
    }

    async fn insert_pending_enrollment(
        &self,
        enrollment: Enrollment,
        payment: Payment,
    ) -> StoreResult<(Enrollment, Payment)> {
        let mut tx = self.db.begin().await?;
        let e = query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status)
            VALUES ($1,$2,$3,'pending')
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.user_id)
        .bind(enrollment.course_id)
        .fetch_one(&mut *tx)
        .await?;
        let p = query_as::<_, Payment>(
            r#"
            INSERT INTO payments
                (id, enrollment_id, user_id, course_id, amount_cents, currency, status, reference, confirmed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(e.id)
        .bind(payment.user_id)
        .bind(payment.course_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.reference)
        .bind(payment.confirmed_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok((e, p))
    }

    async fn find_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(query_as::<_, Payment>("SELECT * FROM payments WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_open_payment(&self, enrollment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE enrollment_id=$1 AND status IN ('pending','confirmed')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(enrollment_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn insert_payment(&self, payment: Payment) -> StoreResult<Payment> {
        Ok(query_as::<_, Payment>(
            r#"
            INSERT INTO payments
                (id, enrollment_id, user_id, course_id, amount_cents, currency, status, reference, confirmed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.enrollment_id)
        .bind(payment.user_id)
        .bind(payment.course_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.reference)
        .bind(payment.confirmed_at)
        .fetch_one(&self.db)
        .await?)
    }

    async fn decline_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(query_as::<_, Payment>(
            "UPDATE payments SET status='failed' WHERE id=$1 AND status='pending' RETURNING *",
        )
        .bind(payment_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn confirm_payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(query_as::<_, Payment>(
            r#"
            UPDATE payments SET status='confirmed', confirmed_at=now()
            WHERE id=$1 AND status='pending'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn activate(
        &self,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let mut tx = self.db.begin().await?;
        // the entry row is locked first, so racing activations queue here and
        // find it no longer pending
        let activated = query_as::<_, Enrollment>(
            r#"
            UPDATE enrollments SET status='active', activated_at=now()
            WHERE id=$1 AND status='pending'
            RETURNING *
            "#,
        )
        .bind(enrollment_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(activated) = activated else {
            tx.rollback().await?;
            return Ok(None);
        };
        let finalized = query(
            r#"
            UPDATE payments SET status='completed', finalized_at=now()
            WHERE id=$1 AND enrollment_id=$2 AND status='confirmed'
            "#,
        )
        .bind(payment_id)
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if finalized == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(activated))
    }

    async fn record_lesson(
        &self,
        enrollment_id: Uuid,
        lesson: &Lesson,
    ) -> StoreResult<Option<LessonOutcome>> {
        let mut tx = self.db.begin().await?;
        let current = query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE id=$1 FOR UPDATE",
        )
        .bind(enrollment_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(None);
        };
        if current.status == EnrollmentStatus::Pending {
            tx.rollback().await?;
            return Ok(Some(LessonOutcome::NotActive(current)));
        }

        let inserted = query(
            r#"
            INSERT INTO lesson_completions (enrollment_id, lesson_id)
            VALUES ($1,$2)
            ON CONFLICT (enrollment_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(enrollment_id)
        .bind(lesson.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            return Ok(Some(LessonOutcome::AlreadyCompleted(current)));
        }

        let updated = query_as::<_, Enrollment>(
            r#"
            WITH counts AS (
                SELECT
                    (SELECT count(*) FROM lesson_completions WHERE enrollment_id = $1) AS done,
                    (SELECT count(*) FROM lessons WHERE course_id = $2) AS total
            )
            UPDATE enrollments SET
                completed_lessons = counts.done::int,
                minutes_spent = CASE
                    WHEN status = 'completed' THEN minutes_spent
                    ELSE minutes_spent + $3
                END,
                progress_percent = GREATEST(
                    progress_percent,
                    LEAST(100, (counts.done * 100 / GREATEST(counts.total, 1))::int)
                ),
                status = CASE
                    WHEN status = 'active' AND counts.total > 0 AND counts.done >= counts.total
                    THEN 'completed'::enrollment_status
                    ELSE status
                END,
                completed_at = CASE
                    WHEN status = 'active' AND counts.total > 0 AND counts.done >= counts.total
                    THEN now()
                    ELSE completed_at
                END
            FROM counts
            WHERE enrollments.id = $1
            RETURNING enrollments.*
            "#,
        )
        .bind(enrollment_id)
        .bind(lesson.course_id)
        .bind(lesson.duration_minutes)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let finished = current.status == EnrollmentStatus::Active
            && updated.status == EnrollmentStatus::Completed;
        Ok(Some(LessonOutcome::Recorded {
            enrollment: updated,
            finished,
        }))
    }

    async fn completed_lesson_ids(&self, enrollment_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(query_scalar::<_, Uuid>(
            r#"
            SELECT lc.lesson_id
            FROM lesson_completions lc JOIN lessons l ON l.id = lc.lesson_id
            WHERE lc.enrollment_id=$1
            ORDER BY l.position
            "#,
        )
        .bind(enrollment_id)
        .fetch_all(&self.db)
        .await?)
    }
}

#[async_trait]
impl ActivityRepository for PgStore {
    async fn insert_activity(&self, entry: ActivityEntry) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO activity_log (id, actor_id, action, subject_id, detail, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(entry.subject_id)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_activity(&self, limit: i64) -> StoreResult<Vec<ActivityEntry>> {
        Ok(query_as::<_, ActivityEntry>(
            "SELECT * FROM activity_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?)
    }

    async fn insert_notification(&self, n: Notification) -> StoreResult<()> {
        query(
            r#"
            INSERT INTO notifications (id, user_id, message, read, created_at)
            VALUES ($1,$2,$3,$4,$5)
            "#,
        )
        .bind(n.id)
        .bind(n.user_id)
        .bind(&n.message)
        .bind(n.read)
        .bind(n.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        Ok(query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id=$1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let n = query("UPDATE notifications SET read=TRUE WHERE id=$1 AND user_id=$2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok(n > 0)
    }
}
