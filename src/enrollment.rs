//! Enrollment workflow: pending ledger entry, mock payment, activation.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    activity::ActivityLog,
    error::AppError,
    models::{
        Course, Enrollment, EnrollmentHandle, EnrollmentStatus, EnrollmentSummary, Payment,
        PaymentHandle, PaymentStatus,
    },
    store::{CatalogRepository, EnrollmentRepository, SharedStore, StoreError},
};

#[derive(Clone)]
pub struct EnrollmentWorkflow {
    store: SharedStore,
    activity: ActivityLog,
}

impl EnrollmentWorkflow {
    pub fn new(store: SharedStore, activity: ActivityLog) -> Self {
        Self { store, activity }
    }

    /// Opens (or reopens) a pending ledger entry for the pair and returns
    /// what the caller needs to pay.
    pub async fn create_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<EnrollmentHandle, AppError> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .filter(|c| c.published)
            .ok_or_else(|| AppError::not_found("course", course_id))?;

        if let Some(existing) = self.store.find_enrollment_for(user_id, course_id).await? {
            return self.resume(existing, &course).await;
        }

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            status: EnrollmentStatus::Pending,
            completed_lessons: 0,
            progress_percent: 0,
            minutes_spent: 0,
            enrolled_at: now,
            activated_at: None,
            completed_at: None,
        };
        let payment = new_payment(&enrollment, &course);

        let (enrollment, payment) = match self.store.insert_pending_enrollment(enrollment, payment).await {
            Ok(pair) => pair,
            // lost a race with a concurrent request for the same pair
            Err(StoreError::Conflict(_)) => {
                let existing = self
                    .store
                    .find_enrollment_for(user_id, course_id)
                    .await?
                    .ok_or_else(|| AppError::Internal("enrollment vanished after conflict".into()))?;
                return self.resume(existing, &course).await;
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            enrollment_id = %enrollment.id,
            %user_id,
            %course_id,
            amount_cents = payment.amount_cents,
            "enrollment created"
        );
        self.activity.record(
            Some(user_id),
            "enrollment.created",
            Some(enrollment.id),
            json!({ "course_id": course_id, "payment_id": payment.id }),
        );
        Ok(EnrollmentHandle {
            payment: PaymentHandle::from(&payment),
            enrollment,
        })
    }

    /// Hands back the open payment of a pending entry. When every earlier
    /// payment was declined, a fresh one is issued so the caller can retry.
    async fn resume(&self, existing: Enrollment, course: &Course) -> Result<EnrollmentHandle, AppError> {
        if existing.status != EnrollmentStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "already enrolled in course {} ({:?})",
                existing.course_id, existing.status
            )));
        }
        let payment = match self.store.find_open_payment(existing.id).await? {
            Some(open) => open,
            None => {
                let retry = self.store.insert_payment(new_payment(&existing, course)).await?;
                tracing::info!(enrollment_id = %existing.id, payment_id = %retry.id, "payment reissued");
                retry
            }
        };
        Ok(EnrollmentHandle {
            payment: PaymentHandle::from(&payment),
            enrollment: existing,
        })
    }

    /// Mock gateway callback: the caller proves payment by echoing the
    /// reference issued with the handle.
    pub async fn confirm_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        reference: &str,
    ) -> Result<PaymentHandle, AppError> {
        let payment = self.owned_payment(user_id, payment_id).await?;
        if payment.reference != reference {
            tracing::warn!(%payment_id, "payment reference mismatch");
            return Err(AppError::PaymentUnverified(payment_id));
        }
        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Failed => return Err(AppError::PaymentUnverified(payment_id)),
            PaymentStatus::Confirmed | PaymentStatus::Completed => {
                return Ok(PaymentHandle::from(&payment))
            }
        }
        let confirmed = match self.store.confirm_payment(payment_id).await? {
            Some(p) => p,
            // confirmed concurrently
            None => self.owned_payment(user_id, payment_id).await?,
        };
        tracing::info!(%payment_id, "payment confirmed");
        Ok(PaymentHandle::from(&confirmed))
    }

    /// Mock gateway rejection. A declined payment is terminal; the caller
    /// starts over with `create_enrollment`, which issues a new payment.
    pub async fn decline_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        reference: &str,
    ) -> Result<PaymentHandle, AppError> {
        let payment = self.owned_payment(user_id, payment_id).await?;
        if payment.reference != reference {
            tracing::warn!(%payment_id, "payment reference mismatch");
            return Err(AppError::PaymentUnverified(payment_id));
        }
        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Failed => return Ok(PaymentHandle::from(&payment)),
            PaymentStatus::Confirmed | PaymentStatus::Completed => {
                return Err(AppError::InvalidState(format!(
                    "payment {payment_id} is already {:?}",
                    payment.status
                )))
            }
        }
        let declined = match self.store.decline_payment(payment_id).await? {
            Some(p) => p,
            None => {
                // settled concurrently; report whatever won
                let current = self.owned_payment(user_id, payment_id).await?;
                if current.status != PaymentStatus::Failed {
                    return Err(AppError::InvalidState(format!(
                        "payment {payment_id} is already {:?}",
                        current.status
                    )));
                }
                current
            }
        };
        tracing::info!(%payment_id, "payment declined");
        self.activity.record(
            Some(user_id),
            "payment.declined",
            Some(payment_id),
            json!({ "enrollment_id": declined.enrollment_id }),
        );
        Ok(PaymentHandle::from(&declined))
    }

    /// Flips a pending entry to active once its payment is confirmed.
    /// Repeating the call after success returns the entry untouched.
    pub async fn activate_enrollment(
        &self,
        user_id: Uuid,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Enrollment, AppError> {
        let enrollment = self
            .store
            .find_enrollment(enrollment_id)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| AppError::not_found("enrollment", enrollment_id))?;
        let payment = self
            .store
            .find_payment(payment_id)
            .await?
            .filter(|p| p.enrollment_id == enrollment_id)
            .ok_or_else(|| AppError::not_found("payment", payment_id))?;

        match payment.status {
            PaymentStatus::Pending | PaymentStatus::Failed => {
                return Err(AppError::PaymentUnverified(payment_id))
            }
            PaymentStatus::Completed => return Ok(enrollment),
            PaymentStatus::Confirmed => {}
        }
        if enrollment.status != EnrollmentStatus::Pending {
            // activated through another payment; this one stays unfinalized
            return Err(AppError::InvalidState(format!(
                "enrollment {enrollment_id} is already {:?}",
                enrollment.status
            )));
        }

        match self.store.activate(enrollment_id, payment_id).await? {
            Some(active) => {
                tracing::info!(%enrollment_id, %payment_id, "enrollment activated");
                self.activity.record(
                    Some(user_id),
                    "enrollment.activated",
                    Some(enrollment_id),
                    json!({ "payment_id": payment_id }),
                );
                self.activity
                    .notify(user_id, "Your enrollment is active. Happy learning!");
                Ok(active)
            }
            None => {
                // a concurrent activation won; report the settled state
                let current = self
                    .store
                    .find_enrollment(enrollment_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("enrollment", enrollment_id))?;
                let settled = self.store.find_payment(payment_id).await?;
                match settled.map(|p| p.status) {
                    Some(PaymentStatus::Completed) => Ok(current),
                    _ => Err(AppError::InvalidState(format!(
                        "enrollment {enrollment_id} is already {:?}",
                        current.status
                    ))),
                }
            }
        }
    }

    pub async fn list_for(&self, user_id: Uuid) -> Result<Vec<EnrollmentSummary>, AppError> {
        Ok(self.store.list_enrollments(user_id).await?)
    }

    async fn owned_payment(&self, user_id: Uuid, payment_id: Uuid) -> Result<Payment, AppError> {
        self.store
            .find_payment(payment_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::not_found("payment", payment_id))
    }
}

fn new_payment(enrollment: &Enrollment, course: &Course) -> Payment {
    let now = Utc::now();
    let free = course.price_cents == 0;
    Payment {
        id: Uuid::new_v4(),
        enrollment_id: enrollment.id,
        user_id: enrollment.user_id,
        course_id: course.id,
        amount_cents: course.price_cents,
        currency: course.currency.clone(),
        status: if free {
            PaymentStatus::Confirmed
        } else {
            PaymentStatus::Pending
        },
        reference: format!("mock_{}", Uuid::new_v4().simple()),
        created_at: now,
        confirmed_at: free.then_some(now),
        finalized_at: None,
    }
}
