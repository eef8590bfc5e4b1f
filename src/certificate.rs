//! Completion certificates.
//!
//! A certificate is derived from the completed ledger entry and never
//! stored. Its id hashes `(user, course, completed_at)`, so issuing it again
//! yields the same document and writes nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::EnrollmentStatus,
    store::{CatalogRepository, EnrollmentRepository, SharedStore, UserRepository},
};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Certificate {
    pub id: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub learner_name: String,
    pub course_title: String,
    pub instructor_name: String,
    pub minutes_spent: i32,
    pub completed_at: DateTime<Utc>,
}

impl Certificate {
    pub fn file_name(&self) -> String {
        format!("certificate-{}.html", self.course_id)
    }

    pub fn render_html(&self) -> String {
        let hours = self.minutes_spent / 60;
        let minutes = self.minutes_spent % 60;
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Certificate of Completion</title>
  <style>
    body{{font-family:Georgia,serif;text-align:center;padding:64px;border:12px double #345}}
    h1{{font-size:42px;margin-bottom:8px}}
    .name{{font-size:32px;margin:24px 0}}
    .meta{{color:#555;font-size:14px;margin-top:48px}}
  </style>
</head>
<body>
<h1>Certificate of Completion</h1>
<p>This certifies that</p>
<p class='name'>{learner}</p>
<p>has completed the course</p>
<h2>{course}</h2>
<p>taught by {instructor}, with {hours}h {minutes:02}m of study.</p>
<p>Completed on {date}</p>
<p class='meta'>Certificate {id}</p>
</body>
</html>"#,
            learner = escape_html(&self.learner_name),
            course = escape_html(&self.course_title),
            instructor = escape_html(&self.instructor_name),
            date = self.completed_at.format("%B %-d, %Y"),
            id = self.id,
        )
    }
}

pub fn certificate_id(user_id: Uuid, course_id: Uuid, completed_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{user_id}:{course_id}:{}", completed_at.timestamp_micros()));
    hex::encode(hasher.finalize())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone)]
pub struct CertificateIssuer {
    store: SharedStore,
}

impl CertificateIssuer {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn issue_certificate(&self, user_id: Uuid, course_id: Uuid) -> Result<Certificate, AppError> {
        let entry = self
            .store
            .find_enrollment_for(user_id, course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("enrollment for course {course_id}")))?;
        let completed_at = match (entry.status, entry.completed_at) {
            (EnrollmentStatus::Completed, Some(at)) => at,
            _ => {
                return Err(AppError::InvalidState(format!(
                    "course {course_id} is not completed ({}%)",
                    entry.progress_percent
                )))
            }
        };

        let learner = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user", user_id))?;
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("course", course_id))?;
        let instructor_name = self
            .store
            .find_user(course.instructor_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| "the instructor".into());

        Ok(Certificate {
            id: certificate_id(user_id, course_id, completed_at),
            user_id,
            course_id,
            learner_name: learner.name,
            course_title: course.title,
            instructor_name,
            minutes_spent: entry.minutes_spent,
            completed_at,
        })
    }
}
