use serde_json::json;
use uuid::Uuid;

use crate::{
    activity::ActivityLog,
    auth::{hash_password, verify_password},
    error::{AppError, FieldErrors},
    models::{RegisterReq, Role, User},
    store::{NewUser, SharedStore, StoreError, UserRepository},
};

#[derive(Clone)]
pub struct Accounts {
    store: SharedStore,
    activity: ActivityLog,
}

impl Accounts {
    pub fn new(store: SharedStore, activity: ActivityLog) -> Self {
        Self { store, activity }
    }

    /// Self-service sign-up. Staff roles are provisioned out of band.
    pub async fn register(&self, req: RegisterReq) -> Result<User, AppError> {
        let email = req.email.trim().to_lowercase();
        let role = req.role.unwrap_or(Role::Student);
        FieldErrors::default()
            .check(is_plausible_email(&email), "email", "must be a valid email address")
            .check(!req.name.trim().is_empty(), "name", "must not be empty")
            .check(req.password.chars().count() >= 8, "password", "must be at least 8 characters")
            .check(
                matches!(role, Role::Student | Role::Parent),
                "role",
                "only student and parent accounts can self-register",
            )
            .check(
                req.parent_id.is_none() || role == Role::Student,
                "parent_id",
                "only students can be linked to a parent",
            )
            .finish()?;

        if let Some(parent_id) = req.parent_id {
            let parent = self.store.find_user(parent_id).await?;
            if !parent.is_some_and(|p| p.role == Role::Parent) {
                return Err(AppError::Validation(vec![crate::error::FieldError {
                    field: "parent_id".into(),
                    message: "must reference a parent account".into(),
                }]));
            }
        }

        let password_hash = hash_password(&req.password)?;
        let user = self
            .store
            .insert_user(NewUser {
                email,
                name: req.name.trim().to_string(),
                role,
                password_hash,
                parent_id: req.parent_id,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::Conflict("email is already registered".into()),
                other => other.into(),
            })?;

        tracing::info!(user_id = %user.id, role = ?user.role, "user registered");
        self.activity
            .record(Some(user.id), "user.registered", Some(user.id), json!({ "role": user.role }));
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();
        let user = self.store.find_user_by_email(&email).await?;
        match user {
            Some(u) if verify_password(password, &u.password_hash) => Ok(u),
            _ => Err(AppError::Unauthorized("invalid email or password".into())),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}
