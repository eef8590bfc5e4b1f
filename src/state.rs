use std::sync::Arc;

use crate::{
    accounts::Accounts, activity::ActivityLog, auth::TokenKeys, catalog::Catalog,
    certificate::CertificateIssuer, enrollment::EnrollmentWorkflow, progress::ProgressTracker,
    store::SharedStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub tokens: Arc<TokenKeys>,
    pub accounts: Accounts,
    pub catalog: Catalog,
    pub enrollments: EnrollmentWorkflow,
    pub progress: ProgressTracker,
    pub certificates: CertificateIssuer,
}

impl AppState {
    pub fn new(store: SharedStore, activity: ActivityLog, tokens: TokenKeys) -> Self {
        Self {
            accounts: Accounts::new(store.clone(), activity.clone()),
            catalog: Catalog::new(store.clone(), activity.clone()),
            enrollments: EnrollmentWorkflow::new(store.clone(), activity.clone()),
            progress: ProgressTracker::new(store.clone(), activity),
            certificates: CertificateIssuer::new(store.clone()),
            tokens: Arc::new(tokens),
            store,
        }
    }
}
