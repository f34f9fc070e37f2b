use std::sync::Arc;

use crate::db::RegistrationStore;
use crate::services::{EnrollmentLedger, LedgerConfig, RegistrationService, ReviewService};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RegistrationStore>,
    pub registrations: RegistrationService,
    pub review: ReviewService,
}

impl AppState {
    pub fn new(store: Arc<dyn RegistrationStore>, ledger: LedgerConfig, semester: &str) -> Self {
        let ledger = EnrollmentLedger::new(store.clone(), ledger);
        let registrations = RegistrationService::new(store.clone(), ledger, semester);
        let review = ReviewService::new(store.clone(), registrations.clone());
        Self {
            store,
            registrations,
            review,
        }
    }
}
