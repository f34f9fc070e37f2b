use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{LedgerBatch, LedgerWrite, RegistrationStore};
use crate::error::AppError;
use crate::models::{Course, RegistrationRecord, RegistrationStatus};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Extra attempts after a transient storage failure.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Commits approved registrations: status, the student's course list and
/// every seat counter move together in one store transaction.
#[derive(Clone)]
pub struct EnrollmentLedger {
    store: Arc<dyn RegistrationStore>,
    config: LedgerConfig,
}

impl EnrollmentLedger {
    pub fn new(store: Arc<dyn RegistrationStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub async fn commit(&self, record: &RegistrationRecord) -> Result<(), AppError> {
        self.commit_bulk(std::slice::from_ref(record)).await
    }

    /// All-or-nothing across every record in `records`.
    pub async fn commit_bulk(&self, records: &[RegistrationRecord]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            record.status.check_transition(RegistrationStatus::Approved)?;
        }

        let mut attempt = 0;
        loop {
            match self.try_commit(records).await {
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "ledger commit of {} registration(s) hit a transient error (attempt {}/{}): {}",
                        records.len(),
                        attempt,
                        self.config.max_retries,
                        err
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err),
                Ok(()) => {
                    info!("committed {} registration(s) to the ledger", records.len());
                    return Ok(());
                }
            }
        }
    }

    async fn try_commit(&self, records: &[RegistrationRecord]) -> Result<(), AppError> {
        let catalog = self.store.list_courses().await?;
        let batch = plan_batch(records, &catalog, &Utc::now().to_rfc3339())?;
        self.store.apply_batch(&batch).await
    }
}

/// Builds the write set for approving `records` against a live catalog read.
///
/// Seats claimed by earlier records in the same batch count against capacity.
/// The store still re-checks each increment inside the transaction.
pub fn plan_batch(
    records: &[RegistrationRecord],
    catalog: &[Course],
    decided_at: &str,
) -> Result<LedgerBatch, AppError> {
    let by_id: HashMap<&str, &Course> = catalog.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut claimed: HashMap<&str, u32> = HashMap::new();
    let mut batch = LedgerBatch::default();

    for record in records {
        let mut credits: u32 = 0;
        for course_id in &record.course_ids {
            let course = by_id.get(course_id.as_str()).copied().ok_or_else(|| {
                AppError::InvalidRecord(format!(
                    "registration {} references missing course {}",
                    record.id, course_id
                ))
            })?;
            let taken = claimed.entry(course.id.as_str()).or_insert(0);
            if course.enrolled.saturating_add(*taken) >= course.capacity {
                return Err(AppError::CapacityRace {
                    registration_id: record.id.clone(),
                    course_code: course.code.clone(),
                });
            }
            *taken += 1;
            credits = credits.saturating_add(course.credits);
        }

        batch.push(LedgerWrite::ApproveRegistration {
            registration_id: record.id.clone(),
            total_credits: credits,
            decided_at: decided_at.to_string(),
        });
        batch.push(LedgerWrite::AssignCourses {
            student_id: record.student_id.clone(),
            course_ids: record.course_ids.clone(),
        });
        for course_id in &record.course_ids {
            batch.push(LedgerWrite::IncrementEnrollment {
                registration_id: record.id.clone(),
                course_id: course_id.clone(),
            });
        }
    }

    Ok(batch)
}
