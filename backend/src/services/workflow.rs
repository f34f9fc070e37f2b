use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RegistrationStore;
use crate::error::AppError;
use crate::models::{
    Course, RegistrationFilter, RegistrationRecord, RegistrationStatus, Student,
};
use crate::services::ledger::EnrollmentLedger;
use crate::services::validation::{Verdict, total_credits, validate};

/// Result of a successful submission; warnings are advisory only.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub registration: RegistrationRecord,
    pub warnings: Vec<String>,
}

/// Drives a student's registration through `draft -> pending -> approved | rejected`.
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    ledger: EnrollmentLedger,
    semester: String,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        ledger: EnrollmentLedger,
        semester: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            semester: semester.into(),
        }
    }

    pub async fn validate_selection(
        &self,
        student_id: &str,
        course_ids: &[String],
    ) -> Result<Verdict, AppError> {
        let student = self.active_student(student_id).await?;
        let catalog = self.store.list_courses().await?;
        let (_, selected) = resolve_selection(&catalog, course_ids)?;
        Ok(validate(&student, &selected, &catalog))
    }

    /// The most recent draft, pending or approved record for the student's session.
    pub async fn active_registration(
        &self,
        student_id: &str,
    ) -> Result<Option<RegistrationRecord>, AppError> {
        let student = self.find_student(student_id).await?;
        self.active_for(&student).await
    }

    /// Creates a draft, or overwrites the existing one for this session.
    pub async fn save_draft(
        &self,
        student_id: &str,
        course_ids: &[String],
    ) -> Result<RegistrationRecord, AppError> {
        let student = self.active_student(student_id).await?;
        let catalog = self.store.list_courses().await?;
        let (ids, selected) = resolve_selection(&catalog, course_ids)?;
        let credits = total_credits(&selected);

        if let Some(existing) = self.active_for(&student).await? {
            existing.status.check_transition(RegistrationStatus::Draft).map_err(|_| {
                conflict_with(&existing)
            })?;
            return self.overwrite_draft(existing, ids, credits).await;
        }

        let record = self.new_record(&student, ids, credits, RegistrationStatus::Draft, None);
        self.store.create_registration(&record).await?;
        info!("student {} saved draft registration {}", student.id, record.id);
        Ok(record)
    }

    pub async fn update_draft(
        &self,
        student_id: &str,
        registration_id: &str,
        course_ids: &[String],
    ) -> Result<RegistrationRecord, AppError> {
        let record = self.owned_record(student_id, registration_id).await?;
        record.status.check_transition(RegistrationStatus::Draft)?;
        self.active_student(student_id).await?;

        let catalog = self.store.list_courses().await?;
        let (ids, selected) = resolve_selection(&catalog, course_ids)?;
        self.overwrite_draft(record, ids, total_credits(&selected)).await
    }

    /// `draft -> pending`. On validation failure the record stays a draft and
    /// the full error list is returned.
    pub async fn submit(
        &self,
        student_id: &str,
        registration_id: &str,
    ) -> Result<Submission, AppError> {
        let record = self.owned_record(student_id, registration_id).await?;
        record.status.check_transition(RegistrationStatus::Pending)?;
        let student = self.active_student(student_id).await?;

        let catalog = self.store.list_courses().await?;
        let (ids, selected) = resolve_selection(&catalog, &record.course_ids)?;
        let verdict = check(&student, &selected, &catalog)?;

        self.freeze(record, ids, total_credits(&selected), verdict.warnings).await
    }

    /// Direct submission of a selection. Supersedes the session's draft if there
    /// is one; a pending or approved record blocks it.
    pub async fn submit_selection(
        &self,
        student_id: &str,
        course_ids: &[String],
    ) -> Result<Submission, AppError> {
        let student = self.active_student(student_id).await?;
        let catalog = self.store.list_courses().await?;
        let (ids, selected) = resolve_selection(&catalog, course_ids)?;
        let credits = total_credits(&selected);

        let existing = self.active_for(&student).await?;
        if let Some(existing) = &existing {
            if existing.status != RegistrationStatus::Draft {
                return Err(conflict_with(existing));
            }
        }

        let verdict = check(&student, &selected, &catalog)?;

        match existing {
            Some(draft) => self.freeze(draft, ids, credits, verdict.warnings).await,
            None => {
                let now = Utc::now().to_rfc3339();
                let record = self.new_record(
                    &student,
                    ids,
                    credits,
                    RegistrationStatus::Pending,
                    Some(now),
                );
                self.store.create_registration(&record).await?;
                info!("student {} submitted registration {}", student.id, record.id);
                Ok(Submission {
                    registration: record,
                    warnings: verdict.warnings,
                })
            }
        }
    }

    /// `pending -> approved` through the ledger; nothing changes if the commit fails.
    pub async fn approve(&self, registration_id: &str) -> Result<RegistrationRecord, AppError> {
        let record = self.find_record(registration_id).await?;
        record.status.check_transition(RegistrationStatus::Approved)?;

        if let Err(err) = self.ledger.commit(&record).await {
            warn!("approval of registration {} failed: {}", record.id, err);
            return Err(err);
        }
        info!("registration {} approved", record.id);
        self.find_record(registration_id).await
    }

    pub async fn approve_bulk(
        &self,
        records: &[RegistrationRecord],
    ) -> Result<(), AppError> {
        self.ledger.commit_bulk(records).await?;
        info!("bulk-approved {} registration(s)", records.len());
        Ok(())
    }

    pub async fn reject(&self, registration_id: &str) -> Result<RegistrationRecord, AppError> {
        let record = self.find_record(registration_id).await?;
        record.status.check_transition(RegistrationStatus::Rejected)?;

        let updated = self
            .store
            .update_registration_status(
                registration_id,
                RegistrationStatus::Pending,
                RegistrationStatus::Rejected,
            )
            .await?;
        if !updated {
            return Err(self.stale(registration_id, RegistrationStatus::Rejected).await);
        }
        info!("registration {} rejected", registration_id);
        self.find_record(registration_id).await
    }

    pub async fn find_record(&self, registration_id: &str) -> Result<RegistrationRecord, AppError> {
        self.store
            .get_registration(registration_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn overwrite_draft(
        &self,
        mut record: RegistrationRecord,
        ids: Vec<String>,
        credits: u32,
    ) -> Result<RegistrationRecord, AppError> {
        let updated = self
            .store
            .update_draft_courses(&record.id, &ids, credits)
            .await?;
        if !updated {
            return Err(self.stale(&record.id, RegistrationStatus::Draft).await);
        }
        record.course_ids = ids;
        record.total_credits = credits;
        record.updated_at = Utc::now().to_rfc3339();
        Ok(record)
    }

    async fn freeze(
        &self,
        mut record: RegistrationRecord,
        ids: Vec<String>,
        credits: u32,
        warnings: Vec<String>,
    ) -> Result<Submission, AppError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .store
            .submit_registration(&record.id, &ids, credits, &now)
            .await?;
        if !updated {
            return Err(self.stale(&record.id, RegistrationStatus::Pending).await);
        }
        info!("student {} submitted registration {}", record.student_id, record.id);

        record.course_ids = ids;
        record.total_credits = credits;
        record.status = RegistrationStatus::Pending;
        record.submitted_at = Some(now.clone());
        record.updated_at = now;
        Ok(Submission {
            registration: record,
            warnings,
        })
    }

    /// Error for a conditional update that matched nothing: the record moved on meanwhile.
    async fn stale(&self, registration_id: &str, to: RegistrationStatus) -> AppError {
        match self.store.get_registration(registration_id).await {
            Ok(Some(current)) => AppError::InvalidTransition {
                from: current.status,
                to,
            },
            Ok(None) => AppError::NotFound,
            Err(err) => err,
        }
    }

    async fn find_student(&self, student_id: &str) -> Result<Student, AppError> {
        self.store
            .get_student(student_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn active_student(&self, student_id: &str) -> Result<Student, AppError> {
        let student = self.find_student(student_id).await?;
        student.ensure_active()?;
        Ok(student)
    }

    async fn active_for(&self, student: &Student) -> Result<Option<RegistrationRecord>, AppError> {
        let records = self
            .store
            .list_registrations(&RegistrationFilter::active_for(&student.id, &student.session))
            .await?;
        Ok(records.into_iter().last())
    }

    /// Records of other students are reported as missing.
    async fn owned_record(
        &self,
        student_id: &str,
        registration_id: &str,
    ) -> Result<RegistrationRecord, AppError> {
        let record = self.find_record(registration_id).await?;
        if record.student_id != student_id {
            return Err(AppError::NotFound);
        }
        Ok(record)
    }

    fn new_record(
        &self,
        student: &Student,
        course_ids: Vec<String>,
        credits: u32,
        status: RegistrationStatus,
        submitted_at: Option<String>,
    ) -> RegistrationRecord {
        let now = Utc::now().to_rfc3339();
        RegistrationRecord {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            course_ids,
            status,
            total_credits: credits,
            submitted_at,
            session: student.session.clone(),
            semester: self.semester.clone(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Maps requested ids onto catalog entries, dropping repeats but keeping order.
fn resolve_selection(
    catalog: &[Course],
    course_ids: &[String],
) -> Result<(Vec<String>, Vec<Course>), AppError> {
    let mut ids: Vec<String> = Vec::new();
    for id in course_ids {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    if ids.is_empty() {
        return Err(AppError::BadRequest("Please select at least one course".to_string()));
    }

    let selected = ids
        .iter()
        .map(|id| {
            catalog
                .iter()
                .find(|c| &c.id == id)
                .cloned()
                .ok_or_else(|| AppError::BadRequest(format!("unknown course id {}", id)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((ids, selected))
}

fn check(student: &Student, selected: &[Course], catalog: &[Course]) -> Result<Verdict, AppError> {
    let verdict = validate(student, selected, catalog);
    if verdict.valid {
        Ok(verdict)
    } else {
        warn!(
            "submission by {} refused with {} validation error(s)",
            student.id,
            verdict.errors.len()
        );
        Err(AppError::Validation {
            errors: verdict.errors,
            warnings: verdict.warnings,
        })
    }
}

fn conflict_with(existing: &RegistrationRecord) -> AppError {
    AppError::Conflict(format!(
        "registration {} for {} is already {}",
        existing.id, existing.session, existing.status
    ))
}
