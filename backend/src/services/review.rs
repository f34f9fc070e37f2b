use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::RegistrationStore;
use crate::error::AppError;
use crate::models::{
    Course, NewCourseRequest, RegistrationFilter, RegistrationRecord, RegistrationStatus,
    Student, StudentStatus, UpdateCourseRequest,
};
use crate::services::workflow::RegistrationService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    pub ok: bool,
    pub message: String,
}

impl ItemOutcome {
    fn ok(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            ok: true,
            message: message.into(),
        }
    }

    fn failed(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            ok: false,
            message: message.into(),
        }
    }
}

/// Per-registration feedback for a bulk approval. `applied` is true only when
/// every listed registration was committed.
#[derive(Debug, Clone, Serialize)]
pub struct BulkApprovalReport {
    pub applied: bool,
    pub outcomes: Vec<ItemOutcome>,
}

/// Operations behind the coordinator/admin dashboard.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn RegistrationStore>,
    registrations: RegistrationService,
}

impl ReviewService {
    pub fn new(store: Arc<dyn RegistrationStore>, registrations: RegistrationService) -> Self {
        Self {
            store,
            registrations,
        }
    }

    /// Only `pending` records; drafts never reach the queue.
    pub async fn pending_registrations(&self) -> Result<Vec<RegistrationRecord>, AppError> {
        self.store
            .list_registrations(&RegistrationFilter::with_status(RegistrationStatus::Pending))
            .await
    }

    pub async fn approve(&self, registration_id: &str) -> Result<RegistrationRecord, AppError> {
        self.registrations.approve(registration_id).await
    }

    pub async fn reject(&self, registration_id: &str) -> Result<RegistrationRecord, AppError> {
        self.registrations.reject(registration_id).await
    }

    /// Approves every listed registration in one atomic commit.
    ///
    /// If any id is unknown or not pending, nothing is attempted. If the commit
    /// fails, nothing is applied and the culprit is named: the registration whose
    /// course filled up, or the one whose status changed after the check.
    pub async fn bulk_approve(
        &self,
        registration_ids: &[String],
    ) -> Result<BulkApprovalReport, AppError> {
        let mut ids: Vec<&str> = Vec::new();
        for id in registration_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(AppError::BadRequest(
                "no registrations selected for approval".to_string(),
            ));
        }

        let mut records = Vec::with_capacity(ids.len());
        let mut refused = Vec::new();
        for id in &ids {
            match self.store.get_registration(id).await? {
                Some(record) if record.status == RegistrationStatus::Pending => records.push(record),
                Some(record) => refused.push((record.id.clone(), format!("registration is {}", record.status))),
                None => refused.push((id.to_string(), "registration not found".to_string())),
            }
        }

        if !refused.is_empty() {
            warn!("bulk approval refused: {} of {} item(s) not pending", refused.len(), ids.len());
            let outcomes = ids
                .iter()
                .map(|id| match refused.iter().find(|(rid, _)| rid == id) {
                    Some((_, reason)) => ItemOutcome::failed(id, reason.clone()),
                    None => ItemOutcome::failed(id, "not attempted"),
                })
                .collect();
            return Ok(BulkApprovalReport {
                applied: false,
                outcomes,
            });
        }

        match self.registrations.approve_bulk(&records).await {
            Ok(()) => Ok(BulkApprovalReport {
                applied: true,
                outcomes: ids.iter().map(|id| ItemOutcome::ok(id, "approved")).collect(),
            }),
            Err(AppError::CapacityRace {
                registration_id: culprit,
                course_code,
            }) => {
                let reason = AppError::CapacityRace {
                    registration_id: culprit.clone(),
                    course_code,
                }
                .to_string();
                warn!("bulk approval rolled back: {}", reason);
                let outcomes = ids
                    .iter()
                    .map(|id| {
                        if *id == culprit {
                            ItemOutcome::failed(id, reason.clone())
                        } else {
                            ItemOutcome::failed(id, "rolled back")
                        }
                    })
                    .collect();
                Ok(BulkApprovalReport {
                    applied: false,
                    outcomes,
                })
            }
            Err(err @ (AppError::InvalidTransition { .. } | AppError::NotFound)) => {
                warn!("bulk approval rolled back, a registration changed meanwhile: {}", err);
                let mut outcomes = Vec::with_capacity(ids.len());
                for id in &ids {
                    let outcome = match self.store.get_registration(id).await? {
                        Some(record) if record.status == RegistrationStatus::Pending => {
                            ItemOutcome::failed(id, "rolled back")
                        }
                        Some(record) => {
                            ItemOutcome::failed(id, format!("registration is {}", record.status))
                        }
                        None => ItemOutcome::failed(id, "registration not found"),
                    };
                    outcomes.push(outcome);
                }
                Ok(BulkApprovalReport {
                    applied: false,
                    outcomes,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn pending_users(&self) -> Result<Vec<Student>, AppError> {
        self.store
            .list_students_by_status(StudentStatus::PendingApproval)
            .await
    }

    pub async fn activate_user(&self, student_id: &str) -> Result<Student, AppError> {
        self.decide_user(student_id, StudentStatus::Active).await
    }

    pub async fn reject_user(&self, student_id: &str) -> Result<Student, AppError> {
        self.decide_user(student_id, StudentStatus::Rejected).await
    }

    pub async fn add_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        let course = self.store.insert_course(req).await?;
        info!("course {} added to the catalog", course.code);
        Ok(course)
    }

    pub async fn update_course(
        &self,
        course_id: &str,
        patch: UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        let course = self
            .store
            .update_course(course_id, patch)
            .await?
            .ok_or(AppError::NotFound)?;
        info!("course {} updated", course.code);
        Ok(course)
    }

    /// `pending_approval -> active | rejected`.
    async fn decide_user(&self, student_id: &str, to: StudentStatus) -> Result<Student, AppError> {
        let updated = self
            .store
            .update_student_status(student_id, StudentStatus::PendingApproval, to)
            .await?;
        let student = self
            .store
            .get_student(student_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !updated {
            return Err(AppError::Conflict(format!(
                "account {} is {}, not awaiting approval",
                student_id, student.status
            )));
        }
        info!("account {} is now {}", student_id, to);
        Ok(student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::db::store::testing::ScriptedStore;
    use crate::models::{CourseCategory, NewStudentRequest};
    use crate::services::{EnrollmentLedger, LedgerConfig};

    async fn seed_student(store: &ScriptedStore, id: &str) {
        let mut student = NewStudentRequest {
            name: id.to_string(),
            email: format!("{}@example.edu", id),
            major: None,
            faculty: None,
            level: None,
            session: None,
            completed_courses: vec![],
            min_credits: Some(3),
            max_credits: None,
            role: None,
        }
        .into_student(id.to_string())
        .unwrap();
        student.status = StudentStatus::Active;
        store.put_student(&student).await.unwrap();
    }

    fn pending(id: &str, student_id: &str, course_id: &str) -> RegistrationRecord {
        RegistrationRecord {
            id: id.to_string(),
            student_id: student_id.to_string(),
            student_name: student_id.to_string(),
            course_ids: vec![course_id.to_string()],
            status: RegistrationStatus::Pending,
            total_credits: 3,
            submitted_at: Some("2026-01-05T10:00:00Z".to_string()),
            session: "2025/2026".to_string(),
            semester: "First".to_string(),
            created_at: "2026-01-05T10:00:00Z".to_string(),
            updated_at: "2026-01-05T10:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bulk_approval_reports_records_changed_before_commit() {
        let pool = crate::db::connect_in_memory().await.expect("Failed to create test db");
        let store = Arc::new(ScriptedStore::new(SqliteStore::new(pool)).rejecting_before_apply("r2"));
        seed_student(&store, "s1").await;
        seed_student(&store, "s2").await;
        let course = store
            .insert_course(NewCourseRequest {
                code: "CS101".to_string(),
                title: "Intro".to_string(),
                description: String::new(),
                instructor: String::new(),
                semester: "First".to_string(),
                credits: 3,
                category: CourseCategory::Elective,
                schedule: None,
                prerequisites: vec![],
                capacity: 10,
            })
            .await
            .unwrap();
        store.create_registration(&pending("r1", "s1", &course.id)).await.unwrap();
        store.create_registration(&pending("r2", "s2", &course.id)).await.unwrap();

        let ledger = EnrollmentLedger::new(store.clone(), LedgerConfig::default());
        let registrations = RegistrationService::new(store.clone(), ledger, "First");
        let review = ReviewService::new(store.clone(), registrations);

        let report = review
            .bulk_approve(&["r1".to_string(), "r2".to_string()])
            .await
            .unwrap();
        assert!(!report.applied);
        assert_eq!(
            report.outcomes,
            vec![
                ItemOutcome::failed("r1", "rolled back"),
                ItemOutcome::failed("r2", "registration is rejected"),
            ]
        );

        let r1 = store.get_registration("r1").await.unwrap().unwrap();
        assert_eq!(r1.status, RegistrationStatus::Pending);
        let courses = store.list_courses().await.unwrap();
        assert_eq!(courses[0].enrolled, 0);
        let s1 = store.get_student("s1").await.unwrap().unwrap();
        assert!(s1.current_registrations.is_empty());
    }
}
