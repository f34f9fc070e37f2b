use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    Course, NewCourseRequest, RegistrationFilter, RegistrationRecord, RegistrationStatus, Student,
    StudentStatus, UpdateCourseRequest,
};

/// One conditional write inside a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerWrite {
    /// `pending -> approved`, re-stamping the credit total. Fails if no longer pending.
    ApproveRegistration {
        registration_id: String,
        total_credits: u32,
        decided_at: String,
    },
    /// Replaces the student's current registrations.
    AssignCourses {
        student_id: String,
        course_ids: Vec<String>,
    },
    /// Takes one seat. Fails when `enrolled >= capacity`.
    IncrementEnrollment {
        registration_id: String,
        course_id: String,
    },
}

/// Writes that land together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    writes: Vec<LedgerWrite>,
}

impl LedgerBatch {
    pub fn push(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn get_student(&self, id: &str) -> Result<Option<Student>, AppError>;
    async fn put_student(&self, student: &Student) -> Result<(), AppError>;
    async fn list_students_by_status(&self, status: StudentStatus) -> Result<Vec<Student>, AppError>;
    /// Conditional: only changes a student currently in `from`.
    async fn update_student_status(
        &self,
        id: &str,
        from: StudentStatus,
        to: StudentStatus,
    ) -> Result<bool, AppError>;

    async fn list_courses(&self) -> Result<Vec<Course>, AppError>;
    async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError>;
    async fn update_course(
        &self,
        id: &str,
        patch: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError>;

    /// Fails with `Conflict` when the student already has an active record for the session.
    async fn create_registration(&self, record: &RegistrationRecord) -> Result<(), AppError>;
    async fn get_registration(&self, id: &str) -> Result<Option<RegistrationRecord>, AppError>;
    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<RegistrationRecord>, AppError>;
    async fn update_draft_courses(
        &self,
        id: &str,
        course_ids: &[String],
        total_credits: u32,
    ) -> Result<bool, AppError>;
    async fn submit_registration(
        &self,
        id: &str,
        course_ids: &[String],
        total_credits: u32,
        submitted_at: &str,
    ) -> Result<bool, AppError>;
    async fn update_registration_status(
        &self,
        id: &str,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> Result<bool, AppError>;

    async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    async fn get_student(&self, id: &str) -> Result<Option<Student>, AppError> {
        repository::find_student_by_id(&self.db, id).await
    }

    async fn put_student(&self, student: &Student) -> Result<(), AppError> {
        repository::upsert_student(&self.db, student).await
    }

    async fn list_students_by_status(&self, status: StudentStatus) -> Result<Vec<Student>, AppError> {
        repository::fetch_students_by_status(&self.db, status).await
    }

    async fn update_student_status(
        &self,
        id: &str,
        from: StudentStatus,
        to: StudentStatus,
    ) -> Result<bool, AppError> {
        repository::update_student_status(&self.db, id, from, to).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        repository::fetch_courses(&self.db).await
    }

    async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
        repository::insert_course(&self.db, req).await
    }

    async fn update_course(
        &self,
        id: &str,
        patch: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError> {
        repository::update_course(&self.db, id, patch).await
    }

    async fn create_registration(&self, record: &RegistrationRecord) -> Result<(), AppError> {
        repository::insert_registration(&self.db, record).await
    }

    async fn get_registration(&self, id: &str) -> Result<Option<RegistrationRecord>, AppError> {
        repository::find_registration_by_id(&self.db, id).await
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<RegistrationRecord>, AppError> {
        repository::fetch_registrations(&self.db, filter).await
    }

    async fn update_draft_courses(
        &self,
        id: &str,
        course_ids: &[String],
        total_credits: u32,
    ) -> Result<bool, AppError> {
        repository::update_draft_courses(&self.db, id, course_ids, total_credits).await
    }

    async fn submit_registration(
        &self,
        id: &str,
        course_ids: &[String],
        total_credits: u32,
        submitted_at: &str,
    ) -> Result<bool, AppError> {
        repository::submit_registration(&self.db, id, course_ids, total_credits, submitted_at).await
    }

    async fn update_registration_status(
        &self,
        id: &str,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> Result<bool, AppError> {
        repository::update_registration_status(&self.db, id, from, to).await
    }

    async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), AppError> {
        repository::apply_ledger_batch(&self.db, batch).await
    }
}

/// Store wrapper for exercising commit failures. Counts `apply_batch` calls and
/// can fail them, or reject a registration just before the batch lands.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    pub(crate) struct ScriptedStore {
        inner: SqliteStore,
        apply_calls: AtomicUsize,
        apply_error: Option<fn() -> AppError>,
        reject_before_apply: Option<String>,
    }

    impl ScriptedStore {
        pub(crate) fn new(inner: SqliteStore) -> Self {
            Self {
                inner,
                apply_calls: AtomicUsize::new(0),
                apply_error: None,
                reject_before_apply: None,
            }
        }

        pub(crate) fn failing_with(mut self, make: fn() -> AppError) -> Self {
            self.apply_error = Some(make);
            self
        }

        pub(crate) fn rejecting_before_apply(mut self, registration_id: &str) -> Self {
            self.reject_before_apply = Some(registration_id.to_string());
            self
        }

        pub(crate) fn apply_calls(&self) -> usize {
            self.apply_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RegistrationStore for ScriptedStore {
        async fn get_student(&self, id: &str) -> Result<Option<Student>, AppError> {
            self.inner.get_student(id).await
        }

        async fn put_student(&self, student: &Student) -> Result<(), AppError> {
            self.inner.put_student(student).await
        }

        async fn list_students_by_status(&self, status: StudentStatus) -> Result<Vec<Student>, AppError> {
            self.inner.list_students_by_status(status).await
        }

        async fn update_student_status(
            &self,
            id: &str,
            from: StudentStatus,
            to: StudentStatus,
        ) -> Result<bool, AppError> {
            self.inner.update_student_status(id, from, to).await
        }

        async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
            self.inner.list_courses().await
        }

        async fn insert_course(&self, req: NewCourseRequest) -> Result<Course, AppError> {
            self.inner.insert_course(req).await
        }

        async fn update_course(
            &self,
            id: &str,
            patch: UpdateCourseRequest,
        ) -> Result<Option<Course>, AppError> {
            self.inner.update_course(id, patch).await
        }

        async fn create_registration(&self, record: &RegistrationRecord) -> Result<(), AppError> {
            self.inner.create_registration(record).await
        }

        async fn get_registration(&self, id: &str) -> Result<Option<RegistrationRecord>, AppError> {
            self.inner.get_registration(id).await
        }

        async fn list_registrations(
            &self,
            filter: &RegistrationFilter,
        ) -> Result<Vec<RegistrationRecord>, AppError> {
            self.inner.list_registrations(filter).await
        }

        async fn update_draft_courses(
            &self,
            id: &str,
            course_ids: &[String],
            total_credits: u32,
        ) -> Result<bool, AppError> {
            self.inner.update_draft_courses(id, course_ids, total_credits).await
        }

        async fn submit_registration(
            &self,
            id: &str,
            course_ids: &[String],
            total_credits: u32,
            submitted_at: &str,
        ) -> Result<bool, AppError> {
            self.inner
                .submit_registration(id, course_ids, total_credits, submitted_at)
                .await
        }

        async fn update_registration_status(
            &self,
            id: &str,
            from: RegistrationStatus,
            to: RegistrationStatus,
        ) -> Result<bool, AppError> {
            self.inner.update_registration_status(id, from, to).await
        }

        async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), AppError> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = &self.reject_before_apply {
                self.inner
                    .update_registration_status(id, RegistrationStatus::Pending, RegistrationStatus::Rejected)
                    .await?;
            }
            if let Some(make) = self.apply_error {
                return Err(make());
            }
            self.inner.apply_batch(batch).await
        }
    }
}
