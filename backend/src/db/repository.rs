use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::rows::{CourseRow, RegistrationRow, StudentRow, encode_list};
use crate::db::store::{LedgerBatch, LedgerWrite};
use crate::error::AppError;
use crate::models::{
    Course, NewCourseRequest, RegistrationFilter, RegistrationRecord, RegistrationStatus, Student,
    StudentStatus, UpdateCourseRequest,
};

const STUDENT_COLUMNS: &str = "id, name, email, major, faculty, level, session, gpa, \
    completed_courses, current_registrations, min_credits, max_credits, role, status";

const COURSE_COLUMNS: &str = "id, code, title, description, instructor, semester, credits, \
    category, meeting_days, start_time, end_time, prerequisites, capacity, enrolled, updated_at";

const REGISTRATION_COLUMNS: &str = "id, student_id, student_name, course_ids, status, \
    total_credits, submitted_at, session, semester, created_at, updated_at";

pub async fn find_student_by_id(db: &SqlitePool, id: &str) -> Result<Option<Student>, AppError> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    sqlx::query_as::<_, StudentRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(StudentRow::into_student)
        .transpose()
}

pub async fn upsert_student(db: &SqlitePool, student: &Student) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO students
            (id, name, email, major, faculty, level, session, gpa,
            completed_courses, current_registrations, min_credits, max_credits,
            role, status, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            email = excluded.email,
            major = excluded.major,
            faculty = excluded.faculty,
            level = excluded.level,
            session = excluded.session,
            gpa = excluded.gpa,
            completed_courses = excluded.completed_courses,
            current_registrations = excluded.current_registrations,
            min_credits = excluded.min_credits,
            max_credits = excluded.max_credits,
            role = excluded.role,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&student.id)
    .bind(&student.name)
    .bind(&student.email)
    .bind(&student.major)
    .bind(&student.faculty)
    .bind(&student.level)
    .bind(&student.session)
    .bind(student.gpa)
    .bind(encode_list(&student.completed_courses))
    .bind(encode_list(&student.current_registrations))
    .bind(i64::from(student.min_credits))
    .bind(i64::from(student.max_credits))
    .bind(student.role.as_str())
    .bind(student.status.as_str())
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn fetch_students_by_status(
    db: &SqlitePool,
    status: StudentStatus,
) -> Result<Vec<Student>, AppError> {
    let sql = format!(
        "SELECT {} FROM students WHERE status = ? ORDER BY updated_at ASC, id ASC",
        STUDENT_COLUMNS
    );
    sqlx::query_as::<_, StudentRow>(&sql)
        .bind(status.as_str())
        .fetch_all(db)
        .await?
        .into_iter()
        .map(StudentRow::into_student)
        .collect()
}

pub async fn update_student_status(
    db: &SqlitePool,
    id: &str,
    from: StudentStatus,
    to: StudentStatus,
) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE students
        SET status = ?1,
            updated_at = ?2
        WHERE id = ?3 AND status = ?4
        "#,
    )
    .bind(to.as_str())
    .bind(now)
    .bind(id)
    .bind(from.as_str())
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, AppError> {
    let sql = format!("SELECT {} FROM courses ORDER BY code ASC", COURSE_COLUMNS);
    sqlx::query_as::<_, CourseRow>(&sql)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(CourseRow::into_course)
        .collect()
}

pub async fn find_course_by_id(db: &SqlitePool, id: &str) -> Result<Option<Course>, AppError> {
    let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
    sqlx::query_as::<_, CourseRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(CourseRow::into_course)
        .transpose()
}

pub async fn insert_course(db: &SqlitePool, req: NewCourseRequest) -> Result<Course, AppError> {
    req.validate()?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let (days, start, end) = schedule_columns(req.schedule.as_ref());

    let result = sqlx::query(
        r#"
        INSERT INTO courses
            (id, code, title, description, instructor, semester, credits, category,
            meeting_days, start_time, end_time, prerequisites, capacity, enrolled,
            created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?14)
        "#,
    )
    .bind(&id)
    .bind(&req.code)
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.instructor)
    .bind(&req.semester)
    .bind(i64::from(req.credits))
    .bind(req.category.as_str())
    .bind(days)
    .bind(start)
    .bind(end)
    .bind(encode_list(&req.prerequisites))
    .bind(i64::from(req.capacity))
    .bind(&now)
    .execute(db)
    .await;

    if let Err(sqlx::Error::Database(e)) = &result {
        if e.is_unique_violation() {
            return Err(AppError::Conflict(format!("course code {} already exists", req.code)));
        }
    }
    result?;

    Ok(Course {
        id,
        code: req.code,
        title: req.title,
        description: req.description,
        instructor: req.instructor,
        semester: req.semester,
        credits: req.credits,
        category: req.category,
        schedule: req.schedule,
        prerequisites: req.prerequisites,
        capacity: req.capacity,
        enrolled: 0,
        updated_at: now,
    })
}

/// Applies a catalog edit. `enrolled` is never written here, and the capacity
/// floor is re-checked in the UPDATE itself so a concurrent commit cannot slip under it.
pub async fn update_course(
    db: &SqlitePool,
    id: &str,
    req: UpdateCourseRequest,
) -> Result<Option<Course>, AppError> {
    let mut current = match find_course_by_id(db, id).await? {
        Some(c) => c,
        None => return Ok(None),
    };

    req.apply_to(&mut current)?;
    let now = Utc::now().to_rfc3339();
    current.updated_at = now.clone();
    let (days, start, end) = schedule_columns(current.schedule.as_ref());

    let result = sqlx::query(
        r#"
        UPDATE courses
        SET title = ?1,
            description = ?2,
            instructor = ?3,
            credits = ?4,
            category = ?5,
            meeting_days = ?6,
            start_time = ?7,
            end_time = ?8,
            prerequisites = ?9,
            capacity = ?10,
            updated_at = ?11
        WHERE id = ?12 AND enrolled <= ?10
        "#,
    )
    .bind(&current.title)
    .bind(&current.description)
    .bind(&current.instructor)
    .bind(i64::from(current.credits))
    .bind(current.category.as_str())
    .bind(days)
    .bind(start)
    .bind(end)
    .bind(encode_list(&current.prerequisites))
    .bind(i64::from(current.capacity))
    .bind(now)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if result == 0 {
        return Err(AppError::Conflict(format!(
            "{}: enrollment changed while editing, capacity {} is now too low",
            current.code, current.capacity
        )));
    }

    find_course_by_id(db, id).await
}

pub async fn insert_registration(
    db: &SqlitePool,
    record: &RegistrationRecord,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO registrations
            (id, student_id, student_name, course_ids, status, total_credits,
            submitted_at, session, semester, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&record.id)
    .bind(&record.student_id)
    .bind(&record.student_name)
    .bind(encode_list(&record.course_ids))
    .bind(record.status.as_str())
    .bind(i64::from(record.total_credits))
    .bind(&record.submitted_at)
    .bind(&record.session)
    .bind(&record.semester)
    .bind(&record.created_at)
    .bind(&record.updated_at)
    .execute(db)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
            format!(
                "student {} already has an active registration for {}",
                record.student_id, record.session
            ),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_registration_by_id(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<RegistrationRecord>, AppError> {
    let sql = format!("SELECT {} FROM registrations WHERE id = ?", REGISTRATION_COLUMNS);
    sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(RegistrationRow::into_record)
        .transpose()
}

pub async fn fetch_registrations(
    db: &SqlitePool,
    filter: &RegistrationFilter,
) -> Result<Vec<RegistrationRecord>, AppError> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
    query.push(REGISTRATION_COLUMNS);
    query.push(" FROM registrations WHERE 1 = 1");

    if let Some(student_id) = &filter.student_id {
        query.push(" AND student_id = ").push_bind(student_id);
    }
    if let Some(session) = &filter.session {
        query.push(" AND session = ").push_bind(session);
    }
    if !filter.statuses.is_empty() {
        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY created_at ASC, id ASC");

    query
        .build_query_as::<RegistrationRow>()
        .fetch_all(db)
        .await?
        .into_iter()
        .map(RegistrationRow::into_record)
        .collect()
}

/// Overwrites the course set of a record that is still a draft.
pub async fn update_draft_courses(
    db: &SqlitePool,
    id: &str,
    course_ids: &[String],
    total_credits: u32,
) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE registrations
        SET course_ids = ?1,
            total_credits = ?2,
            updated_at = ?3
        WHERE id = ?4 AND status = 'draft'
        "#,
    )
    .bind(encode_list(course_ids))
    .bind(i64::from(total_credits))
    .bind(now)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Freezes a draft as pending with the validated course set.
pub async fn submit_registration(
    db: &SqlitePool,
    id: &str,
    course_ids: &[String],
    total_credits: u32,
    submitted_at: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE registrations
        SET status = 'pending',
            course_ids = ?1,
            total_credits = ?2,
            submitted_at = ?3,
            updated_at = ?3
        WHERE id = ?4 AND status = 'draft'
        "#,
    )
    .bind(encode_list(course_ids))
    .bind(i64::from(total_credits))
    .bind(submitted_at)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn update_registration_status(
    db: &SqlitePool,
    id: &str,
    from: RegistrationStatus,
    to: RegistrationStatus,
) -> Result<bool, AppError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE registrations
        SET status = ?1,
            updated_at = ?2
        WHERE id = ?3 AND status = ?4
        "#,
    )
    .bind(to.as_str())
    .bind(now)
    .bind(id)
    .bind(from.as_str())
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Runs every write of the batch inside one transaction. The first write whose
/// condition does not hold aborts the batch and nothing is persisted.
pub async fn apply_ledger_batch(db: &SqlitePool, batch: &LedgerBatch) -> Result<(), AppError> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut tx = db.begin().await?;

    for write in batch.writes() {
        match write {
            LedgerWrite::ApproveRegistration {
                registration_id,
                total_credits,
                decided_at,
            } => {
                let affected = sqlx::query(
                    r#"
                    UPDATE registrations
                    SET status = 'approved',
                        total_credits = ?1,
                        updated_at = ?2
                    WHERE id = ?3 AND status = 'pending'
                    "#,
                )
                .bind(i64::from(*total_credits))
                .bind(decided_at)
                .bind(registration_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if affected == 0 {
                    let current: Option<String> =
                        sqlx::query_scalar("SELECT status FROM registrations WHERE id = ?")
                            .bind(registration_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    return Err(match current {
                        None => AppError::NotFound,
                        Some(status) => AppError::InvalidTransition {
                            from: status.parse()?,
                            to: RegistrationStatus::Approved,
                        },
                    });
                }
            }
            LedgerWrite::AssignCourses {
                student_id,
                course_ids,
            } => {
                let affected = sqlx::query(
                    r#"
                    UPDATE students
                    SET current_registrations = ?1,
                        updated_at = ?2
                    WHERE id = ?3
                    "#,
                )
                .bind(encode_list(course_ids))
                .bind(Utc::now().to_rfc3339())
                .bind(student_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if affected == 0 {
                    return Err(AppError::InvalidRecord(format!(
                        "student {} no longer exists",
                        student_id
                    )));
                }
            }
            LedgerWrite::IncrementEnrollment {
                registration_id,
                course_id,
            } => {
                let affected = sqlx::query(
                    r#"
                    UPDATE courses
                    SET enrolled = enrolled + 1
                    WHERE id = ?1 AND enrolled < capacity
                    "#,
                )
                .bind(course_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if affected == 0 {
                    let code: Option<String> =
                        sqlx::query_scalar("SELECT code FROM courses WHERE id = ?")
                            .bind(course_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    return Err(match code {
                        None => AppError::InvalidRecord(format!(
                            "registration {} references missing course {}",
                            registration_id, course_id
                        )),
                        Some(course_code) => AppError::CapacityRace {
                            registration_id: registration_id.clone(),
                            course_code,
                        },
                    });
                }
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

fn schedule_columns(
    schedule: Option<&crate::models::MeetingPattern>,
) -> (Option<String>, Option<String>, Option<String>) {
    match schedule {
        Some(pattern) => {
            let days: Vec<String> = pattern.days().iter().map(|d| d.to_string()).collect();
            (
                Some(encode_list(&days)),
                Some(pattern.start_time().to_string()),
                Some(pattern.end_time().to_string()),
            )
        }
        None => (None, None, None),
    }
}
