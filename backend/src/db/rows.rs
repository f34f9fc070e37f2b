//! Raw table rows and the one place where stored data is decoded and defaulted.

use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{
    Course, MeetingPattern, RegistrationRecord, Role, Student, StudentStatus,
    student::{DEFAULT_MAX_CREDITS, DEFAULT_MIN_CREDITS, DEFAULT_SESSION},
};

#[derive(Debug, Clone, FromRow)]
pub struct StudentRow {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub major: Option<String>,
    pub faculty: Option<String>,
    pub level: Option<String>,
    pub session: Option<String>,
    pub gpa: Option<f64>,
    pub completed_courses: Option<String>,
    pub current_registrations: Option<String>,
    pub min_credits: Option<i64>,
    pub max_credits: Option<i64>,
    pub role: Option<String>,
    pub status: Option<String>,
}

impl StudentRow {
    /// Fills in every field older profiles may lack.
    pub fn into_student(self) -> Result<Student, AppError> {
        let role = match self.role.as_deref() {
            None | Some("") => Role::Student,
            Some(raw) => raw.parse().map_err(|_| invalid("students.role", &self.id, raw))?,
        };
        let status = match self.status.as_deref() {
            None | Some("") => StudentStatus::Active,
            Some(raw) => raw
                .parse()
                .map_err(|_| invalid("students.status", &self.id, raw))?,
        };
        let min_credits = match self.min_credits {
            Some(v) => to_u32("students.min_credits", &self.id, v)?,
            None => DEFAULT_MIN_CREDITS,
        };
        let max_credits = match self.max_credits {
            Some(v) => to_u32("students.max_credits", &self.id, v)?,
            None => DEFAULT_MAX_CREDITS,
        };

        Ok(Student {
            completed_courses: decode_list(
                "students.completed_courses",
                &self.id,
                self.completed_courses,
            )?,
            current_registrations: decode_list(
                "students.current_registrations",
                &self.id,
                self.current_registrations,
            )?,
            name: non_empty(self.name, "Unknown"),
            email: self.email.unwrap_or_default(),
            major: non_empty(self.major, "Undeclared"),
            faculty: non_empty(self.faculty, "General Studies"),
            level: non_empty(self.level, "100"),
            session: non_empty(self.session, DEFAULT_SESSION),
            gpa: self.gpa.unwrap_or(0.0),
            min_credits,
            max_credits,
            role,
            status,
            id: self.id,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CourseRow {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub semester: String,
    pub credits: i64,
    pub category: String,
    pub meeting_days: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub prerequisites: String,
    pub capacity: i64,
    pub enrolled: i64,
    pub updated_at: String,
}

impl CourseRow {
    pub fn into_course(self) -> Result<Course, AppError> {
        let schedule = match (self.meeting_days, self.start_time, self.end_time) {
            (Some(days), Some(start), Some(end)) => {
                let days: Vec<String> = serde_json::from_str(&days)
                    .map_err(|_| invalid("courses.meeting_days", &self.id, &days))?;
                Some(
                    MeetingPattern::parse(days.as_slice(), &start, &end).map_err(|e| {
                        AppError::InvalidRecord(format!("courses.schedule of {}: {}", self.id, e))
                    })?,
                )
            }
            _ => None,
        };

        Ok(Course {
            credits: to_u32("courses.credits", &self.id, self.credits)?,
            category: self
                .category
                .parse()
                .map_err(|_| invalid("courses.category", &self.id, &self.category))?,
            prerequisites: decode_list("courses.prerequisites", &self.id, Some(self.prerequisites))?,
            capacity: to_u32("courses.capacity", &self.id, self.capacity)?,
            enrolled: to_u32("courses.enrolled", &self.id, self.enrolled)?,
            schedule,
            id: self.id,
            code: self.code,
            title: self.title,
            description: self.description,
            instructor: self.instructor,
            semester: self.semester,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RegistrationRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub course_ids: String,
    pub status: String,
    pub total_credits: i64,
    pub submitted_at: Option<String>,
    pub session: String,
    pub semester: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RegistrationRow {
    pub fn into_record(self) -> Result<RegistrationRecord, AppError> {
        Ok(RegistrationRecord {
            course_ids: decode_list("registrations.course_ids", &self.id, Some(self.course_ids))?,
            status: self
                .status
                .parse()
                .map_err(|_| invalid("registrations.status", &self.id, &self.status))?,
            total_credits: to_u32("registrations.total_credits", &self.id, self.total_credits)?,
            id: self.id,
            student_id: self.student_id,
            student_name: self.student_name,
            submitted_at: self.submitted_at,
            session: self.session,
            semester: self.semester,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(column: &str, id: &str, raw: Option<String>) -> Result<Vec<String>, AppError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text).map_err(|_| invalid(column, id, text)),
    }
}

fn to_u32(column: &str, id: &str, value: i64) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| invalid(column, id, &value.to_string()))
}

fn non_empty(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn invalid(column: &str, id: &str, raw: &str) -> AppError {
    AppError::InvalidRecord(format!("{} of {} holds '{}'", column, id, raw))
}
