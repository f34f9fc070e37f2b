use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_MIN_CREDITS: u32 = 15;
pub const DEFAULT_MAX_CREDITS: u32 = 24;
pub const DEFAULT_SESSION: &str = "2025/2026";

/// Account state. Only `Active` accounts may use the registration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    PendingApproval,
    Rejected,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::PendingApproval => "pending_approval",
            StudentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StudentStatus::Active),
            "pending_approval" => Ok(StudentStatus::PendingApproval),
            "rejected" => Ok(StudentStatus::Rejected),
            other => Err(AppError::BadRequest(format!("unknown account status '{}'", other))),
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Coordinator,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Coordinator => "coordinator",
            Role::Admin => "admin",
        }
    }

    /// Coordinators and admins may run administrative operations.
    pub fn is_administrative(self) -> bool {
        matches!(self, Role::Coordinator | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "coordinator" => Ok(Role::Coordinator),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::BadRequest(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub major: String,
    pub faculty: String,
    pub level: String,
    pub session: String,
    pub gpa: f64,
    /// Course codes the student has passed.
    pub completed_courses: Vec<String>,
    /// Course ids of the approved registration.
    pub current_registrations: Vec<String>,
    pub min_credits: u32,
    pub max_credits: u32,
    pub role: Role,
    pub status: StudentStatus,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }

    pub fn has_completed(&self, code: &str) -> bool {
        self.completed_courses.iter().any(|c| c == code)
    }

    pub fn ensure_active(&self) -> Result<(), AppError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "account {} is {}, only active accounts may register",
                self.id, self.status
            )))
        }
    }
}

/// Profile submitted right after sign-up. The account id comes from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudentRequest {
    pub name: String,
    pub email: String,
    pub major: Option<String>,
    pub faculty: Option<String>,
    pub level: Option<String>,
    pub session: Option<String>,
    #[serde(default)]
    pub completed_courses: Vec<String>,
    pub min_credits: Option<u32>,
    pub max_credits: Option<u32>,
    pub role: Option<Role>,
}

impl NewStudentRequest {
    /// New accounts always start out awaiting administrator approval.
    pub fn into_student(self, id: String) -> Result<Student, AppError> {
        let min_credits = self.min_credits.unwrap_or(DEFAULT_MIN_CREDITS);
        let max_credits = self.max_credits.unwrap_or(DEFAULT_MAX_CREDITS);
        if min_credits > max_credits {
            return Err(AppError::BadRequest(format!(
                "min_credits {} exceeds max_credits {}",
                min_credits, max_credits
            )));
        }

        Ok(Student {
            id,
            name: self.name,
            email: self.email,
            major: self.major.unwrap_or_else(|| "Undeclared".to_string()),
            faculty: self.faculty.unwrap_or_else(|| "General Studies".to_string()),
            level: self.level.unwrap_or_else(|| "100".to_string()),
            session: self.session.unwrap_or_else(|| DEFAULT_SESSION.to_string()),
            gpa: 0.0,
            completed_courses: self.completed_courses,
            current_registrations: Vec::new(),
            min_credits,
            max_credits,
            role: self.role.unwrap_or(Role::Student),
            status: StudentStatus::PendingApproval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewStudentRequest {
        NewStudentRequest {
            name: "Ada".to_string(),
            email: "ada@example.edu".to_string(),
            major: None,
            faculty: None,
            level: None,
            session: None,
            completed_courses: vec!["MTH101".to_string()],
            min_credits: None,
            max_credits: None,
            role: None,
        }
    }

    #[test]
    fn test_new_student_defaults() {
        let student = request().into_student("acct-1".to_string()).unwrap();
        assert_eq!(student.status, StudentStatus::PendingApproval);
        assert_eq!(student.role, Role::Student);
        assert_eq!(student.min_credits, 15);
        assert_eq!(student.max_credits, 24);
        assert_eq!(student.session, DEFAULT_SESSION);
        assert!(student.has_completed("MTH101"));
        assert!(student.ensure_active().is_err());
    }

    #[test]
    fn test_new_student_rejects_inverted_credit_bounds() {
        let mut req = request();
        req.min_credits = Some(20);
        req.max_credits = Some(10);
        assert!(req.into_student("acct-1".to_string()).is_err());
    }

    #[test]
    fn test_role_classes() {
        assert!(!Role::Student.is_administrative());
        assert!(Role::Coordinator.is_administrative());
        assert!(Role::Admin.is_administrative());
        assert_eq!("pending_approval".parse::<StudentStatus>().unwrap(), StudentStatus::PendingApproval);
    }
}
