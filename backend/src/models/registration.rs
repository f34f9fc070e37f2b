use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle of a registration record.
///
/// `draft -> pending -> approved | rejected`. `Overridden` is a recognized
/// stored value but nothing in the engine moves a record into or out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Overridden,
}

impl RegistrationStatus {
    pub const ACTIVE: [RegistrationStatus; 3] = [
        RegistrationStatus::Draft,
        RegistrationStatus::Pending,
        RegistrationStatus::Approved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Draft => "draft",
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Overridden => "overridden",
        }
    }

    /// Counts against the one-live-record-per-session rule.
    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn can_transition_to(self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, next),
            (Draft, Draft) | (Draft, Pending) | (Pending, Approved) | (Pending, Rejected)
        )
    }

    pub fn check_transition(self, next: RegistrationStatus) -> Result<(), AppError> {
        if self == RegistrationStatus::Overridden || next == RegistrationStatus::Overridden {
            return Err(AppError::OverrideUnsupported);
        }
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RegistrationStatus::Draft),
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            "overridden" => Ok(RegistrationStatus::Overridden),
            other => Err(AppError::BadRequest(format!(
                "unknown registration status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub course_ids: Vec<String>,
    pub status: RegistrationStatus,
    pub total_credits: u32,
    pub submitted_at: Option<String>,
    pub session: String,
    pub semester: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub student_id: Option<String>,
    pub session: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<RegistrationStatus>,
}

impl RegistrationFilter {
    pub fn with_status(status: RegistrationStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Default::default()
        }
    }

    pub fn active_for(student_id: &str, session: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            session: Some(session.to_string()),
            statuses: RegistrationStatus::ACTIVE.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub course_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApproveRequest {
    pub registration_ids: Vec<String>,
}
