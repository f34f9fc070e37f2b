use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseCategory {
    Core,
    Elective,
    #[serde(alias = "gst")]
    General,
    Departmental,
}

impl CourseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseCategory::Core => "core",
            CourseCategory::Elective => "elective",
            CourseCategory::General => "general",
            CourseCategory::Departmental => "departmental",
        }
    }
}

impl FromStr for CourseCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(CourseCategory::Core),
            "elective" => Ok(CourseCategory::Elective),
            "general" | "gst" => Ok(CourseCategory::General),
            "departmental" => Ok(CourseCategory::Departmental),
            other => Err(AppError::BadRequest(format!("unknown course category '{}'", other))),
        }
    }
}

/// Time of day with minute precision, written as 24-hour `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl FromStr for TimeOfDay {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let time = NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| {
            AppError::BadRequest(format!("invalid time of day '{}', expected HH:MM", s))
        })?;
        Ok(Self((time.hour() * 60 + time.minute()) as u16))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Recurring weekly meeting slot of a course.
///
/// Always holds `start < end`; days are deduplicated in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MeetingPatternFields")]
pub struct MeetingPattern {
    days: Vec<Weekday>,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

#[derive(Deserialize)]
struct MeetingPatternFields {
    #[serde(default)]
    days: Vec<Weekday>,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl TryFrom<MeetingPatternFields> for MeetingPattern {
    type Error = AppError;

    fn try_from(fields: MeetingPatternFields) -> Result<Self, Self::Error> {
        MeetingPattern::new(fields.days, fields.start_time, fields.end_time)
    }
}

impl MeetingPattern {
    pub fn new(
        days: impl IntoIterator<Item = Weekday>,
        start_time: TimeOfDay,
        end_time: TimeOfDay,
    ) -> Result<Self, AppError> {
        if start_time >= end_time {
            return Err(AppError::BadRequest(format!(
                "meeting must end after it starts ({} - {})",
                start_time, end_time
            )));
        }

        let mut unique = Vec::new();
        for day in days {
            if !unique.contains(&day) {
                unique.push(day);
            }
        }

        Ok(Self {
            days: unique,
            start_time,
            end_time,
        })
    }

    /// Parses weekday tokens ("Mon", "monday") and `HH:MM` times.
    pub fn parse<S: AsRef<str>>(days: &[S], start: &str, end: &str) -> Result<Self, AppError> {
        let days = days
            .iter()
            .map(|d| {
                d.as_ref().trim().parse::<Weekday>().map_err(|_| {
                    AppError::BadRequest(format!("unknown weekday '{}'", d.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(days, start.parse()?, end.parse()?)
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    pub fn start_time(&self) -> TimeOfDay {
        self.start_time
    }

    pub fn end_time(&self) -> TimeOfDay {
        self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub semester: String,
    pub credits: u32,
    pub category: CourseCategory,
    pub schedule: Option<MeetingPattern>,
    pub prerequisites: Vec<String>,
    pub capacity: u32,
    pub enrolled: u32,
    pub updated_at: String,
}

impl Course {
    pub fn is_full(&self) -> bool {
        self.enrolled >= self.capacity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub semester: String,
    pub credits: u32,
    pub category: CourseCategory,
    #[serde(default)]
    pub schedule: Option<MeetingPattern>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub capacity: u32,
}

impl NewCourseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.code.trim().is_empty() {
            return Err(AppError::BadRequest("course code is required".to_string()));
        }
        check_credits(self.credits)
    }
}

/// Upper bound on a single course's credit weight.
pub const MAX_COURSE_CREDITS: u32 = 30;

fn check_credits(credits: u32) -> Result<(), AppError> {
    if credits == 0 || credits > MAX_COURSE_CREDITS {
        return Err(AppError::BadRequest(format!(
            "credits must be between 1 and {}, got {}",
            MAX_COURSE_CREDITS, credits
        )));
    }
    Ok(())
}

/// Administrative edit of a catalog entry. `enrolled` is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructor: Option<String>,
    pub credits: Option<u32>,
    pub category: Option<CourseCategory>,
    pub schedule: Option<MeetingPattern>,
    pub prerequisites: Option<Vec<String>>,
    pub capacity: Option<u32>,
}

impl UpdateCourseRequest {
    pub fn apply_to(self, course: &mut Course) -> Result<(), AppError> {
        if let Some(title) = self.title {
            course.title = title;
        }
        if let Some(description) = self.description {
            course.description = description;
        }
        if let Some(instructor) = self.instructor {
            course.instructor = instructor;
        }
        if let Some(credits) = self.credits {
            check_credits(credits)?;
            course.credits = credits;
        }
        if let Some(category) = self.category {
            course.category = category;
        }
        if let Some(schedule) = self.schedule {
            course.schedule = Some(schedule);
        }
        if let Some(prerequisites) = self.prerequisites {
            course.prerequisites = prerequisites;
        }
        if let Some(capacity) = self.capacity {
            if capacity < course.enrolled {
                return Err(AppError::BadRequest(format!(
                    "{}: capacity {} is below current enrollment {}",
                    course.code, capacity, course.enrolled
                )));
            }
            course.capacity = capacity;
        }
        Ok(())
    }
}
