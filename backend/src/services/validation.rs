use serde::{Deserialize, Serialize};

use crate::models::{Course, CourseCategory, Student};
use crate::services::schedule::courses_conflict;

/// Outcome of checking a course selection. Warnings never affect `valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Credit load of a selection, saturating at `u32::MAX`.
pub fn total_credits(courses: &[Course]) -> u32 {
    u32::try_from(credit_sum(courses)).unwrap_or(u32::MAX)
}

fn credit_sum(courses: &[Course]) -> u64 {
    courses.iter().map(|c| u64::from(c.credits)).sum()
}

/// Checks a selection against the student's record and the catalog.
///
/// Every rule runs so the verdict lists all problems at once. Output order is
/// fixed: credit load, then per selected course (prerequisites, capacity) in
/// selection order, then schedule clashes by pair index.
pub fn validate(student: &Student, selected: &[Course], catalog: &[Course]) -> Verdict {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let total = credit_sum(selected);
    if total < u64::from(student.min_credits) {
        errors.push(format!(
            "Minimum credit load not met. Required: {}, Selected: {}",
            student.min_credits, total
        ));
    }
    if total > u64::from(student.max_credits) {
        errors.push(format!(
            "Maximum credit load exceeded. Allowed: {}, Selected: {}",
            student.max_credits, total
        ));
    }

    for course in selected {
        let missing: Vec<&str> = course
            .prerequisites
            .iter()
            .filter(|code| !student.has_completed(code))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            errors.push(format!(
                "{}: Missing prerequisites: {}",
                course.code,
                missing.join(", ")
            ));
        }

        // Snapshot only; the ledger re-checks at commit time.
        if course.is_full() {
            errors.push(format!("{}: Course is currently full.", course.code));
        }
    }

    for (i, first) in selected.iter().enumerate() {
        for second in &selected[i + 1..] {
            if courses_conflict(first, second) {
                errors.push(format!(
                    "Schedule conflict between {} and {}.",
                    first.code, second.code
                ));
            }
        }
    }

    let missing_core: Vec<&str> = catalog
        .iter()
        .filter(|c| c.category == CourseCategory::Core)
        .filter(|c| !selected.iter().any(|s| s.id == c.id))
        .map(|c| c.code.as_str())
        .collect();
    if !missing_core.is_empty() {
        warnings.push(format!(
            "You have not selected some core courses: {}",
            missing_core.join(", ")
        ));
    }

    Verdict {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeetingPattern, Role, StudentStatus};

    fn student(min: u32, max: u32, completed: &[&str]) -> Student {
        Student {
            id: "s1".to_string(),
            name: "Ada".to_string(),
            email: String::new(),
            major: "Computer Science".to_string(),
            faculty: "Science".to_string(),
            level: "200".to_string(),
            session: "2025/2026".to_string(),
            gpa: 4.1,
            completed_courses: completed.iter().map(|c| c.to_string()).collect(),
            current_registrations: vec![],
            min_credits: min,
            max_credits: max,
            role: Role::Student,
            status: StudentStatus::Active,
        }
    }

    fn course(code: &str, credits: u32, category: CourseCategory) -> Course {
        Course {
            id: format!("id-{}", code),
            code: code.to_string(),
            title: code.to_string(),
            description: String::new(),
            instructor: String::new(),
            semester: "First".to_string(),
            credits,
            category,
            schedule: None,
            prerequisites: vec![],
            capacity: 50,
            enrolled: 0,
            updated_at: String::new(),
        }
    }

    fn scheduled(mut c: Course, days: &[&str], start: &str, end: &str) -> Course {
        c.schedule = Some(MeetingPattern::parse(days, start, end).unwrap());
        c
    }

    #[test]
    fn test_valid_selection() {
        let s = student(3, 24, &[]);
        let a = course("CS101", 3, CourseCategory::Core);
        let catalog = vec![a.clone()];
        let verdict = validate(&s, &[a], &catalog);
        assert!(verdict.valid);
        assert!(verdict.errors.is_empty());
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_under_minimum_load_is_single_error() {
        let s = student(15, 24, &[]);
        let selected: Vec<Course> = (0..4)
            .map(|i| course(&format!("EL{}", i), 3, CourseCategory::Elective))
            .collect();
        let verdict = validate(&s, &selected, &selected);
        assert_eq!(
            verdict.errors,
            vec!["Minimum credit load not met. Required: 15, Selected: 12"]
        );
        assert!(!verdict.valid);
    }

    #[test]
    fn test_over_maximum_load() {
        let s = student(1, 5, &[]);
        let selected = vec![
            course("A1", 3, CourseCategory::Elective),
            course("A2", 3, CourseCategory::Elective),
        ];
        let verdict = validate(&s, &selected, &selected);
        assert_eq!(
            verdict.errors,
            vec!["Maximum credit load exceeded. Allowed: 5, Selected: 6"]
        );
    }

    #[test]
    fn test_oversized_credit_weights_do_not_wrap() {
        let s = student(1, 24, &[]);
        let selected = vec![
            course("A1", u32::MAX / 2 + 1, CourseCategory::Elective),
            course("A2", u32::MAX / 2 + 1, CourseCategory::Elective),
        ];
        let verdict = validate(&s, &selected, &selected);
        assert_eq!(
            verdict.errors,
            vec!["Maximum credit load exceeded. Allowed: 24, Selected: 4294967296"]
        );
        assert_eq!(total_credits(&selected), u32::MAX);
    }

    #[test]
    fn test_inverted_bounds_fire_both_credit_errors() {
        let s = student(20, 10, &[]);
        let selected = vec![course("A1", 15, CourseCategory::Elective)];
        let verdict = validate(&s, &selected, &selected);
        assert_eq!(verdict.errors.len(), 2);
    }

    #[test]
    fn test_missing_prerequisites_keep_course_order() {
        let s = student(0, 24, &["MTH101"]);
        let mut c = course("CS201", 3, CourseCategory::Departmental);
        c.prerequisites = vec!["CS102".to_string(), "MTH101".to_string(), "CS101".to_string()];
        let verdict = validate(&s, std::slice::from_ref(&c), std::slice::from_ref(&c));
        assert_eq!(verdict.errors, vec!["CS201: Missing prerequisites: CS102, CS101"]);
    }

    #[test]
    fn test_full_course_is_an_error_regardless_of_others() {
        let s = student(0, 24, &[]);
        let mut full = course("CS101", 3, CourseCategory::Elective);
        full.enrolled = full.capacity;
        let open = course("CS102", 3, CourseCategory::Elective);

        let alone = validate(&s, std::slice::from_ref(&full), &[]);
        assert_eq!(alone.errors, vec!["CS101: Course is currently full."]);

        let together = validate(&s, &[open, full], &[]);
        assert_eq!(together.errors, vec!["CS101: Course is currently full."]);
    }

    #[test]
    fn test_schedule_conflicts_listed_once_per_pair() {
        let s = student(0, 24, &[]);
        let a = scheduled(course("A", 3, CourseCategory::Elective), &["Mon"], "09:00", "11:00");
        let b = scheduled(course("B", 3, CourseCategory::Elective), &["Mon"], "10:00", "12:00");
        let c = scheduled(course("C", 3, CourseCategory::Elective), &["Mon"], "10:30", "11:30");
        let d = scheduled(course("D", 3, CourseCategory::Elective), &["Mon"], "11:00", "13:00");
        let verdict = validate(&s, &[a, b, c, d], &[]);
        assert_eq!(
            verdict.errors,
            vec![
                "Schedule conflict between A and B.",
                "Schedule conflict between A and C.",
                "Schedule conflict between B and C.",
                "Schedule conflict between B and D.",
                "Schedule conflict between C and D.",
            ]
        );
    }

    #[test]
    fn test_unscheduled_course_never_conflicts() {
        let s = student(0, 24, &[]);
        let a = scheduled(course("A", 3, CourseCategory::Elective), &["Mon"], "09:00", "11:00");
        let b = course("B", 3, CourseCategory::Elective);
        assert!(validate(&s, &[a, b], &[]).valid);
    }

    #[test]
    fn test_core_warning_lists_all_missing_codes_once() {
        let s = student(0, 24, &[]);
        let core1 = course("GST101", 2, CourseCategory::Core);
        let core2 = course("GST102", 2, CourseCategory::Core);
        let core3 = course("GST103", 2, CourseCategory::Core);
        let elective = course("EL1", 3, CourseCategory::Elective);
        let catalog = vec![core1, core2.clone(), core3, elective.clone()];

        let verdict = validate(&s, &[elective, core2], &catalog);
        assert!(verdict.valid);
        assert_eq!(
            verdict.warnings,
            vec!["You have not selected some core courses: GST101, GST103"]
        );
    }

    #[test]
    fn test_errors_follow_rule_order_and_are_deterministic() {
        let s = student(10, 24, &[]);
        let mut a = scheduled(course("A", 3, CourseCategory::Core), &["Tue"], "09:00", "11:00");
        a.prerequisites = vec!["X".to_string()];
        let mut b = scheduled(course("B", 3, CourseCategory::Elective), &["Tue"], "10:00", "12:00");
        b.enrolled = b.capacity;
        let catalog = vec![a.clone(), b.clone()];

        let first = validate(&s, &[a.clone(), b.clone()], &catalog);
        let second = validate(&s, &[a, b], &catalog);
        assert_eq!(first, second);
        assert_eq!(
            first.errors,
            vec![
                "Minimum credit load not met. Required: 10, Selected: 6",
                "A: Missing prerequisites: X",
                "B: Course is currently full.",
                "Schedule conflict between A and B.",
            ]
        );
    }
}
