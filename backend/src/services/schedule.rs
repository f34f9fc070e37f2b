use crate::models::{Course, MeetingPattern};

/// Two meeting patterns clash when they share a weekday and their half-open
/// `[start, end)` intervals overlap. Back-to-back slots do not clash.
pub fn conflicts(a: &MeetingPattern, b: &MeetingPattern) -> bool {
    let shares_day = a.days().iter().any(|day| b.days().contains(day));
    shares_day && a.start_time() < b.end_time() && b.start_time() < a.end_time()
}

/// Courses without a meeting pattern never clash with anything.
pub fn courses_conflict(a: &Course, b: &Course) -> bool {
    match (&a.schedule, &b.schedule) {
        (Some(x), Some(y)) => conflicts(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(days: &[&str], start: &str, end: &str) -> MeetingPattern {
        MeetingPattern::parse(days, start, end).unwrap()
    }

    #[test]
    fn test_overlapping_on_shared_day() {
        let a = pattern(&["Mon", "Wed"], "09:00", "11:00");
        let b = pattern(&["Wed"], "10:00", "12:00");
        assert!(conflicts(&a, &b));
        assert!(conflicts(&b, &a));
    }

    #[test]
    fn test_boundary_touching_is_not_a_conflict() {
        let a = pattern(&["Mon"], "09:00", "11:00");
        let b = pattern(&["Mon"], "11:00", "13:00");
        assert!(!conflicts(&a, &b));
        assert!(!conflicts(&b, &a));
    }

    #[test]
    fn test_disjoint_days_never_conflict() {
        let a = pattern(&["Mon", "Wed"], "09:00", "11:00");
        let b = pattern(&["Tue", "Thu"], "09:00", "11:00");
        assert!(!conflicts(&a, &b));
    }

    #[test]
    fn test_containment_conflicts() {
        let outer = pattern(&["Fri"], "08:00", "17:00");
        let inner = pattern(&["Fri"], "12:00", "13:00");
        assert!(conflicts(&outer, &inner));
    }

    #[test]
    fn test_single_digit_hours_compare_numerically() {
        // "9:30" > "10:00" lexicographically; minute-of-day comparison must not care
        let a = pattern(&["Tue"], "09:30", "10:30");
        let b = pattern(&["Tue"], "10:00", "11:00");
        assert!(conflicts(&a, &b));
    }

    #[test]
    fn test_no_weekdays_never_conflicts() {
        let a = pattern(&[], "09:00", "11:00");
        let b = pattern(&["Mon"], "09:00", "11:00");
        assert!(!conflicts(&a, &b));
    }
}
