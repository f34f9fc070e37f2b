pub mod course;
pub mod registration;
pub mod student;

pub use course::{
    Course, CourseCategory, MAX_COURSE_CREDITS, MeetingPattern, NewCourseRequest, TimeOfDay,
    UpdateCourseRequest,
};
pub use registration::{
    BulkApproveRequest, RegistrationFilter, RegistrationRecord, RegistrationStatus, SelectionRequest,
};
pub use student::{NewStudentRequest, Role, Student, StudentStatus};
