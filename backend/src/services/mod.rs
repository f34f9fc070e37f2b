pub mod ledger;
pub mod review;
pub mod schedule;
pub mod validation;
pub mod workflow;

pub use ledger::{EnrollmentLedger, LedgerConfig};
pub use review::{BulkApprovalReport, ItemOutcome, ReviewService};
pub use schedule::{conflicts, courses_conflict};
pub use validation::{Verdict, validate};
pub use workflow::{RegistrationService, Submission};
