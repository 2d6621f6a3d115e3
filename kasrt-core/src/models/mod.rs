pub mod ledger;
pub mod payment;
pub mod period;
pub mod resident;
pub mod submission;
pub mod subscription;
pub mod user;

pub use ledger::{Bucket, EntrySource, EntryType, LedgerEntry, NewLedgerEntry};
pub use payment::{MonthlyFeePayment, NewPayment, PaymentStatus, APPROVAL_THRESHOLD};
pub use period::Period;
pub use resident::Resident;
pub use submission::{RwSubmission, SubmissionSummary};
pub use subscription::{DeferredSubscription, NewSubscription};
pub use user::{User, UserResponse};
