//! Concrete [`crate::aggregate::Aggregator`] implementations (C5), one
//! module per `cljob/handler.py` aggregator family.

pub mod errors;
pub mod exceptions;
pub mod files;
pub mod output;
pub mod progress;
pub mod statuses;

pub use errors::{MergeErrors, PrintErrors};
pub use exceptions::{MergeExceptions, PrintExceptions};
pub use files::{DoneJobsToFile, FailedJobsAppendFile};
pub use output::{MergeOutput, PrintOutput};
pub use progress::ProgressBar;
pub use statuses::{JobStatuses, Status};
