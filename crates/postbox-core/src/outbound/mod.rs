//! Outbound batch sending: roster loading, message composition, and the
//! batch orchestrator that tracks aggregate completion.

pub mod batch;
pub mod compose;
pub mod roster;

pub use batch::{AttemptOutcome, BatchJob, BatchReport, BatchSender, JobState};
pub use compose::compose;
pub use roster::{load_roster, RosterEntry};
