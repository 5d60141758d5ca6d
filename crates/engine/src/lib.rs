pub mod date_index;
pub mod forecast;
pub mod matcher;
pub mod reconcile;
pub mod recurrence;
mod util;

use thiserror::Error;

pub use date_index::DateIndex;
pub use matcher::{MatchResult, Matcher};
pub use reconcile::{MatchAmbiguity, ReconcileOutput, Reconciler, RunReport, SkippedSchedule};

use cadence_core::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schedule '{schedule}': template declares no postings")]
    NoTemplatePostings { schedule: String },
    #[error("schedule '{schedule}': template has multiple elided postings; only one balancing leg is allowed")]
    MultipleElidedPostings { schedule: String },
    #[error("schedule '{schedule}': template postings carry no fixed amounts")]
    NoFixedAmounts { schedule: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
