pub mod loader;
pub mod money;
pub mod period;
pub mod schedule;
pub mod transaction;

pub use money::Money;
pub use period::DateRange;
pub use schedule::{
    AmountSpec, ConfigError, DayOfWeek, Frequency, GlobalConfig, MatchCriteria, MissingPolicy,
    PostingTemplate, RecurrenceRule, Schedule, ScheduleFile, TransactionTemplate,
};
pub use transaction::{Posting, Transaction};
